use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the "other party" of a conversation was chosen.
///
/// `PositionalFallback` means no participant said who "self" is and the
/// first participant was assumed to be the logged-in account. Callers that
/// must not act on a guess should check for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantSource {
    /// A participant carried an explicit self marker.
    SelfMarker,
    /// The caller-supplied self key matched one participant.
    KnownSelf,
    /// First participant skipped, second taken.
    PositionalFallback,
    /// Only one participant was listed.
    SoleParticipant,
    /// No participant could be chosen.
    Unresolved,
}

impl ParticipantSource {
    pub fn is_heuristic(&self) -> bool {
        matches!(
            self,
            ParticipantSource::PositionalFallback | ParticipantSource::SoleParticipant
        )
    }
}

/// A conversation as seen from the logged-in account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationView {
    pub id: String,
    pub participant_name: Option<String>,
    pub participant_id: Option<String>,
    pub participant_url: Option<String>,
    pub participant_avatar_url: Option<String>,
    pub participant_source: ParticipantSource,
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub is_unread: bool,
    pub unread_count: u32,
}

/// A single message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: String,
    pub content: String,
    pub is_from_me: bool,
    pub sender_name: Option<String>,
    pub sender_id: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
}
