//! Projection of normalized responses into conversation and message views.
//!
//! Resolution never fails: a reference that points outside `included`, a
//! field of the wrong JSON type, or a missing timestamp all degrade to
//! `None` on the produced view.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use crate::normalized::{Entity, EntityIndex, NormalizedResponse};
use crate::views::{ConversationView, MessageView, ParticipantSource};

const PARTICIPANTS: &str = "participants";
const EVENTS: &str = "events";
const LAST_MESSAGE: &str = "lastMessage";
const PROFILE: &str = "profile";
const FROM: &str = "from";
const BODY: &str = "body";
const CREATED_AT: &str = "createdAt";
const LAST_ACTIVITY_AT: &str = "lastActivityAt";
const UNREAD_COUNT: &str = "unreadCount";
const READ: &str = "read";
const IS_SELF: &str = "isSelf";
const DISTANCE: &str = "distance";
const DISTANCE_SELF: &str = "SELF";

/// Knobs for turning entities into views.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Prefix for profile URLs built from a public identifier. Without it,
    /// only explicit `profileUrl` fields produce a URL.
    pub profile_base_url: Option<String>,
    /// Key of the logged-in account's profile or participant entity, when
    /// the caller knows it. Consulted before the positional fallback.
    pub self_key: Option<String>,
    /// Maximum characters of message text kept in a preview.
    pub preview_chars: usize,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            profile_base_url: None,
            self_key: None,
            preview_chars: 100,
        }
    }
}

/// Stateless resolver; one instance can serve any number of responses.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    options: ResolverOptions,
}

impl Resolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve every top-level element as a conversation, in payload order.
    pub fn conversations(&self, response: &NormalizedResponse) -> Vec<ConversationView> {
        let index = response.index();
        response
            .elements
            .iter()
            .map(|record| self.conversation(&index, record))
            .collect()
    }

    /// Resolve every top-level element as a message, oldest first.
    ///
    /// Messages without a delivery timestamp sort before dated ones; ties
    /// keep payload order.
    pub fn messages(&self, response: &NormalizedResponse) -> Vec<MessageView> {
        let index = response.index();
        let mut messages: Vec<MessageView> = response
            .elements
            .iter()
            .map(|event| self.message(&index, event))
            .collect();
        messages.sort_by_key(|m| m.sent_at);
        messages
    }

    fn conversation(&self, index: &EntityIndex<'_>, record: &Entity) -> ConversationView {
        let slots = index.resolve_slots(record, PARTICIPANTS);
        let (other, participant_source) = self.pick_other(index, &slots);
        if participant_source.is_heuristic() {
            debug!(
                conversation = %record.key,
                source = ?participant_source,
                "Other participant chosen without a self marker"
            );
        }
        let profile = other.map(|p| profile_of(index, p));

        let last_event = index
            .resolve_all(record, EVENTS)
            .into_iter()
            .max_by_key(|e| e.i64_field(CREATED_AT))
            .or_else(|| index.resolve(record, LAST_MESSAGE));

        let last_message_preview = last_event
            .and_then(message_text)
            .and_then(|text| self.preview(text));
        let last_message_at = last_event
            .and_then(|e| e.i64_field(CREATED_AT))
            .or_else(|| record.i64_field(LAST_ACTIVITY_AT))
            .and_then(millis_to_datetime);

        let unread_count = record
            .i64_field(UNREAD_COUNT)
            .map(|n| n.clamp(0, u32::MAX as i64) as u32)
            .unwrap_or(0);
        let is_unread = unread_count > 0 || record.bool_field(READ) == Some(false);

        ConversationView {
            id: record.key.clone(),
            participant_name: profile.and_then(display_name),
            participant_id: profile.and_then(profile_id),
            participant_url: profile.and_then(|p| self.profile_url(p)),
            participant_avatar_url: profile.and_then(|p| avatar_url(index, p)),
            participant_source,
            last_message_preview,
            last_message_at,
            is_unread,
            unread_count,
        }
    }

    fn message(&self, index: &EntityIndex<'_>, event: &Entity) -> MessageView {
        let sender = index.resolve(event, FROM);
        let profile = sender.map(|p| profile_of(index, p));

        MessageView {
            id: event.key.clone(),
            content: message_text(event).unwrap_or_default().to_string(),
            is_from_me: sender.is_some_and(|p| self.is_self(index, p)),
            sender_name: profile.and_then(display_name),
            sender_id: profile.and_then(profile_id),
            sent_at: event.i64_field(CREATED_AT).and_then(millis_to_datetime),
        }
    }

    /// Choose the participant that is not the logged-in account.
    ///
    /// Order of evidence: an explicit self marker on any participant, then
    /// the caller's `self_key`, then position (the first participant is
    /// assumed to be self). Positions come from the reference list, so an
    /// unresolved first key does not shift the fallback. A positional guess
    /// that lands on a known self participant yields nothing.
    fn pick_other<'a>(
        &self,
        index: &EntityIndex<'a>,
        slots: &[Option<&'a Entity>],
    ) -> (Option<&'a Entity>, ParticipantSource) {
        let resolved = || slots.iter().flatten().copied();

        if resolved().any(|p| self_marker(index, p).is_some()) {
            if let Some(other) = resolved().find(|p| self_marker(index, p) != Some(true)) {
                return (Some(other), ParticipantSource::SelfMarker);
            }
        }

        if self.options.self_key.is_some() && resolved().any(|p| self.matches_self_key(index, p))
        {
            if let Some(other) = resolved().find(|p| !self.matches_self_key(index, p)) {
                return (Some(other), ParticipantSource::KnownSelf);
            }
        }

        let (slot, source) = match slots.len() {
            0 => return (None, ParticipantSource::Unresolved),
            1 => (slots[0], ParticipantSource::SoleParticipant),
            _ => (slots[1], ParticipantSource::PositionalFallback),
        };
        // Positional guesses never override known identity.
        match slot {
            Some(entity) if !self.is_self(index, entity) => (Some(entity), source),
            _ => (None, ParticipantSource::Unresolved),
        }
    }

    fn is_self(&self, index: &EntityIndex<'_>, participant: &Entity) -> bool {
        self_marker(index, participant) == Some(true) || self.matches_self_key(index, participant)
    }

    fn matches_self_key(&self, index: &EntityIndex<'_>, participant: &Entity) -> bool {
        let Some(self_key) = self.options.self_key.as_deref() else {
            return false;
        };
        participant.key == self_key || profile_of(index, participant).key == self_key
    }

    fn profile_url(&self, profile: &Entity) -> Option<String> {
        if let Some(url) = profile.str_field("profileUrl") {
            return Some(url.to_string());
        }
        let public_id = profile.str_field("publicIdentifier")?;
        let base = self.options.profile_base_url.as_deref()?;
        Some(format!("{}/{}", base.trim_end_matches('/'), public_id))
    }

    fn preview(&self, text: &str) -> Option<String> {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return None;
        }
        if collapsed.chars().count() <= self.options.preview_chars {
            return Some(collapsed);
        }
        let mut cut: String = collapsed.chars().take(self.options.preview_chars).collect();
        cut.truncate(cut.trim_end().len());
        cut.push('…');
        Some(cut)
    }
}

/// The profile behind a participant: its `*profile` reference when present,
/// otherwise the participant entity itself (some payloads inline profile
/// fields on the member).
fn profile_of<'a>(index: &EntityIndex<'a>, participant: &'a Entity) -> &'a Entity {
    index.resolve(participant, PROFILE).unwrap_or(participant)
}

/// Explicit self marker on a participant or its profile, if any.
fn self_marker(index: &EntityIndex<'_>, participant: &Entity) -> Option<bool> {
    let marker = |e: &Entity| {
        e.bool_field(IS_SELF)
            .or_else(|| e.str_field(DISTANCE).map(|d| d == DISTANCE_SELF))
    };
    marker(participant).or_else(|| marker(profile_of(index, participant)))
}

fn message_text(event: &Entity) -> Option<&str> {
    event.text_field(BODY).or_else(|| event.text_field("text"))
}

fn display_name(profile: &Entity) -> Option<String> {
    let parts: Vec<&str> = [profile.str_field("firstName"), profile.str_field("lastName")]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if !parts.is_empty() {
        return Some(parts.join(" "));
    }
    profile
        .str_field("name")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn profile_id(profile: &Entity) -> Option<String> {
    if profile.key.is_empty() {
        return None;
    }
    Some(key_id(&profile.key).to_string())
}

/// Trailing id segment of a `urn:...:id` key; other keys are returned as is.
fn key_id(key: &str) -> &str {
    if key.starts_with("urn:") {
        key.rsplit(':').next().unwrap_or(key)
    } else {
        key
    }
}

fn avatar_url(index: &EntityIndex<'_>, profile: &Entity) -> Option<String> {
    if let Some(url) = profile.str_field("pictureUrl") {
        return Some(url.to_string());
    }
    if let Some(image) = index.resolve(profile, "picture") {
        return vector_image_url(&image.fields);
    }
    match profile.field("picture")? {
        Value::Object(image) => vector_image_url(image),
        Value::String(url) if url.starts_with("http") => Some(url.clone()),
        _ => None,
    }
}

/// `rootUrl` joined with the path segment of the widest artifact.
fn vector_image_url(image: &Map<String, Value>) -> Option<String> {
    let root = image.get("rootUrl").and_then(Value::as_str)?;
    let segment = image
        .get("artifacts")
        .and_then(Value::as_array)
        .and_then(|artifacts| {
            artifacts
                .iter()
                .filter_map(|a| {
                    let width = a.get("width").and_then(Value::as_i64).unwrap_or(0);
                    let path = a.get("fileIdentifyingUrlPathSegment")?.as_str()?;
                    Some((width, path))
                })
                .max_by_key(|(width, _)| *width)
        })
        .map(|(_, path)| path)
        .unwrap_or("");
    if root.is_empty() && segment.is_empty() {
        return None;
    }
    Some(format!("{}{}", root, segment))
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}
