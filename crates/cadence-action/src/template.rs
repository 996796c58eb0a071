//! Personalization of outgoing text and extraction of contact details.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use cadence_core::types::ProspectRef;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\s*(first_name|name)\s*\}").expect("Invalid placeholder regex"));

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("Invalid email regex")
});

/// Fill `{first_name}` / `{name}` from the target and cap the result at
/// `max_chars` characters. Placeholders for unknown names collapse to an
/// empty string. Returns `None` when nothing but whitespace remains.
pub fn render(template: &str, target: &ProspectRef, max_chars: usize) -> Option<String> {
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        match &caps[1] {
            "first_name" => target.first_name().unwrap_or_default().to_string(),
            _ => target.name.clone().unwrap_or_default(),
        }
    });

    // Collapse the double spaces an empty placeholder leaves behind.
    let text = rendered
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(truncate_chars(text, max_chars))
}

/// First email address in `text`.
pub fn extract_email(text: &str) -> Option<String> {
    EMAIL.find(text).map(|m| m.as_str().to_string())
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}
