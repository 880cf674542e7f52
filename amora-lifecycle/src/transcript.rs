use std::collections::HashSet;

use uuid::Uuid;

use crate::models::{MatchMessage, MessageKind};

/// How much of a match's log is scanned when deciding who spoke first.
pub const TRANSCRIPT_SCAN_LIMIT: i64 = 500;

/// Prompts the service itself writes to nudge users toward buying credit.
/// Compared against the whole normalized body, so a user quoting part of
/// one still qualifies.
const CREDIT_PROMPT_TEMPLATES: &[&str] = &[
    "unlock this chat",
    "add a date credit to keep going",
    "top up your wallet to reply",
    "you need credits to keep chatting",
    "add credit to continue",
];

/// Lowercase, single-spaced, without trailing punctuation.
fn normalize(body: &str) -> String {
    let joined = body.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    joined.trim_end_matches(['.', '!', '?', '\u{2026}']).trim_end().to_string()
}

fn is_credit_prompt(body: &str) -> bool {
    let body = normalize(body);
    CREDIT_PROMPT_TEMPLATES.iter().any(|t| *t == body)
}

/// A message a participant actually wrote, as opposed to service-generated
/// system, hint, feedback or credit-prompt text.
pub fn is_qualifying(message: &MatchMessage) -> bool {
    let Ok(kind) = message.kind.parse::<MessageKind>() else {
        return false;
    };
    if kind.is_internal() {
        return false;
    }
    !message.body.as_deref().is_some_and(is_credit_prompt)
}

/// Expects messages oldest first.
pub fn first_qualifying_sender(messages: &[MatchMessage]) -> Option<Uuid> {
    messages.iter().find(|m| is_qualifying(m)).map(|m| m.sender_id)
}

pub fn distinct_qualifying_senders(messages: &[MatchMessage]) -> usize {
    messages
        .iter()
        .filter(|m| is_qualifying(m))
        .map(|m| m.sender_id)
        .collect::<HashSet<_>>()
        .len()
}
