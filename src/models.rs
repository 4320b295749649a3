/// Conversation and message records shared by the store, session logic and UIs.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of prompt characters kept as a conversation title.
pub const TITLE_CHARS: usize = 20;

/// Length of the hex conversation id.
const ID_LEN: usize = 8;

// ── Role ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(other.to_string()),
        }
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Assigned by the store; `None` until the message has been persisted.
    pub id: Option<i64>,
    pub role: Role,
    pub content: String,
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// A not-yet-persisted message for `conversation_id`.
    pub fn new(conversation_id: &str, role: Role, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            role,
            content: content.into(),
            conversation_id: conversation_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

// ── Conversation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Build a fresh conversation opened by `prompt` and answered by `reply`.
    pub fn from_exchange(prompt: &str, reply: &str) -> Self {
        let now = Utc::now();
        let id = generate_id(now);
        let messages = vec![
            Message::new(&id, Role::User, prompt),
            Message::new(&id, Role::Assistant, reply),
        ];
        Self {
            id,
            title: title_from_prompt(prompt),
            created_at: now,
            updated_at: now,
            messages,
        }
    }

    /// Give the conversation (and its messages) a new id. Used when the
    /// generated id collides with a stored one.
    pub fn reassign_id(&mut self) {
        let id = generate_id(Utc::now());
        for message in &mut self.messages {
            message.conversation_id = id.clone();
        }
        self.id = id;
    }

    /// Append a user prompt and the assistant's reply.
    pub fn push_exchange(&mut self, prompt: &str, reply: &str) {
        self.messages.push(Message::new(&self.id, Role::User, prompt));
        self.messages.push(Message::new(&self.id, Role::Assistant, reply));
    }
}

/// First [`TITLE_CHARS`] characters of the prompt, with control characters
/// (newlines, tabs) turned into spaces so the title stays on one line.
pub fn title_from_prompt(prompt: &str) -> String {
    prompt
        .chars()
        .take(TITLE_CHARS)
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Short hex id derived from a SHA-256 of the timestamp.
pub fn generate_id(at: DateTime<Utc>) -> String {
    let stamp = at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);
    let digest = Sha256::digest(stamp.as_bytes());
    let hex = format!("{digest:x}");
    hex[..ID_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_truncates_to_twenty_chars() {
        assert_eq!(title_from_prompt("What is the capital of France?"), "What is the capital ");
        assert_eq!(title_from_prompt("short"), "short");
    }

    #[test]
    fn test_title_respects_char_boundaries() {
        let prompt = "é".repeat(30);
        assert_eq!(title_from_prompt(&prompt).chars().count(), TITLE_CHARS);
    }

    #[test]
    fn test_title_flattens_newlines_and_tabs() {
        let title = title_from_prompt("fix this:\n\tfn main()");
        assert_eq!(title, "fix this:  fn main()");
        assert!(!title.chars().any(char::is_control));
    }

    #[test]
    fn test_generate_id_is_short_hex() {
        let id = generate_id(Utc::now());
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_id_differs_per_instant() {
        let a = Utc::now();
        let b = a + chrono::Duration::nanoseconds(1);
        assert_ne!(generate_id(a), generate_id(b));
    }

    #[test]
    fn test_from_exchange_orders_user_then_assistant() {
        let conv = Conversation::from_exchange("hello", "hi there");
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].role, Role::User);
        assert_eq!(conv.messages[1].role, Role::Assistant);
        assert!(conv.messages.iter().all(|m| m.conversation_id == conv.id));
    }

    #[test]
    fn test_reassign_id_updates_messages() {
        let mut conv = Conversation::from_exchange("hello", "hi");
        let old = conv.id.clone();
        // Nanosecond input makes a repeat of the same id practically impossible
        conv.reassign_id();
        assert_ne!(conv.id, old);
        assert!(conv.messages.iter().all(|m| m.conversation_id == conv.id));
    }

    #[test]
    fn test_role_round_trips_through_str() {
        assert_eq!("user".parse::<Role>(), Ok(Role::User));
        assert_eq!("assistant".parse::<Role>(), Ok(Role::Assistant));
        assert!("system".parse::<Role>().is_err());
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
