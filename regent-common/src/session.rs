//! Persisted chat session types.

use serde::{Deserialize, Serialize};

/// Number of characters of the first user message kept in a session title.
pub const TITLE_MAX_CHARS: usize = 30;

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a fresh opaque identifier for sessions and messages.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Author of a session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message stored inside a chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl SessionMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            role,
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One persisted conversation.
///
/// Messages are kept in insertion order. The title is derived once from the
/// first user message and never recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<SessionMessage>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ChatSession {
    /// Start a session whose first entry is `first`.
    pub fn start(id: impl Into<String>, first: SessionMessage) -> Self {
        Self {
            id: id.into(),
            title: title_from(&first.content),
            created_at: first.timestamp,
            updated_at: first.timestamp,
            messages: vec![first],
        }
    }

    /// Append a message and bump `updated_at`.
    pub fn push(&mut self, message: SessionMessage) {
        self.updated_at = self.updated_at.max(message.timestamp);
        self.messages.push(message);
    }

    pub fn last_message(&self) -> Option<&SessionMessage> {
        self.messages.last()
    }

    /// True when the latest message is a user message with no reply yet.
    pub fn is_awaiting_reply(&self) -> bool {
        matches!(self.last_message(), Some(m) if m.role == Role::User)
    }
}

/// Derive a session title: the first [`TITLE_MAX_CHARS`] characters of the
/// message, with `...` appended when it was cut.
pub fn title_from(text: &str) -> String {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_short_message_kept_whole() {
        assert_eq!(title_from("Hello there"), "Hello there");
    }

    #[test]
    fn test_title_long_message_truncated() {
        let text = "This message is definitely longer than thirty characters";
        let title = title_from(text);
        assert_eq!(title, "This message is definitely lon...");
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
    }

    #[test]
    fn test_title_counts_characters_not_bytes() {
        let text = "åäöåäöåäöåäöåäöåäöåäöåäöåäöåäöÅ";
        let title = title_from(text);
        assert!(title.ends_with("..."));
        assert_eq!(title.trim_end_matches("...").chars().count(), TITLE_MAX_CHARS);
    }

    #[test]
    fn test_title_exactly_limit_not_truncated() {
        let text = "a".repeat(TITLE_MAX_CHARS);
        assert_eq!(title_from(&text), text);
    }

    #[test]
    fn test_session_start_uses_first_message() {
        let first = SessionMessage::user("What is Regent?");
        let ts = first.timestamp;
        let session = ChatSession::start("s1", first);
        assert_eq!(session.title, "What is Regent?");
        assert_eq!(session.created_at, ts);
        assert_eq!(session.updated_at, ts);
        assert!(session.is_awaiting_reply());
    }

    #[test]
    fn test_push_keeps_title_and_order() {
        let mut session = ChatSession::start("s1", SessionMessage::user("first"));
        session.push(SessionMessage::assistant("reply"));
        session.push(SessionMessage::user("a different question"));

        assert_eq!(session.title, "first");
        let contents: Vec<&str> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "reply", "a different question"]);
    }

    #[test]
    fn test_push_bumps_updated_at() {
        let mut first = SessionMessage::user("first");
        first.timestamp = 1_000;
        let mut session = ChatSession::start("s1", first);
        let mut reply = SessionMessage::assistant("reply");
        reply.timestamp = 2_000;
        session.push(reply);
        assert_eq!(session.created_at, 1_000);
        assert_eq!(session.updated_at, 2_000);
        assert!(!session.is_awaiting_reply());
    }

    #[test]
    fn test_session_serializes_camel_case() {
        let session = ChatSession::start("s1", SessionMessage::user("hi"));
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
