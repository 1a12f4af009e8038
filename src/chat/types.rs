//! Chat session type definitions.
//!
//! Defines [`Role`] (who authored a message), [`Message`], [`ChatSession`] (one
//! conversation thread), and [`ChatFolder`] (a flat, named grouping of sessions).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title a session carries until one is derived from its first user message.
pub const NEW_CHAT_TITLE: &str = "New Chat";

/// Longest derived title, in characters, before the ellipsis.
pub const TITLE_MAX_CHARS: usize = 30;

/// First message of every new session.
pub const GREETING: &str = "Hello! I'm your health assistant. Ask me about blood pressure, \
    sleep, fitness, nutrition, or any of your health metrics.";

/// Message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

/// One conversation thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    /// UUID v7 (time-sortable).
    pub id: String,
    pub title: String,
    /// Never empty: starts with [`GREETING`].
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Live folder this session is filed under, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

impl ChatSession {
    pub fn new(folder_id: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            title: NEW_CHAT_TITLE.to_string(),
            messages: vec![Message::assistant(GREETING)],
            created_at: now,
            updated_at: now,
            folder_id,
        }
    }

    pub fn has_default_title(&self) -> bool {
        self.title == NEW_CHAT_TITLE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFolder {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Title derived from the first user message, or `None` if there is none yet.
///
/// Messages up to [`TITLE_MAX_CHARS`] characters are used verbatim; longer ones
/// are cut to that many characters and suffixed with `...`.
pub fn derive_title(messages: &[Message]) -> Option<String> {
    let first = messages.iter().find(|m| m.role == Role::User)?;
    let mut chars = first.content.chars();
    let prefix: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        Some(format!("{prefix}..."))
    } else {
        Some(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn new_session_starts_with_greeting() {
        let session = ChatSession::new(None, Utc::now());
        assert_eq!(session.title, NEW_CHAT_TITLE);
        assert_eq!(session.messages, vec![Message::assistant(GREETING)]);
        assert_eq!(session.created_at, session.updated_at);
    }

    #[test]
    fn title_of_exactly_thirty_chars_is_verbatim() {
        let text = "a".repeat(30);
        assert_eq!(derive_title(&[Message::user(text.clone())]), Some(text));
    }

    #[test]
    fn title_over_thirty_chars_is_truncated_with_ellipsis() {
        let text = "b".repeat(31);
        let title = derive_title(&[Message::user(text)]).unwrap();
        assert_eq!(title, format!("{}...", "b".repeat(30)));
    }

    #[test]
    fn title_counts_characters_not_bytes() {
        let text = "é".repeat(30);
        assert_eq!(derive_title(&[Message::user(text.clone())]), Some(text));
    }

    #[test]
    fn title_skips_assistant_messages() {
        let messages = vec![Message::assistant("hi there"), Message::user("Sleep tips")];
        assert_eq!(derive_title(&messages).as_deref(), Some("Sleep tips"));
        assert_eq!(derive_title(&[Message::assistant("only me")]), None);
    }

    #[test]
    fn session_serializes_dates_as_rfc3339() {
        let session = ChatSession::new(Some("f1".into()), Utc::now());
        let json = serde_json::to_value(&session).unwrap();
        assert!(json["createdAt"].as_str().unwrap().contains('T'));
        assert_eq!(json["folderId"], "f1");

        let back: ChatSession = serde_json::from_value(json).unwrap();
        assert_eq!(back, session);
    }
}
