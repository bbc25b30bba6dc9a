//! UI-agnostic chat state types
//!
//! These are the records persisted by the session store and rendered by any
//! front end. Timestamps serialize as Unix milliseconds so snapshots written
//! by earlier clients load unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of characters kept from the first user message in a title
pub const TITLE_MAX_CHARS: usize = 30;

/// Title given to sessions created explicitly, before any message is sent
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A single message in a chat transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: now(),
        }
    }

    /// Empty model message that a stream fills in
    pub fn placeholder() -> Self {
        Self {
            role: Role::Model,
            content: String::new(),
            timestamp: now(),
        }
    }
}

/// A chat session: an ordered transcript plus its sidebar title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            messages: Vec::new(),
            updated_at: now(),
        }
    }

    /// True for a session created by "new chat" that has not been used yet
    pub fn is_untitled(&self) -> bool {
        self.messages.is_empty() && self.title == DEFAULT_SESSION_TITLE
    }

    pub fn touch(&mut self) {
        self.updated_at = now();
    }
}

/// Derive a session title from the first user message.
///
/// Inputs longer than [`TITLE_MAX_CHARS`] characters are cut and suffixed with
/// `...`; shorter inputs are used verbatim.
pub fn session_title(input: &str) -> String {
    if input.chars().count() > TITLE_MAX_CHARS {
        let head: String = input.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        input.to_string()
    }
}

/// Current time truncated to millisecond precision, the resolution we persist
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
