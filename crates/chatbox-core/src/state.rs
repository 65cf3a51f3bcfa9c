//! UI-agnostic conversation types
//!
//! Client-side shapes rendered by any front end, separate from the wire
//! records in [`crate::api::schema`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    User,
    Bot,
}

/// What a message entry represents in the thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// Ordinary text from the user or the bot
    Text,
    /// Transient placeholder for the outstanding request with this ticket
    Typing(u64),
    /// Locally synthesized failure notice
    Error,
}

/// A single entry in the message thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub sender: Sender,
    pub created_at: Option<DateTime<Utc>>,
    pub kind: MessageKind,
}

impl ChatMessage {
    pub fn new(sender: Sender, text: impl Into<String>, created_at: Option<DateTime<Utc>>) -> Self {
        Self {
            text: text.into(),
            sender,
            created_at,
            kind: MessageKind::Text,
        }
    }

    /// A user message stamped with the client clock
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text, Some(Utc::now()))
    }

    /// A bot message stamped with the client clock
    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text, Some(Utc::now()))
    }

    pub fn typing(ticket: u64) -> Self {
        Self {
            text: String::new(),
            sender: Sender::Bot,
            created_at: None,
            kind: MessageKind::Typing(ticket),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::Bot,
            created_at: Some(Utc::now()),
            kind: MessageKind::Error,
        }
    }

    pub fn is_typing(&self) -> bool {
        matches!(self.kind, MessageKind::Typing(_))
    }
}

/// One conversation thread, identified by a server-assigned id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Title for list display; untitled sessions fall back to their creation date
    pub fn display_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => title.to_string(),
            _ => format!("New chat ({})", self.created_at.format("%Y-%m-%d %H:%M")),
        }
    }
}
