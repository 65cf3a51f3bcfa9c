//! Wire shapes exchanged with the chat backend.
//!
//! Responses are validated here instead of being read field by field: a
//! body that does not fit its record type is a [`ApiError::Schema`], and
//! list endpoints drop (and log) the entries that do not fit.

use chrono::{DateTime, Utc};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, Result};
use crate::state::{ChatMessage, Sender, Session};

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub user_email: &'a str,
    pub user_password: &'a str,
}

/// Registration takes the same fields as login
pub type RegisterRequest<'a> = LoginRequest<'a>;

#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub id: &'a str,
}

/// Body of `/user/login` and `/user/refresh`
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// The access token, treating an empty string as absent
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionRecord {
    #[serde(deserialize_with = "session_id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        Session {
            id: record.id,
            title: record.title,
            created_at: record.created_at,
        }
    }
}

/// One persisted exchange: the user's message and the bot's answer
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub user_message: Option<String>,
    #[serde(default)]
    pub bot_message: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

/// Session ids arrive as strings or numbers; both become the canonical string form.
fn session_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("invalid session id: {other}"))),
    }
}

/// Decodes a single object, failing on shape mismatch.
pub fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ApiError::Schema(format!("{what}: {e}")))
}

/// Decodes a list. A non-array body counts as empty and bad entries are skipped.
pub fn decode_list<T: DeserializeOwned>(value: Value, what: &str) -> Vec<T> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            tracing::warn!(what, body = %other, "Expected a JSON array, treating as empty");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(what, index, error = %e, "Skipping malformed entry");
                None
            }
        })
        .collect()
}

/// Flattens history records into thread messages, oldest first.
///
/// Each record yields its user message then its bot message. The sort is
/// stable, so entries with equal timestamps keep their response order.
pub fn messages_from_history(records: Vec<HistoryRecord>) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = records
        .into_iter()
        .flat_map(|record| {
            let at = Some(record.created_at);
            let user = record
                .user_message
                .map(|text| ChatMessage::new(Sender::User, text, at));
            let bot = record
                .bot_message
                .map(|text| ChatMessage::new(Sender::Bot, text, at));
            user.into_iter().chain(bot)
        })
        .collect();

    messages.sort_by_key(|m| m.created_at);
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_id_accepts_string_and_number() {
        let records: Vec<SessionRecord> = decode_list(
            json!([
                {"id": "abc", "title": "First", "createdAt": "2024-01-01T10:00:00Z"},
                {"id": 17, "createdAt": "2024-01-02T10:00:00Z"}
            ]),
            "sessions",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "abc");
        assert_eq!(records[1].id, "17");
        assert!(records[1].title.is_none());
    }

    #[test]
    fn test_session_id_rejects_object() {
        let result: Result<SessionRecord> = decode(
            json!({"id": {"id": 3}, "createdAt": "2024-01-01T10:00:00Z"}),
            "session",
        );
        assert!(matches!(result, Err(ApiError::Schema(_))));
    }

    #[test]
    fn test_decode_list_non_array_is_empty() {
        let records: Vec<HistoryRecord> = decode_list(json!({"detail": "nope"}), "history");
        assert!(records.is_empty());
        let records: Vec<HistoryRecord> = decode_list(Value::Null, "history");
        assert!(records.is_empty());
    }

    #[test]
    fn test_decode_list_skips_bad_entries() {
        let records: Vec<HistoryRecord> = decode_list(
            json!([
                {"user_message": "hi", "bot_message": "hello", "createdAt": "2024-01-01T10:00:00Z"},
                {"user_message": "missing timestamp"},
                42
            ]),
            "history",
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_message.as_deref(), Some("hi"));
    }

    #[test]
    fn test_token_response_empty_token_is_absent() {
        let tokens: TokenResponse = decode(json!({"access_token": ""}), "token").unwrap();
        assert!(tokens.access_token().is_none());
        let tokens: TokenResponse = decode(json!({}), "token").unwrap();
        assert!(tokens.access_token().is_none());
    }

    #[test]
    fn test_history_sorted_ascending() {
        // Records arrive as [T2, T0, T1]
        let records: Vec<HistoryRecord> = decode_list(
            json!([
                {"user_message": "u2", "bot_message": "b2", "createdAt": "2024-01-01T10:02:00Z"},
                {"user_message": "u0", "bot_message": "b0", "createdAt": "2024-01-01T10:00:00Z"},
                {"user_message": "u1", "bot_message": "b1", "createdAt": "2024-01-01T10:01:00Z"}
            ]),
            "history",
        );

        let texts: Vec<String> = messages_from_history(records)
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["u0", "b0", "u1", "b1", "u2", "b2"]);
    }

    #[test]
    fn test_history_ties_keep_response_order() {
        let records: Vec<HistoryRecord> = decode_list(
            json!([
                {"user_message": "first", "createdAt": "2024-01-01T10:00:00Z"},
                {"bot_message": "second", "createdAt": "2024-01-01T10:00:00Z"},
                {"user_message": "third", "bot_message": "fourth", "createdAt": "2024-01-01T10:00:00Z"}
            ]),
            "history",
        );

        let messages = messages_from_history(records);
        let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third", "fourth"]);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].sender, Sender::Bot);
    }
}
