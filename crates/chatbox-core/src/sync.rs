//! Keeps the session list and the message thread consistent with the backend.
//!
//! Every user intent is split in three steps so a front end can stay
//! responsive: a synchronous `begin_*` that updates local state and returns a
//! [`Job`], the network part ([`Job::run`]) which only needs a cloned
//! [`ApiClient`], and [`ChatSync::apply`] which folds the [`Outcome`] back in.
//! [`ChatSync::perform`] chains all three for sequential callers.

use crate::api::{ApiClient, HistoryRecord, messages_from_history};
use crate::error::{ApiError, Result};
use crate::state::{ChatMessage, Session};
use crate::store::{MessageStore, SessionStore};

/// Network work produced by a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    LoadSessions { preferred: Option<String> },
    FetchHistory { session_id: String },
    CreateSession,
    DeleteSession { session_id: String },
    Send { session_id: String, ticket: u64, text: String },
}

/// Result of a [`Job`], tagged with what it was issued for
#[derive(Debug)]
pub enum Outcome {
    SessionsLoaded {
        preferred: Option<String>,
        result: Result<Vec<Session>>,
    },
    HistoryLoaded {
        session_id: String,
        result: Result<Vec<HistoryRecord>>,
    },
    SessionCreated(Result<Session>),
    SessionDeleted {
        session_id: String,
        result: Result<()>,
    },
    Replied {
        session_id: String,
        ticket: u64,
        result: Result<String>,
    },
}

impl Job {
    pub async fn run(self, api: &ApiClient) -> Outcome {
        match self {
            Job::LoadSessions { preferred } => Outcome::SessionsLoaded {
                preferred,
                result: api.list_sessions().await,
            },
            Job::FetchHistory { session_id } => {
                let result = api.fetch_history(&session_id).await;
                Outcome::HistoryLoaded { session_id, result }
            }
            Job::CreateSession => Outcome::SessionCreated(api.create_session().await),
            Job::DeleteSession { session_id } => {
                let result = api.delete_session(&session_id).await;
                Outcome::SessionDeleted { session_id, result }
            }
            Job::Send {
                session_id,
                ticket,
                text,
            } => {
                let result = api.send_message(&session_id, &text).await;
                Outcome::Replied {
                    session_id,
                    ticket,
                    result,
                }
            }
        }
    }
}

/// What applying an outcome produced
#[derive(Debug, Default)]
pub struct Applied {
    /// Follow-up work, e.g. fetching the history of a newly active session
    pub next: Option<Job>,
    /// Failure to surface to the user
    pub error: Option<ApiError>,
}

impl Applied {
    fn next(job: Option<Job>) -> Self {
        Self {
            next: job,
            error: None,
        }
    }

    fn failed(error: ApiError) -> Self {
        Self {
            next: None,
            error: Some(error),
        }
    }
}

/// Session and message state bound to an API client.
#[derive(Debug, Clone)]
pub struct ChatSync {
    api: ApiClient,
    sessions: SessionStore,
    messages: MessageStore,
}

impl ChatSync {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            sessions: SessionStore::new(),
            messages: MessageStore::new(),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn messages(&self) -> &MessageStore {
        &self.messages
    }

    pub fn active_id(&self) -> Option<&str> {
        self.sessions.active_id()
    }

    /// Drops all session and message state (logout)
    pub fn reset(&mut self) {
        self.sessions.clear();
        self.messages.clear();
    }

    fn persist_active(&self) {
        self.api.auth().set_active_session_id(self.sessions.active_id());
    }

    /// Clears the thread for the new active session and asks for its history
    fn activate(&mut self, id: Option<&str>) -> Option<Job> {
        self.sessions.set_active(id);
        self.messages.clear();
        self.persist_active();
        self.sessions.active_id().map(|id| Job::FetchHistory {
            session_id: id.to_string(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Intents
    // ─────────────────────────────────────────────────────────────────────

    /// Reloads the session list, preferring the persisted active session
    pub fn begin_load(&self) -> Job {
        Job::LoadSessions {
            preferred: self
                .sessions
                .active_id()
                .map(str::to_string)
                .or_else(|| self.api.auth().active_session_id()),
        }
    }

    /// Switches to `id`, clearing the thread before the fetch resolves
    pub fn begin_switch(&mut self, id: &str) -> Option<Job> {
        if !self.sessions.contains(id) {
            return None;
        }
        tracing::debug!(session_id = id, "Switching session");
        self.activate(Some(id))
    }

    pub fn begin_create(&self) -> Job {
        Job::CreateSession
    }

    pub fn begin_delete(&self, id: &str) -> Option<Job> {
        self.sessions.contains(id).then(|| Job::DeleteSession {
            session_id: id.to_string(),
        })
    }

    /// Optimistically appends the user's message and a typing placeholder.
    /// Returns `None` for blank text or when no session is active.
    pub fn begin_send(&mut self, text: &str) -> Option<Job> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let session_id = self.sessions.active_id()?.to_string();

        self.messages.push(ChatMessage::user(text));
        let ticket = self.messages.begin_typing();
        Some(Job::Send {
            session_id,
            ticket,
            text: text.to_string(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Outcomes
    // ─────────────────────────────────────────────────────────────────────

    /// A 401 that survived the refresh-and-retry means the server refuses the
    /// refreshed token too. Credentials are dropped and the caller must log in again.
    fn settle_error(&self, e: ApiError) -> ApiError {
        match e {
            ApiError::Unauthorized => {
                tracing::warn!("Refreshed credentials rejected, re-authentication required");
                self.api.auth().clear();
                ApiError::SessionExpired
            }
            e => e,
        }
    }

    pub fn apply(&mut self, outcome: Outcome) -> Applied {
        match outcome {
            Outcome::SessionsLoaded { preferred, result } => match result {
                Ok(sessions) => {
                    tracing::info!(count = sessions.len(), "Loaded sessions");
                    self.sessions.replace(sessions);
                    let target = preferred
                        .filter(|id| self.sessions.contains(id))
                        .or_else(|| self.sessions.sessions().first().map(|s| s.id.clone()));
                    if target.as_deref() == self.sessions.active_id() && !self.messages.is_empty() {
                        return Applied::default();
                    }
                    Applied::next(self.activate(target.as_deref()))
                }
                Err(e) => Applied::failed(self.settle_error(e)),
            },

            Outcome::HistoryLoaded { session_id, result } => {
                if !self.sessions.is_active(&session_id) {
                    tracing::debug!(session_id = %session_id, "Discarding history for inactive session");
                    return Applied::default();
                }
                match result {
                    Ok(records) => {
                        self.messages.replace(messages_from_history(records));
                        Applied::default()
                    }
                    Err(e) => Applied::failed(self.settle_error(e)),
                }
            }

            Outcome::SessionCreated(result) => match result {
                Ok(session) => {
                    let id = session.id.clone();
                    self.sessions.prepend(session);
                    self.sessions.set_active(Some(id.as_str()));
                    self.messages.clear();
                    self.persist_active();
                    Applied::default()
                }
                Err(e) => Applied::failed(self.settle_error(e)),
            },

            Outcome::SessionDeleted { session_id, result } => match result {
                Ok(()) => {
                    let was_active = self.sessions.is_active(&session_id);
                    self.sessions.remove(&session_id);
                    if !was_active {
                        return Applied::default();
                    }
                    let fallback = self.sessions.active_id().map(str::to_string);
                    Applied::next(self.activate(fallback.as_deref()))
                }
                Err(e) => Applied::failed(self.settle_error(e)),
            },

            Outcome::Replied {
                session_id,
                ticket,
                result,
            } => {
                // A missing placeholder means the thread was reloaded meanwhile;
                // the persisted history already has this exchange.
                let stale = !self.sessions.is_active(&session_id) || !self.messages.end_typing(ticket);
                match result {
                    Ok(reply) if !stale => {
                        self.messages.push(ChatMessage::bot(reply));
                        Applied::default()
                    }
                    Ok(_) => {
                        tracing::debug!(session_id = %session_id, ticket, "Discarding reply for stale thread");
                        Applied::default()
                    }
                    Err(e) => {
                        let e = self.settle_error(e);
                        tracing::warn!(session_id = %session_id, error = %e, "Sending message failed");
                        if !stale {
                            self.messages.push(ChatMessage::error(format!(
                                "Error: {}",
                                e.user_message()
                            )));
                        }
                        // Only an expired session needs the caller's attention
                        if e.is_session_expired() {
                            Applied::failed(e)
                        } else {
                            Applied::default()
                        }
                    }
                }
            }
        }
    }

    /// Runs a job and its follow-ups to completion, returning the first failure.
    pub async fn perform(&mut self, job: Job) -> Result<()> {
        let mut job = Some(job);
        while let Some(current) = job.take() {
            let outcome = current.run(&self.api).await;
            let applied = self.apply(outcome);
            if let Some(e) = applied.error {
                return Err(e);
            }
            job = applied.next;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::schema::decode_list;
    use crate::auth::AuthContext;
    use crate::state::{MessageKind, Sender};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn session(id: &str) -> Session {
        Session {
            id: id.to_string(),
            title: Some(format!("Session {id}")),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn chat_with(ids: &[&str]) -> ChatSync {
        let api = ApiClient::new("http://localhost:8000", AuthContext::in_memory()).unwrap();
        let mut chat = ChatSync::new(api);
        let applied = chat.apply(Outcome::SessionsLoaded {
            preferred: None,
            result: Ok(ids.iter().map(|id| session(id)).collect()),
        });
        if let Some(first) = ids.first() {
            assert_eq!(
                applied.next,
                Some(Job::FetchHistory {
                    session_id: first.to_string()
                })
            );
        }
        chat
    }

    fn records(text: &str) -> Vec<HistoryRecord> {
        decode_list(
            json!([{"user_message": text, "bot_message": "ok", "createdAt": "2024-01-01T10:00:00Z"}]),
            "history",
        )
    }

    #[test]
    fn test_switch_clears_messages_immediately() {
        let mut chat = chat_with(&["a", "b"]);
        chat.apply(Outcome::HistoryLoaded {
            session_id: "a".to_string(),
            result: Ok(records("from a")),
        });
        assert_eq!(chat.messages().len(), 2);

        let job = chat.begin_switch("b");
        assert_eq!(
            job,
            Some(Job::FetchHistory {
                session_id: "b".to_string()
            })
        );
        assert!(chat.messages().is_empty());
        assert_eq!(chat.active_id(), Some("b"));
        assert_eq!(chat.api().auth().active_session_id().as_deref(), Some("b"));
    }

    #[test]
    fn test_switch_to_unknown_session_is_ignored() {
        let mut chat = chat_with(&["a"]);
        assert!(chat.begin_switch("zzz").is_none());
        assert_eq!(chat.active_id(), Some("a"));
    }

    #[test]
    fn test_late_history_for_previous_session_is_discarded() {
        let mut chat = chat_with(&["a", "b"]);
        chat.begin_switch("b");

        chat.apply(Outcome::HistoryLoaded {
            session_id: "a".to_string(),
            result: Ok(records("from a")),
        });
        assert!(chat.messages().is_empty());

        chat.apply(Outcome::HistoryLoaded {
            session_id: "b".to_string(),
            result: Ok(records("from b")),
        });
        assert_eq!(chat.messages().messages()[0].text, "from b");
    }

    #[test]
    fn test_send_without_active_session() {
        let mut chat = chat_with(&[]);
        assert!(chat.begin_send("hello").is_none());
        assert!(chat.messages().is_empty());
    }

    #[test]
    fn test_blank_send_is_ignored() {
        let mut chat = chat_with(&["a"]);
        assert!(chat.begin_send("   ").is_none());
        assert!(chat.messages().is_empty());
    }

    #[test]
    fn test_one_placeholder_per_outstanding_send() {
        let mut chat = chat_with(&["a"]);
        let first = chat.begin_send("one").unwrap();
        let second = chat.begin_send("two").unwrap();
        assert_eq!(chat.messages().typing_count(), 2);

        let Job::Send { ticket: second_ticket, .. } = second else {
            panic!("expected send job");
        };
        chat.apply(Outcome::Replied {
            session_id: "a".to_string(),
            ticket: second_ticket,
            result: Ok("reply two".to_string()),
        });
        assert_eq!(chat.messages().typing_count(), 1);

        let Job::Send { ticket: first_ticket, .. } = first else {
            panic!("expected send job");
        };
        chat.apply(Outcome::Replied {
            session_id: "a".to_string(),
            ticket: first_ticket,
            result: Ok("reply one".to_string()),
        });
        assert_eq!(chat.messages().typing_count(), 0);

        let texts: Vec<&str> = chat.messages().messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "reply two", "reply one"]);
    }

    #[test]
    fn test_failed_send_replaces_placeholder_with_error() {
        let mut chat = chat_with(&["a"]);
        let Some(Job::Send { ticket, .. }) = chat.begin_send("hello") else {
            panic!("expected send job");
        };

        let applied = chat.apply(Outcome::Replied {
            session_id: "a".to_string(),
            ticket,
            result: Err(ApiError::Http {
                status: 502,
                message: String::new(),
            }),
        });
        assert!(applied.error.is_none());

        let messages = chat.messages().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].kind, MessageKind::Error);
        assert_eq!(messages[1].text, "Error: Server error (502).");
    }

    #[test]
    fn test_expired_session_during_send_is_reported() {
        let mut chat = chat_with(&["a"]);
        let Some(Job::Send { ticket, .. }) = chat.begin_send("hello") else {
            panic!("expected send job");
        };

        let applied = chat.apply(Outcome::Replied {
            session_id: "a".to_string(),
            ticket,
            result: Err(ApiError::SessionExpired),
        });
        assert!(applied.error.is_some_and(|e| e.is_session_expired()));
        assert_eq!(chat.messages().typing_count(), 0);
    }

    #[test]
    fn test_final_unauthorized_becomes_session_expired() {
        let mut chat = chat_with(&["a"]);
        chat.api().set_credential(Some("a1".to_string()));
        let Some(Job::Send { ticket, .. }) = chat.begin_send("hello") else {
            panic!("expected send job");
        };

        let applied = chat.apply(Outcome::Replied {
            session_id: "a".to_string(),
            ticket,
            result: Err(ApiError::Unauthorized),
        });
        assert!(applied.error.is_some_and(|e| e.is_session_expired()));
        assert!(!chat.api().auth().is_authenticated());
    }

    #[test]
    fn test_reply_after_switching_away_is_dropped() {
        let mut chat = chat_with(&["a", "b"]);
        let Some(Job::Send { ticket, .. }) = chat.begin_send("hello") else {
            panic!("expected send job");
        };
        chat.begin_switch("b");

        chat.apply(Outcome::Replied {
            session_id: "a".to_string(),
            ticket,
            result: Ok("late".to_string()),
        });
        assert!(chat.messages().is_empty());
    }

    #[test]
    fn test_created_session_becomes_active() {
        let mut chat = chat_with(&["a"]);
        chat.begin_send("hello");

        let applied = chat.apply(Outcome::SessionCreated(Ok(session("new"))));
        assert!(applied.next.is_none());
        assert_eq!(chat.sessions().sessions()[0].id, "new");
        assert_eq!(chat.active_id(), Some("new"));
        assert!(chat.messages().is_empty());
    }

    #[test]
    fn test_deleting_active_session_fetches_fallback() {
        let mut chat = chat_with(&["a", "b", "c"]);
        let job = chat.begin_delete("a").unwrap();
        assert_eq!(
            job,
            Job::DeleteSession {
                session_id: "a".to_string()
            }
        );

        let applied = chat.apply(Outcome::SessionDeleted {
            session_id: "a".to_string(),
            result: Ok(()),
        });
        assert_eq!(chat.active_id(), Some("b"));
        assert_eq!(
            applied.next,
            Some(Job::FetchHistory {
                session_id: "b".to_string()
            })
        );
    }

    #[test]
    fn test_deleting_last_session_leaves_none_active() {
        let mut chat = chat_with(&["a"]);
        let applied = chat.apply(Outcome::SessionDeleted {
            session_id: "a".to_string(),
            result: Ok(()),
        });
        assert!(applied.next.is_none());
        assert!(chat.active_id().is_none());
        assert!(chat.api().auth().active_session_id().is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut chat = chat_with(&["a"]);
        chat.begin_send("hello");
        chat.reset();
        assert!(chat.sessions().is_empty());
        assert!(chat.messages().is_empty());
        assert!(chat.active_id().is_none());
    }
}
