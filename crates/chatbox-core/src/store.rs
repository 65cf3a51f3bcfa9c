//! In-memory session list and message thread.

use crate::state::{ChatMessage, MessageKind, Session};

/// Sessions of the signed-in user, newest first, plus the active one.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Vec<Session>,
    active: Option<String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == id)
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&Session> {
        self.active.as_deref().and_then(|id| self.get(id))
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.as_deref() == Some(id)
    }

    /// Replaces the list. An active id that is no longer listed is dropped.
    pub fn replace(&mut self, sessions: Vec<Session>) {
        self.sessions = sessions;
        if let Some(id) = self.active.as_deref() {
            if !self.contains(id) {
                self.active = None;
            }
        }
    }

    /// Sets the active session. Ids not in the list are ignored.
    /// Returns true when the active session changed.
    pub fn set_active(&mut self, id: Option<&str>) -> bool {
        let next = id.filter(|id| self.contains(id)).map(str::to_string);
        if next == self.active {
            return false;
        }
        self.active = next;
        true
    }

    pub fn prepend(&mut self, session: Session) {
        self.sessions.retain(|s| s.id != session.id);
        self.sessions.insert(0, session);
    }

    /// Removes a session. If it was active, the first remaining session
    /// becomes active (or none when the list is empty).
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        let index = self.position(id)?;
        let removed = self.sessions.remove(index);
        if self.is_active(id) {
            self.active = self.sessions.first().map(|s| s.id.clone());
        }
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
        self.active = None;
    }
}

/// Ordered messages of the active session, including transient entries.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
    next_ticket: u64,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn replace(&mut self, messages: Vec<ChatMessage>) {
        self.messages = messages;
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Appends a typing placeholder and returns the ticket that resolves it
    pub fn begin_typing(&mut self) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.messages.push(ChatMessage::typing(ticket));
        ticket
    }

    /// Removes the placeholder for `ticket`. Returns false if it is gone.
    pub fn end_typing(&mut self, ticket: u64) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.kind != MessageKind::Typing(ticket));
        self.messages.len() != before
    }

    pub fn typing_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_typing()).count()
    }

    pub fn is_waiting(&self) -> bool {
        self.messages.iter().any(ChatMessage::is_typing)
    }
}
