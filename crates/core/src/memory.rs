use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::domain::request::RequestAttributes;
use crate::domain::turn::Turn;

/// Per-session conversation state: a bounded, append-only turn history plus
/// the last known request attributes used to resolve followups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub turns: VecDeque<Turn>,
    pub last_attributes: Option<RequestAttributes>,
}

impl Session {
    fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), turns: VecDeque::new(), last_attributes: None }
    }
}

/// The session store. Sessions are created on first access and removed only
/// through explicit eviction; the turn window is a fixed size, with the
/// oldest turn dropped on overflow.
#[derive(Debug)]
pub struct ConversationMemory {
    window: usize,
    sessions: HashMap<String, Session>,
}

impl ConversationMemory {
    pub fn new(window: usize) -> Self {
        Self { window: window.max(1), sessions: HashMap::new() }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Never fails: an unseen id yields a fresh empty session.
    pub fn get(&mut self, session_id: &str) -> &Session {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id))
    }

    /// Read-only lookup that does not create the session.
    pub fn peek(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn last_attributes(&self, session_id: &str) -> Option<RequestAttributes> {
        self.sessions.get(session_id).and_then(|session| session.last_attributes.clone())
    }

    pub fn set_last_attributes(&mut self, session_id: &str, attributes: RequestAttributes) {
        let session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id));
        session.last_attributes = Some(attributes);
    }

    pub fn append(&mut self, session_id: &str, turn: Turn) {
        let window = self.window;
        let session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id));
        session.turns.push_back(turn);
        while session.turns.len() > window {
            session.turns.pop_front();
        }
    }

    /// Explicit removal; returns whether the session existed.
    pub fn evict(&mut self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }
}
