//! Per-browser session state, keyed by a random cookie value. A session
//! only exists once the browser has logged in.

use crate::filter::Selection;
use crate::types::OverlayPoint;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "rgph5_session";

/// Everything the dashboard remembers between two requests of one browser.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub selection: Selection,
    pub overlay: Vec<OverlayPoint>,
    /// Outcome of the last upload, shown once in the sidebar.
    pub overlay_notice: Option<Notice>,
    pub position: Option<(f64, f64)>,
    last_seen: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub enum Notice {
    Success(String),
    Error(String),
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            selection: Selection::default(),
            overlay: Vec::new(),
            overlay_notice: None,
            position: None,
            last_seen: Instant::now(),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Stores `state` under a newly issued id and returns the id.
    pub fn create(&self, state: SessionState) -> String {
        let id = Uuid::new_v4().to_string();
        self.put(&id, state);
        id
    }

    /// Returns a copy of the session's state, or `None` if the id is
    /// unknown or has been idle longer than the TTL.
    pub fn get(&self, id: &str) -> Option<SessionState> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        sessions.retain(|_, s| now.duration_since(s.last_seen) <= self.ttl);

        let state = sessions.get_mut(id)?;
        state.last_seen = now;
        Some(state.clone())
    }

    pub fn put(&self, id: &str, mut state: SessionState) {
        state.last_seen = Instant::now();
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), state);
    }

    /// Forgets the session entirely (logout).
    pub fn remove(&self, id: &str) {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
