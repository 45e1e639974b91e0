//! # Conversation store
//!
//! Bounded per-user message history for transports that carry no
//! conversation state of their own (the Telegram webhook sends one message
//! at a time). Sessions are capped in number (LRU), capped in length
//! (oldest messages dropped), and evicted after a period of inactivity.
//!
//! The store owns its map exclusively; history is returned by value and
//! compound operations run under a single lock acquisition.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use persona_core::{Clock, PersonaMessage};
use tracing::debug;

struct Session {
    messages: Vec<PersonaMessage>,
    last_activity: DateTime<Utc>,
}

/// Per-user conversation history with LRU capacity and inactivity TTL.
pub struct ConversationStore {
    sessions: Mutex<LruCache<String, Session>>,
    max_history: usize,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ConversationStore {
    pub fn new(
        max_sessions: usize,
        max_history: usize,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let capacity = NonZeroUsize::new(max_sessions.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            max_history,
            ttl,
            clock,
        }
    }

    /// Returns a copy of the user's history, oldest first. An expired
    /// session is dropped and reads as empty.
    pub fn history(&self, user_key: &str) -> Vec<PersonaMessage> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().expect("session lock poisoned");

        let expired = sessions
            .peek(user_key)
            .map(|session| session.last_activity + self.ttl <= now)
            .unwrap_or(false);
        if expired {
            sessions.pop(user_key);
            return Vec::new();
        }

        sessions
            .get(user_key)
            .map(|session| session.messages.clone())
            .unwrap_or_default()
    }

    /// Appends a message to the user's history, trimming to the most recent
    /// `max_history` messages.
    pub fn append(&self, user_key: &str, message: PersonaMessage) {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().expect("session lock poisoned");

        // A missing or TTL-expired session restarts from scratch.
        let stale = sessions
            .peek(user_key)
            .map(|session| session.last_activity + self.ttl <= now)
            .unwrap_or(true);
        if stale {
            sessions.put(
                user_key.to_string(),
                Session {
                    messages: Vec::new(),
                    last_activity: now,
                },
            );
        }
        let session = sessions
            .get_mut(user_key)
            .expect("session present or inserted above");

        session.messages.push(message);
        if session.messages.len() > self.max_history {
            let excess = session.messages.len() - self.max_history;
            session.messages.drain(..excess);
        }
        session.last_activity = now;
    }

    /// Removes all history for one user key.
    pub fn clear(&self, user_key: &str) {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        if sessions.pop(user_key).is_some() {
            debug!(user_key, "conversation cleared");
        }
    }

    /// Number of live sessions, counting ones awaiting TTL eviction.
    pub fn active_count(&self) -> usize {
        self.sessions.lock().expect("session lock poisoned").len()
    }
}
