//! Response cache keyed by a fingerprint of the conversation.
//!
//! The fingerprint is a SHA-256 over a bounded, normalized message window,
//! so retries and case/whitespace variants of the same exchange hit the same
//! entry. Values are bounded by LRU capacity and invalidated by TTL
//! regardless of recency. The `fromCache` tag on a response is rewritten on
//! every access: a stored value reports false on the writing access and true
//! on subsequent reads.
//!
//! Bypass policy (search mode, freshness-flagged queries, fallback
//! responses) lives with the chat route; this store only answers lookups.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use persona_core::{Clock, PersonaMessage, PersonaResponse, Role};
use sha2::{Digest, Sha256};

/// Messages beyond this window never influence the fingerprint.
pub const MAX_CONTEXT_MESSAGES: usize = 8;

struct StoredEntry {
    response: PersonaResponse,
    stored_at: DateTime<Utc>,
}

/// Result of a cache consult: the derived key (if one exists) and the cached
/// response under it.
pub struct CacheLookup {
    pub key: Option<String>,
    pub cached: Option<PersonaResponse>,
}

pub struct ResponseCache {
    entries: Mutex<LruCache<String, StoredEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub fn new(max_entries: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            clock,
        }
    }

    /// Derives the deterministic fingerprint for a message window.
    ///
    /// Last `MAX_CONTEXT_MESSAGES` messages, each normalized (lowercased,
    /// whitespace collapsed, trimmed), joined as `role:content` pairs in
    /// order, hashed. An empty or all-blank window has no key: the cache is
    /// skipped, not an error.
    pub fn fingerprint(messages: &[PersonaMessage]) -> Option<String> {
        if messages.is_empty() {
            return None;
        }

        let window = &messages[messages.len().saturating_sub(MAX_CONTEXT_MESSAGES)..];
        let mut any_content = false;
        let normalized: Vec<String> = window
            .iter()
            .map(|message| {
                let content = normalize_text(&message.content);
                if !content.is_empty() {
                    any_content = true;
                }
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                format!("{role}:{content}")
            })
            .collect();

        if !any_content {
            return None;
        }

        let digest = Sha256::digest(normalized.join("|").as_bytes());
        Some(hex::encode(digest))
    }

    /// Looks up the cached response for this message window. A hit comes
    /// back tagged `fromCache: true`; an expired entry is dropped on the
    /// spot and reads as a miss.
    pub fn lookup(&self, messages: &[PersonaMessage]) -> CacheLookup {
        let Some(key) = Self::fingerprint(messages) else {
            return CacheLookup {
                key: None,
                cached: None,
            };
        };

        let now = self.clock.now();
        let mut entries = self.entries.lock().expect("cache lock poisoned");

        // TTL invalidation happens on access, regardless of recency.
        let expired = entries
            .peek(&key)
            .map(|entry| entry.stored_at + self.ttl <= now)
            .unwrap_or(false);
        if expired {
            entries.pop(&key);
        }

        let cached = entries.get(&key).map(|entry| {
            let mut response = entry.response.clone();
            response.from_cache = Some(true);
            response
        });

        CacheLookup {
            key: Some(key),
            cached,
        }
    }

    /// Stores a freshly generated response under `key`. The stored copy is
    /// tagged `fromCache: false` so the writing access reports correctly.
    pub fn store(&self, key: &str, response: &PersonaResponse) {
        let mut stored = response.clone();
        stored.from_cache = Some(false);

        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.put(
            key.to_string(),
            StoredEntry {
                response: stored,
                stored_at: self.clock.now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }
}

fn normalize_text(value: &str) -> String {
    value
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use persona_core::ManualClock;

    fn response(text: &str) -> PersonaResponse {
        PersonaResponse {
            text: text.into(),
            model: "m".into(),
            usage: None,
            from_cache: None,
            meta: None,
        }
    }

    fn cache_with_clock(max_entries: usize, ttl_secs: i64) -> (ResponseCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = ResponseCache::new(max_entries, Duration::seconds(ttl_secs), clock.clone());
        (cache, clock)
    }

    #[test]
    fn fingerprint_is_deterministic_across_case_and_whitespace() {
        let a = [PersonaMessage::user("What    is  YOUR name?")];
        let b = [PersonaMessage::user("what is your name?  ")];
        assert_eq!(
            ResponseCache::fingerprint(&a),
            ResponseCache::fingerprint(&b)
        );
    }

    #[test]
    fn fingerprint_depends_on_role_and_order() {
        let a = [
            PersonaMessage::user("one"),
            PersonaMessage::assistant("two"),
        ];
        let b = [
            PersonaMessage::assistant("one"),
            PersonaMessage::user("two"),
        ];
        assert_ne!(
            ResponseCache::fingerprint(&a),
            ResponseCache::fingerprint(&b)
        );
    }

    #[test]
    fn fingerprint_empty_or_blank_is_none() {
        assert_eq!(ResponseCache::fingerprint(&[]), None);
        assert_eq!(
            ResponseCache::fingerprint(&[PersonaMessage::user("   ")]),
            None
        );
    }

    #[test]
    fn fingerprint_ignores_messages_outside_the_window() {
        let mut long: Vec<PersonaMessage> =
            (0..12).map(|i| PersonaMessage::user(format!("m{i}"))).collect();
        let windowed = long[long.len() - MAX_CONTEXT_MESSAGES..].to_vec();
        assert_eq!(
            ResponseCache::fingerprint(&long),
            ResponseCache::fingerprint(&windowed)
        );
        // Changing a message before the window does not change the key.
        long[0].content = "different".into();
        assert_eq!(
            ResponseCache::fingerprint(&long),
            ResponseCache::fingerprint(&windowed)
        );
    }

    #[test]
    fn store_then_lookup_rewrites_the_tag() {
        let (cache, _clock) = cache_with_clock(10, 120);
        let messages = [PersonaMessage::user("hello")];

        let miss = cache.lookup(&messages);
        assert!(miss.cached.is_none());
        let key = miss.key.unwrap();

        cache.store(&key, &response("hi there"));
        let hit = cache.lookup(&messages).cached.unwrap();
        assert_eq!(hit.text, "hi there");
        assert_eq!(hit.from_cache, Some(true));
    }

    #[test]
    fn entries_expire_by_ttl() {
        let (cache, clock) = cache_with_clock(10, 120);
        let messages = [PersonaMessage::user("hello")];
        let key = ResponseCache::fingerprint(&messages).unwrap();
        cache.store(&key, &response("hi"));

        clock.advance(Duration::seconds(121));
        assert!(cache.lookup(&messages).cached.is_none());
        // The expired entry was dropped, not just hidden.
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let (cache, _clock) = cache_with_clock(2, 120);
        let first = [PersonaMessage::user("first")];
        let second = [PersonaMessage::user("second")];
        let third = [PersonaMessage::user("third")];

        for messages in [&first, &second, &third] {
            let key = ResponseCache::fingerprint(messages).unwrap();
            cache.store(&key, &response("r"));
        }

        assert!(cache.lookup(&first).cached.is_none());
        assert!(cache.lookup(&second).cached.is_some());
        assert!(cache.lookup(&third).cached.is_some());
    }
}
