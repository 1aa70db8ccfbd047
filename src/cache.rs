//! In-memory caches shared across message-handling tasks.
//!
//! Both structures are plain mutex-guarded maps: the relay is not throughput
//! bound, so single-lock synchronization is enough for the concurrent
//! fan-out tasks touching them.

use crate::i18n;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How long a cached translation stays valid.
const CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Whole-cache eviction kicks in above this entry count.
const CACHE_MAX_ENTRIES: usize = 1000;

/// How long a message id is remembered for redelivery filtering. Must outlast
/// Slack's own retry window.
const DEDUP_WINDOW: Duration = Duration::from_secs(60);

struct CacheEntry {
    translated_text: String,
    inserted_at: Instant,
}

/// Time-bounded memoization of (text, target language) -> translation.
///
/// Expiry is lazy (checked on read, no background sweep) and eviction is
/// coarse: once the entry count passes the bound after a put, the whole map
/// is cleared rather than tracking recency per entry.
pub struct TranslationCache {
    entries: Mutex<HashMap<[u8; 32], CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::with_limits(CACHE_TTL, CACHE_MAX_ENTRIES)
    }

    /// Custom TTL and capacity, used by tests.
    pub fn with_limits(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    /// SHA-256 fingerprint of (text, normalized target language). A digest
    /// keeps keys fixed-size regardless of message length.
    fn key(text: &str, target: &str) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
        hasher.update(i18n::normalize(target).as_bytes());
        hasher.finalize().into()
    }

    /// Returns the cached translation if present and younger than the TTL.
    /// Expired entries are removed on the way out.
    pub fn get(&self, text: &str, target: &str) -> Option<String> {
        let key = Self::key(text, target);
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                Some(entry.translated_text.clone())
            }
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, text: &str, target: &str, translation: &str) {
        let key = Self::key(text, target);
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        entries.insert(
            key,
            CacheEntry {
                translated_text: translation.to_string(),
                inserted_at: Instant::now(),
            },
        );
        if entries.len() > self.max_entries {
            entries.clear();
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }
}

impl Default for TranslationCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Short-lived set of already-seen message ids.
///
/// Slack delivers events at least once; a redelivered event must not produce
/// a second reply. Expired ids are pruned on insert.
pub struct EventDeduper {
    seen: Mutex<HashMap<String, Instant>>,
    window: Duration,
}

impl EventDeduper {
    pub fn new() -> Self {
        Self::with_window(DEDUP_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            window,
        }
    }

    /// Records the id and reports whether this is its first delivery within
    /// the window.
    pub fn first_delivery(&self, id: &str) -> bool {
        let mut seen = self.seen.lock().expect("dedup lock poisoned");
        let window = self.window;
        seen.retain(|_, at| at.elapsed() < window);

        if seen.contains_key(id) {
            return false;
        }
        seen.insert(id.to_string(), Instant::now());
        true
    }
}

impl Default for EventDeduper {
    fn default() -> Self {
        Self::new()
    }
}
