//! Content-addressed response cache.
//!
//! Memoizes completed queries keyed on a SHA-256 digest of
//! `(model, prompt, canonical options)`. Strict LRU with TTL: a `get`
//! promotes the entry to most-recent; a `set` at capacity evicts exactly
//! the single least-recently-used entry. Stale entries are deleted on read.
//!
//! Callers set `latency_ms := 0` on served responses to mark the cache hit.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::types::{QueryOptions, QueryResponse};

/// Configuration for the response cache.
///
/// ```rust
/// # use hydramcp::orchestrator::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(200)
///     .ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached entries. Default: 100.
    pub max_entries: usize,
    /// Time-to-live for cached entries. Default: 15 minutes.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl: Duration::from_secs(900),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the time-to-live for cached entries.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

struct CacheEntry {
    response: QueryResponse,
    inserted: Instant,
    /// Recency stamp from the monotonic counter; highest = most recent.
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    clock: u64,
}

/// In-memory LRU + TTL cache of completed queries.
pub struct ResponseCache {
    state: Mutex<CacheState>,
    config: CacheConfig,
}

impl ResponseCache {
    /// Create a new response cache with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            config,
        }
    }

    /// Compute the cache key for a query.
    ///
    /// SHA-256 over `model ∥ prompt ∥ canonical(options)` joined with the
    /// record-separator control character, hex-encoded.
    pub fn key(model: &str, prompt: &str, options: &QueryOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0x1e]);
        hasher.update(prompt.as_bytes());
        hasher.update([0x1e]);
        hasher.update(options.canonical().as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }

    /// Look up a cached response, promoting it to most-recent on hit.
    ///
    /// A stale entry (past TTL) is deleted and reported as a miss.
    pub fn get(&self, key: &str) -> Option<QueryResponse> {
        let mut state = self.state.lock().expect("cache lock poisoned");
        let stale = match state.entries.get(key) {
            None => return None,
            Some(entry) => entry.inserted.elapsed() > self.config.ttl,
        };
        if stale {
            state.entries.remove(key);
            return None;
        }
        state.clock += 1;
        let stamp = state.clock;
        let entry = state.entries.get_mut(key).expect("entry checked above");
        entry.last_used = stamp;
        Some(entry.response.clone())
    }

    /// Insert a response, evicting the least-recently-used entry when at
    /// capacity.
    pub fn set(&self, key: &str, response: QueryResponse) {
        let mut state = self.state.lock().expect("cache lock poisoned");
        if !state.entries.contains_key(key) && state.entries.len() >= self.config.max_entries {
            if let Some(lru_key) = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                state.entries.remove(&lru_key);
            }
        }
        state.clock += 1;
        let stamp = state.clock;
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                response,
                inserted: Instant::now(),
                last_used: stamp,
            },
        );
    }

    /// Number of live entries (stale entries included until read).
    pub fn len(&self) -> usize {
        self.state.lock().expect("cache lock poisoned").entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
