//! Single-slot cache of the merged model catalog.
//!
//! `list_models` fans out to every backend, so the aggregated catalog is
//! memoized briefly. Circuit-open filtering is NOT applied here — the
//! orchestrator post-filters on every read so a stale catalog cannot
//! advertise a model that has since entered cooldown.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::ModelInfo;

/// Short-TTL memoization of the aggregated model catalog.
pub struct ModelListCache {
    slot: Mutex<Option<(Vec<ModelInfo>, Instant)>>,
    ttl: Duration,
}

impl ModelListCache {
    /// Create a cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            ttl,
        }
    }

    /// The cached catalog if still fresh, else `None`.
    pub fn get(&self) -> Option<Vec<ModelInfo>> {
        let slot = self.slot.lock().expect("catalog lock poisoned");
        match slot.as_ref() {
            Some((catalog, at)) if at.elapsed() <= self.ttl => Some(catalog.clone()),
            _ => None,
        }
    }

    /// Replace the cached catalog.
    pub fn set(&self, catalog: Vec<ModelInfo>) {
        let mut slot = self.slot.lock().expect("catalog lock poisoned");
        *slot = Some((catalog, Instant::now()));
    }

    /// Drop the cached catalog.
    pub fn invalidate(&self) {
        self.slot.lock().expect("catalog lock poisoned").take();
    }
}

impl Default for ModelListCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
