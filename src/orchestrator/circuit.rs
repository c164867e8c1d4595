//! Per-model circuit breaker.
//!
//! Tracks consecutive failures per model ID. Reaching the threshold opens
//! the circuit; after the cooldown the first read transitions it to
//! half-open and permits exactly one probe. A probe success closes the
//! circuit (the record is deleted); a probe failure re-opens it with a
//! fresh cooldown.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Circuit state for a single model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Healthy — requests allowed.
    Closed,
    /// Tripped — requests blocked until cooldown expires.
    Open,
    /// Cooldown expired — one probe request allowed.
    HalfOpen,
}

#[derive(Debug, Clone)]
struct CircuitRecord {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Instant,
}

/// Per-model circuit breaker with consecutive-failure counting.
pub struct CircuitBreaker {
    records: RwLock<HashMap<String, CircuitRecord>>,
    max_failures: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Create a breaker with the given threshold and cooldown.
    pub fn new(max_failures: u32, cooldown: Duration) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            max_failures,
            cooldown,
        }
    }

    /// Whether calls to `model` are currently rejected.
    ///
    /// Reading an open circuit whose cooldown has elapsed transitions it
    /// to half-open and permits the caller's next attempt. Half-open
    /// admits callers until a probe outcome is recorded: the first
    /// success closes the circuit, the first failure re-opens it.
    pub fn is_open(&self, model: &str) -> bool {
        let mut records = self.records.write().expect("circuit lock poisoned");
        let Some(record) = records.get_mut(model) else {
            return false;
        };
        match record.state {
            CircuitState::Closed | CircuitState::HalfOpen => false,
            CircuitState::Open => {
                if record.last_failure.elapsed() >= self.cooldown {
                    record.state = CircuitState::HalfOpen;
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Cooldown remaining for an open circuit, zero otherwise.
    pub fn cooldown_remaining(&self, model: &str) -> Duration {
        let records = self.records.read().expect("circuit lock poisoned");
        match records.get(model) {
            Some(r) if r.state == CircuitState::Open => {
                self.cooldown.saturating_sub(r.last_failure.elapsed())
            }
            _ => Duration::ZERO,
        }
    }

    /// Record a success — deletes the record, closing the circuit.
    pub fn record_success(&self, model: &str) {
        self.records
            .write()
            .expect("circuit lock poisoned")
            .remove(model);
    }

    /// Record a failure — may trip the circuit open.
    pub fn record_failure(&self, model: &str) {
        let mut records = self.records.write().expect("circuit lock poisoned");
        let now = Instant::now();
        let record = records.entry(model.to_string()).or_insert(CircuitRecord {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure: now,
        });
        record.last_failure = now;
        match record.state {
            // A half-open probe failure re-opens without waiting for the
            // counter to climb again.
            CircuitState::HalfOpen => record.state = CircuitState::Open,
            _ => {
                record.consecutive_failures += 1;
                if record.consecutive_failures >= self.max_failures {
                    record.state = CircuitState::Open;
                }
            }
        }
    }

    /// Current state without side effects.
    pub fn state(&self, model: &str) -> CircuitState {
        let records = self.records.read().expect("circuit lock poisoned");
        records
            .get(model)
            .map(|r| r.state)
            .unwrap_or(CircuitState::Closed)
    }

    /// Models whose circuits are open and still within cooldown.
    pub fn open_models(&self) -> Vec<String> {
        let records = self.records.read().expect("circuit lock poisoned");
        records
            .iter()
            .filter(|(_, r)| {
                r.state == CircuitState::Open && r.last_failure.elapsed() < self.cooldown
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(60))
    }
}
