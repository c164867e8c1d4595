//! The orchestration layer: resilience wrapping around every backend call.
//!
//! [`SmartBackend`] composes a [`CircuitBreaker`], a [`ResponseCache`], a
//! [`ModelListCache`], and a [`MetricsRegistry`] around an inner
//! [`Backend`](crate::Backend) — in production, a
//! [`MultiBackend`](crate::backends::MultiBackend).

mod cache;
mod catalog;
mod circuit;
mod metrics;
mod smart;

pub use cache::{CacheConfig, ResponseCache};
pub use catalog::ModelListCache;
pub use circuit::{CircuitBreaker, CircuitState};
pub use metrics::{MetricsRegistry, ModelStats, SessionSummary};
pub use smart::{SmartBackend, SmartConfig};
