//! LLM-as-judge subprotocols: distillation, agreement judging, and the
//! model-selection heuristics they share.
//!
//! Both the distiller and the judge issue nested queries through the same
//! [`SmartBackend`](crate::orchestrator::SmartBackend), so they benefit
//! from the cache and the circuit breaker like any tool-level call.

pub mod distill;
pub mod judge;
pub mod select;
