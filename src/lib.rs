//! HydraMCP — multi-model orchestration server.
//!
//! Lets one AI coding agent consult other models through a uniform tool
//! surface over JSON-RPC on standard streams. The core is the
//! orchestration layer: routing a logical model ID across pluggable
//! backends, resilience around every backend call (circuit breaking,
//! response caching, retry, timeout, token accounting), concurrent
//! fan-out/aggregation for comparison, consensus, and synthesis, and the
//! LLM-as-judge subprotocols for agreement detection and distillation.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hydramcp::backends::{ChatCompletionsBackend, MultiBackend};
//! use hydramcp::orchestrator::SmartBackend;
//! use hydramcp::{Backend, QueryOptions};
//!
//! #[tokio::main]
//! async fn main() -> hydramcp::Result<()> {
//!     let multi = MultiBackend::new()
//!         .register("openai", Arc::new(ChatCompletionsBackend::openai("openai", "sk-key")))
//!         .register("ollama", Arc::new(ChatCompletionsBackend::ollama("ollama")));
//!     let smart = SmartBackend::new(Arc::new(multi));
//!
//!     let response = smart
//!         .query("openai/gpt-4o", "What is a circuit breaker?",
//!             &QueryOptions::default().max_tokens(256))
//!         .await?;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```

pub mod backends;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod server;
pub mod session;
pub mod subprotocol;
pub mod telemetry;
pub mod tools;
pub mod traits;
pub mod types;
pub mod util;

// Re-export main types at crate root
pub use config::Config;
pub use error::{HydraError, Result};
pub use traits::Backend;
pub use types::{FinishReason, ModelInfo, QueryOptions, QueryResponse, Usage};
