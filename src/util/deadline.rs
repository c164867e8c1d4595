//! Per-request deadline enforcement.
//!
//! Every outbound backend call runs under an overall deadline. Overrun is
//! surfaced as [`HydraError::Timeout`], which the retry layer treats as
//! transient.

use std::future::Future;
use std::time::Duration;

use crate::config::DEFAULT_TIMEOUT_MS;
use crate::{HydraError, Result};

/// The process-wide default request deadline: `HYDRA_TIMEOUT_MS` if set and
/// well-formed, otherwise 120 seconds.
pub fn default_deadline() -> Duration {
    std::env::var("HYDRA_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS))
}

/// Run `fut` under `deadline`, mapping overrun to [`HydraError::Timeout`].
///
/// The inner future is dropped on timeout, which cancels an in-flight
/// request at the next await point.
pub async fn with_deadline<T>(
    deadline: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(HydraError::Timeout(deadline)),
    }
}
