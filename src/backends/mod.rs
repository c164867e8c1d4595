//! Backend instances: one vendor-specific connector per wire format, plus
//! the [`MultiBackend`] router that exposes them as one roster.

mod chat_completions;
mod generate_content;
mod messages;
mod multi;
mod subscription;

pub use chat_completions::ChatCompletionsBackend;
pub use generate_content::GenerateContentBackend;
pub use messages::MessagesBackend;
pub use multi::MultiBackend;
pub use subscription::{SubscriptionBackend, SubscriptionFamily};

use crate::util::reasoning;
use crate::{HydraError, QueryResponse, Result};

/// Normalize a backend response before it leaves the backend layer.
///
/// A response with fewer than 10 non-whitespace characters of content is
/// an error unless the model produced reasoning text, in which case the
/// reasoning is surfaced under a labelled prefix with a warning attached.
pub(crate) fn finalize_response(mut response: QueryResponse) -> Result<QueryResponse> {
    let visible = response.content.chars().filter(|c| !c.is_whitespace()).count();
    if visible >= 10 {
        return Ok(response);
    }
    match response.reasoning_content.as_deref() {
        Some(reasoning_text) if !reasoning_text.trim().is_empty() => {
            response.content = format!(
                "{}{}",
                reasoning::REASONING_FALLBACK_PREFIX,
                reasoning_text
            );
            response.warning =
                Some("model returned no final answer; showing reasoning output".into());
            Ok(response)
        }
        _ => Err(HydraError::EmptyResponse),
    }
}

/// Map a reqwest failure into the transport/timeout taxonomy.
pub(crate) fn transport_error(e: reqwest::Error) -> HydraError {
    if e.is_timeout() {
        HydraError::Timeout(std::time::Duration::ZERO)
    } else {
        HydraError::Transport(e.to_string())
    }
}
