//! hydrad — HydraMCP daemon.
//!
//! Serves the tool surface over JSON-RPC on standard streams. Builds the
//! backend roster from configuration in deterministic order (native API
//! backends first, then subscription, then local), wraps it in the
//! orchestrating [`SmartBackend`](hydramcp::orchestrator::SmartBackend),
//! and runs until stdin closes.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hydramcp::backends::{
    ChatCompletionsBackend, GenerateContentBackend, MessagesBackend, MultiBackend,
    SubscriptionBackend, SubscriptionFamily,
};
use hydramcp::orchestrator::{SmartBackend, SmartConfig};
use hydramcp::session::SessionReader;
use hydramcp::tools::ToolContext;
use hydramcp::Config;

/// HydraMCP daemon — multi-model consultation over standard streams.
#[derive(Parser)]
#[command(name = "hydrad")]
#[command(version)]
#[command(about = "Multi-model orchestration server")]
struct Args {
    /// Disable the response cache.
    #[arg(long)]
    no_cache: bool,
    /// Disable the circuit breaker.
    #[arg(long)]
    no_breaker: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Stdout carries the protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("HYDRA_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let multi = build_roster(&config);
    let providers = multi.provider_keys().join(", ");
    if providers.is_empty() {
        error!("no backends configured; set at least one provider API key or OLLAMA_BASE_URL");
        return ExitCode::FAILURE;
    }
    info!(providers = %providers, "backend roster assembled");

    let mut smart_config = SmartConfig::from_config(&config);
    if args.no_cache {
        smart_config = smart_config.without_cache();
    }
    if args.no_breaker {
        smart_config = smart_config.without_breaker();
    }
    let smart = Arc::new(SmartBackend::with_config(Arc::new(multi), smart_config));

    let sessions = config.sessions_dir.clone().map(SessionReader::new);
    let ctx = ToolContext { smart, sessions };

    match hydramcp::server::serve(ctx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server terminated abnormally");
            ExitCode::FAILURE
        }
    }
}

/// Assemble the backend roster. Registration order is the bare-ID routing
/// tie-break: native API backends first, then subscription, then local.
fn build_roster(config: &Config) -> MultiBackend {
    let mut multi = MultiBackend::new();

    if let Some(key) = &config.openai.api_key {
        let mut backend = ChatCompletionsBackend::openai("openai", key);
        if let Some(url) = &config.openai.base_url {
            backend = backend.base_url(url);
        }
        multi = multi.register("openai", Arc::new(backend.timeout(config.request_timeout)));
    }
    if let Some(key) = &config.anthropic.api_key {
        let mut backend = MessagesBackend::new("anthropic", key);
        if let Some(url) = &config.anthropic.base_url {
            backend = backend.base_url(url);
        }
        multi = multi.register(
            "anthropic",
            Arc::new(backend.timeout(config.request_timeout)),
        );
    }
    if let Some(key) = &config.gemini.api_key {
        let mut backend = GenerateContentBackend::new("gemini", key);
        if let Some(url) = &config.gemini.base_url {
            backend = backend.base_url(url);
        }
        multi = multi.register("gemini", Arc::new(backend.timeout(config.request_timeout)));
    }

    let subscription = SubscriptionBackend::new("subscription")
        .family(SubscriptionFamily::Claude, &config.claude_token_file)
        .family(SubscriptionFamily::Codex, &config.codex_token_file)
        .family(SubscriptionFamily::Gemini, &config.gemini_token_file)
        .timeout(config.request_timeout);
    if config.claude_token_file.exists()
        || config.codex_token_file.exists()
        || config.gemini_token_file.exists()
    {
        multi = multi.register("subscription", Arc::new(subscription));
    }

    if let Some(url) = &config.ollama_base_url {
        let backend = ChatCompletionsBackend::ollama("ollama")
            .base_url(url)
            .timeout(config.request_timeout);
        multi = multi.register("ollama", Arc::new(backend));
    }

    multi.fallback_chains(config.fallback_chains.clone())
}
