//! Configuration loading.
//!
//! Configuration is resolved from two layers, process environment winning:
//! 1. Process environment variables.
//! 2. `~/.hydramcp/.env` (simple `KEY=value` lines, `#` comments, optional
//!    `export ` prefix).
//!
//! Malformed numeric values fall back to defaults with a warning rather
//! than aborting startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::Result;

/// Default per-request deadline in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Credentials and endpoint for one API family.
#[derive(Debug, Clone, Default)]
pub struct ApiFamilyConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

impl ApiFamilyConfig {
    /// A family is configured when it has a key (or, for keyless local
    /// servers, an explicit base URL).
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() || self.base_url.is_some()
    }
}

/// Fallback chains: primary model → ordered alternatives.
pub type FallbackChains = HashMap<String, Vec<String>>;

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai: ApiFamilyConfig,
    pub anthropic: ApiFamilyConfig,
    pub gemini: ApiFamilyConfig,
    /// Ollama needs only a base URL; default is the local daemon.
    pub ollama_base_url: Option<String>,

    /// Subscription token file paths, one per family.
    pub claude_token_file: PathBuf,
    pub codex_token_file: PathBuf,
    pub gemini_token_file: PathBuf,

    /// Circuit-breaker tuning.
    pub max_failures: u32,
    pub cooldown: Duration,

    /// Response-cache tuning.
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    /// Model-list cache TTL.
    pub model_list_ttl: Duration,

    /// Global per-request deadline.
    pub request_timeout: Duration,

    /// Fallback chains parsed from `HYDRA_FALLBACK_CHAINS` JSON.
    pub fallback_chains: FallbackChains,

    /// Session transcript root for the recap tool.
    pub sessions_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            openai: ApiFamilyConfig::default(),
            anthropic: ApiFamilyConfig::default(),
            gemini: ApiFamilyConfig::default(),
            ollama_base_url: None,
            claude_token_file: home.join(".claude").join(".credentials.json"),
            codex_token_file: home.join(".codex").join("auth.json"),
            gemini_token_file: home.join(".gemini").join("oauth_creds.json"),
            max_failures: 3,
            cooldown: Duration::from_millis(60_000),
            cache_ttl: Duration::from_millis(900_000),
            cache_max_entries: 100,
            model_list_ttl: Duration::from_millis(30_000),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            fallback_chains: FallbackChains::new(),
            sessions_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment layered over
    /// `~/.hydramcp/.env`.
    pub fn load() -> Result<Self> {
        let env_file = dirs::home_dir().map(|h| h.join(".hydramcp").join(".env"));
        Self::load_with(env_file.as_deref(), |key| std::env::var(key).ok())
    }

    /// Load with an explicit env file and variable lookup (testing seam).
    pub fn load_with(
        env_file: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let file_vars = match env_file {
            Some(path) if path.exists() => parse_env_file(path)?,
            _ => HashMap::new(),
        };
        let get = |key: &str| env(key).or_else(|| file_vars.get(key).cloned());

        let mut config = Config::default();

        config.openai = ApiFamilyConfig {
            api_key: get("OPENAI_API_KEY"),
            base_url: get("OPENAI_BASE_URL"),
        };
        config.anthropic = ApiFamilyConfig {
            api_key: get("ANTHROPIC_API_KEY"),
            base_url: get("ANTHROPIC_BASE_URL"),
        };
        config.gemini = ApiFamilyConfig {
            api_key: get("GEMINI_API_KEY"),
            base_url: get("GEMINI_BASE_URL"),
        };
        config.ollama_base_url = get("OLLAMA_BASE_URL");

        if let Some(path) = get("HYDRA_CLAUDE_TOKEN_FILE") {
            config.claude_token_file = PathBuf::from(path);
        }
        if let Some(path) = get("HYDRA_CODEX_TOKEN_FILE") {
            config.codex_token_file = PathBuf::from(path);
        }
        if let Some(path) = get("HYDRA_GEMINI_TOKEN_FILE") {
            config.gemini_token_file = PathBuf::from(path);
        }

        if let Some(n) = parse_num::<u32>(&get("HYDRA_MAX_FAILURES"), "HYDRA_MAX_FAILURES") {
            config.max_failures = n;
        }
        if let Some(ms) = parse_num::<u64>(&get("HYDRA_COOLDOWN_MS"), "HYDRA_COOLDOWN_MS") {
            config.cooldown = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_num::<u64>(&get("HYDRA_CACHE_TTL_MS"), "HYDRA_CACHE_TTL_MS") {
            config.cache_ttl = Duration::from_millis(ms);
        }
        if let Some(n) =
            parse_num::<usize>(&get("HYDRA_CACHE_MAX_ENTRIES"), "HYDRA_CACHE_MAX_ENTRIES")
        {
            config.cache_max_entries = n;
        }
        if let Some(ms) =
            parse_num::<u64>(&get("HYDRA_MODEL_LIST_TTL_MS"), "HYDRA_MODEL_LIST_TTL_MS")
        {
            config.model_list_ttl = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_num::<u64>(&get("HYDRA_TIMEOUT_MS"), "HYDRA_TIMEOUT_MS") {
            config.request_timeout = Duration::from_millis(ms);
        }

        if let Some(json) = get("HYDRA_FALLBACK_CHAINS") {
            match serde_json::from_str::<FallbackChainsDoc>(&json) {
                Ok(doc) => config.fallback_chains = doc.0,
                Err(e) => warn!(error = %e, "ignoring malformed HYDRA_FALLBACK_CHAINS"),
            }
        }

        config.sessions_dir = get("HYDRA_SESSIONS_DIR").map(PathBuf::from);

        Ok(config)
    }
}

#[derive(Deserialize)]
struct FallbackChainsDoc(FallbackChains);

/// Parse a `KEY=value` env file. Blank lines and `#` comments are skipped;
/// a leading `export ` and surrounding quotes on the value are stripped.
fn parse_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let body = std::fs::read_to_string(path)?;
    let mut vars = HashMap::new();
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"').trim_matches('\'');
            vars.insert(key.trim().to_string(), value.to_string());
        }
    }
    Ok(vars)
}

fn parse_num<T: std::str::FromStr>(value: &Option<String>, key: &str) -> Option<T> {
    let raw = value.as_deref()?;
    match raw.parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(key, raw, "ignoring malformed numeric config value");
            None
        }
    }
}
