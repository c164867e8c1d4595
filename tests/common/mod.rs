//! Shared test fixtures: a scriptable mock backend and context builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use hydramcp::orchestrator::{SmartBackend, SmartConfig};
use hydramcp::tools::ToolContext;
use hydramcp::{
    Backend, HydraError, ModelInfo, QueryOptions, QueryResponse, Result, Usage,
};

/// One scripted outcome for a model.
pub enum Scripted {
    Respond(QueryResponse),
    FailStatus(u16, String),
}

/// Mock backend with per-model scripts and call counters.
///
/// Scripts are consumed in order; when a model's script is exhausted the
/// last entry repeats. Models without a script fail with a 404.
pub struct MockBackend {
    name: String,
    models: Vec<ModelInfo>,
    scripts: Mutex<HashMap<String, Vec<Scripted>>>,
    cursor: Mutex<HashMap<String, usize>>,
    calls: AtomicU32,
    calls_per_model: Mutex<HashMap<String, u32>>,
    healthy: bool,
    list_fails: bool,
}

impl MockBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            models: Vec::new(),
            scripts: Mutex::new(HashMap::new()),
            cursor: Mutex::new(HashMap::new()),
            calls: AtomicU32::new(0),
            calls_per_model: Mutex::new(HashMap::new()),
            healthy: true,
            list_fails: false,
        }
    }

    /// Add a model to the catalog.
    pub fn model(mut self, id: &str) -> Self {
        self.models.push(ModelInfo::new(id, &self.name));
        self
    }

    /// Append a success to a model's script (registers the model too).
    pub fn respond(self, model: &str, response: QueryResponse) -> Self {
        self.push(model, Scripted::Respond(response))
    }

    /// Append an HTTP-status failure to a model's script.
    pub fn fail(self, model: &str, status: u16, body: &str) -> Self {
        self.push(model, Scripted::FailStatus(status, body.to_string()))
    }

    fn push(mut self, model: &str, entry: Scripted) -> Self {
        if !self.models.iter().any(|m| m.id == model) {
            self.models.push(ModelInfo::new(model, &self.name));
        }
        self.scripts
            .get_mut()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push(entry);
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn listing_fails(mut self) -> Self {
        self.list_fails = true;
        self
    }

    /// Total queries dispatched to this backend.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Queries dispatched for one model.
    pub fn calls_for(&self, model: &str) -> u32 {
        *self
            .calls_per_model
            .lock()
            .unwrap()
            .get(model)
            .unwrap_or(&0)
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        if self.list_fails {
            return Err(HydraError::Transport("listing unavailable".into()));
        }
        Ok(self.models.clone())
    }

    async fn query(
        &self,
        model: &str,
        _prompt: &str,
        _options: &QueryOptions,
    ) -> Result<QueryResponse> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        *self
            .calls_per_model
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_insert(0) += 1;

        let scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get(model) else {
            return Err(HydraError::from_status(
                404,
                format!("model '{model}' not served here"),
            ));
        };
        let mut cursor = self.cursor.lock().unwrap();
        let index = cursor.entry(model.to_string()).or_insert(0);
        let entry = &script[(*index).min(script.len() - 1)];
        *index += 1;
        match entry {
            Scripted::Respond(response) => Ok(response.clone()),
            Scripted::FailStatus(status, body) => Err(HydraError::from_status(*status, body.clone())),
        }
    }
}

/// A plain success response with usage and latency.
pub fn ok_response(model: &str, content: &str, latency_ms: u64, tokens: (u32, u32)) -> QueryResponse {
    QueryResponse {
        model: model.to_string(),
        content: content.to_string(),
        usage: Some(Usage::new(tokens.0, tokens.1)),
        latency_ms,
        ..Default::default()
    }
}

/// Wrap a backend in a default-tuned SmartBackend.
pub fn smart(inner: Arc<dyn Backend>) -> Arc<SmartBackend> {
    Arc::new(SmartBackend::new(inner))
}

/// Wrap a backend with explicit tuning.
pub fn smart_with(inner: Arc<dyn Backend>, config: SmartConfig) -> Arc<SmartBackend> {
    Arc::new(SmartBackend::with_config(inner, config))
}

/// Tool context over a SmartBackend, without a sessions directory.
pub fn tool_ctx(smart: Arc<SmartBackend>) -> ToolContext {
    ToolContext {
        smart,
        sessions: None,
    }
}
