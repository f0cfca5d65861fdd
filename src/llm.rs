//! Model invocation client.
//!
//! One logical call to the text-generation service per [`InvocationClient::invoke`],
//! with bounded retries, exponential backoff and a per-call timeout.

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use rig::client::builder::{BoxAgent, BoxAgentBuilder, DynClientBuilder};
use rig::client::completion::CompletionClientDyn;
use rig::completion::Prompt;
use rig::providers::{anthropic, gemini, openai};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, LazyLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;

use crate::error::{ModelError, PipelineError};
use crate::providers::{Provider, ProviderConfig};
use crate::tokens::count_tokens;
use crate::{log_debug, log_warn};

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingParameters {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
}

impl Default for SamplingParameters {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.0,
            top_k: 250,
            top_p: 0.999,
        }
    }
}

impl SamplingParameters {
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Check the documented ranges.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_tokens == 0 {
            return Err("max_tokens must be greater than 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            ));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(format!("top_p must be within [0, 1], got {}", self.top_p));
        }
        Ok(())
    }
}

/// A fully rendered request.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub model_id: String,
    pub prompt: String,
    pub params: SamplingParameters,
}

impl InvocationRequest {
    /// Build a request; omitted params fall back to [`SamplingParameters::default`].
    pub fn new(
        model_id: impl Into<String>,
        prompt: impl Into<String>,
        params: Option<SamplingParameters>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            prompt: prompt.into(),
            params: params.unwrap_or_default(),
        }
    }
}

/// Completion text returned by a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub text: String,
}

/// Backend performing a single attempt against the service.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &InvocationRequest) -> Result<String, ModelError>;
}

/// Retry and timeout discipline around a [`ModelClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: u64,
    pub max_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 10,
            backoff_factor: 2,
            max_delay_ms: 30_000,
            timeout_ms: 120_000,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Near-zero delays, for tests and dry runs.
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 1,
            backoff_factor: 1,
            max_delay_ms: 1,
            timeout_ms: 5_000,
        }
    }

    fn strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        let retries = usize::try_from(self.max_attempts.saturating_sub(1)).unwrap_or(usize::MAX);
        ExponentialBackoff::from_millis(self.base_delay_ms.max(1))
            .factor(self.backoff_factor.max(1))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .take(retries)
    }
}

/// The client injected into stages and the orchestrator.
#[derive(Clone)]
pub struct InvocationClient {
    backend: Arc<dyn ModelClient>,
    retry: RetryPolicy,
}

impl InvocationClient {
    pub fn new(backend: Arc<dyn ModelClient>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Perform one logical call, retrying transient failures with the same request.
    pub async fn invoke(
        &self,
        request: &InvocationRequest,
    ) -> Result<InvocationResult, PipelineError> {
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::Invocation {
                attempts: 0,
                cause: ModelError::Rejected("retry budget allows no attempts".to_string()),
            });
        }

        log_debug!(
            "Invoking model {} | prompt: {} chars, ~{} tokens | max_tokens={} temperature={} top_k={} top_p={}",
            request.model_id,
            request.prompt.len(),
            count_tokens(&request.prompt),
            request.params.max_tokens,
            request.params.temperature,
            request.params.top_k,
            request.params.top_p
        );

        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let backend = &self.backend;
        let max_attempts = self.retry.max_attempts;
        let timeout_ms = self.retry.timeout_ms;
        let timeout = Duration::from_millis(timeout_ms);

        let result = RetryIf::spawn(
            self.retry.strategy(),
            move || async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                log_debug!("Model call attempt {}/{}", attempt, max_attempts);
                match tokio::time::timeout(timeout, backend.complete(request)).await {
                    Ok(Ok(text)) => Ok(text),
                    Ok(Err(e)) => {
                        log_warn!("Model call attempt {} failed: {}", attempt, e);
                        Err(e)
                    }
                    Err(_) => {
                        log_warn!("Model call attempt {} timed out", attempt);
                        Err(ModelError::Timeout(timeout_ms))
                    }
                }
            },
            |e: &ModelError| e.is_transient(),
        )
        .await;

        let attempts = counter.load(Ordering::SeqCst);
        match result {
            Ok(text) => {
                log_debug!(
                    "Model call succeeded after {} attempt(s), {} chars",
                    attempts,
                    text.len()
                );
                Ok(InvocationResult { text })
            }
            Err(cause) => Err(PipelineError::Invocation { attempts, cause }),
        }
    }
}

/// Hosted-model backend built on rig's provider clients.
///
/// API keys are read from the provider's environment variable. A configured
/// endpoint replaces the provider's default base URL.
pub struct RigModelClient {
    provider: Provider,
    endpoint: Option<String>,
    additional_params: HashMap<String, String>,
}

impl RigModelClient {
    pub fn new(provider: Provider, additional_params: HashMap<String, String>) -> Self {
        Self {
            provider,
            endpoint: None,
            additional_params,
        }
    }

    /// Backend for `provider` using its `[providers.<name>]` table.
    pub fn from_config(provider: Provider, config: &ProviderConfig) -> Self {
        Self::new(provider, config.additional_params.clone())
            .with_endpoint(config.endpoint.clone())
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint.filter(|url| !url.trim().is_empty());
        self
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    fn request_params(&self, params: &SamplingParameters) -> serde_json::Value {
        let mut extra = serde_json::Map::new();
        extra.insert("top_p".to_string(), serde_json::json!(params.top_p));
        if self.provider.supports_top_k() {
            extra.insert("top_k".to_string(), serde_json::json!(params.top_k));
        }
        for (key, value) in &self.additional_params {
            let parsed = serde_json::from_str(value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            extra.insert(key.clone(), parsed);
        }
        serde_json::Value::Object(extra)
    }

    fn agent_builder(&self, model_id: &str) -> Result<BoxAgentBuilder<'static>, ModelError> {
        let Some(url) = self.endpoint.as_deref() else {
            return DynClientBuilder::new()
                .agent(self.provider.name(), model_id)
                .map_err(|e| ModelError::Rejected(format!("Failed to create agent: {e}")));
        };

        let api_key = std::env::var(self.provider.api_key_env()).map_err(|_| {
            ModelError::Rejected(format!("{} is not set", self.provider.api_key_env()))
        })?;
        let client_error = |e: rig::client::ClientBuilderError| {
            ModelError::Rejected(format!("Invalid endpoint {url}: {e}"))
        };

        log_debug!("Using {} endpoint {}", self.provider, url);
        let builder = match self.provider {
            Provider::Anthropic => {
                let client = anthropic::Client::builder(&api_key)
                    .base_url(url)
                    .build()
                    .map_err(client_error)?;
                CompletionClientDyn::agent(&client, model_id)
            }
            Provider::OpenAI => {
                let client = openai::Client::builder(&api_key).base_url(url).build();
                CompletionClientDyn::agent(&client, model_id)
            }
            Provider::Gemini => {
                let client = gemini::Client::builder(&api_key)
                    .base_url(url)
                    .build()
                    .map_err(client_error)?;
                CompletionClientDyn::agent(&client, model_id)
            }
        };
        Ok(builder)
    }

    /// Build the agent synchronously (`DynClientBuilder` is not Send)
    fn build_agent(&self, request: &InvocationRequest) -> Result<BoxAgent<'static>, ModelError> {
        let agent = self
            .agent_builder(&request.model_id)?
            .temperature(f64::from(request.params.temperature))
            .max_tokens(u64::from(request.params.max_tokens))
            .additional_params(self.request_params(&request.params))
            .build();
        Ok(agent)
    }
}

#[async_trait]
impl ModelClient for RigModelClient {
    async fn complete(&self, request: &InvocationRequest) -> Result<String, ModelError> {
        let agent = self.build_agent(request)?;
        agent
            .prompt(request.prompt.as_str())
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))
    }
}

/// Client-side status codes and error types that retrying cannot fix.
static REJECTED_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:400|401|403|404|422)\b")
        .expect("Failed to compile rejected-status regex pattern")
});

const REJECTED_MARKERS: &[&str] = &[
    "unauthorized",
    "forbidden",
    "bad request",
    "not found",
    "not_found",
    "invalid_request",
    "unprocessable",
    "invalid x-api-key",
    "invalid api key",
];

fn classify_provider_error(message: &str) -> ModelError {
    let lower = message.to_lowercase();
    let rejected = REJECTED_STATUS.is_match(&lower)
        || REJECTED_MARKERS.iter().any(|marker| lower.contains(marker));
    if rejected {
        ModelError::Rejected(message.to_string())
    } else {
        ModelError::Transient(message.to_string())
    }
}

type Responder = Box<dyn Fn(&InvocationRequest) -> Result<String, ModelError> + Send + Sync>;

/// Scripted backend for tests and dry runs.
///
/// Queued outcomes are consumed first; once the queue is empty the optional
/// responder answers. Every request is recorded.
#[derive(Clone, Default)]
pub struct MockModelClient {
    outcomes: Arc<Mutex<VecDeque<Result<String, ModelError>>>>,
    responder: Option<Arc<Responder>>,
    requests: Arc<Mutex<Vec<InvocationRequest>>>,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request not covered by the queue with `f`.
    pub fn with_responder<F>(f: F) -> Self
    where
        F: Fn(&InvocationRequest) -> Result<String, ModelError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Arc::new(Box::new(f))),
            ..Self::default()
        }
    }

    pub fn push_response(&self, text: impl Into<String>) {
        self.outcomes.lock().push_back(Ok(text.into()));
    }

    pub fn push_failure(&self, error: ModelError) {
        self.outcomes.lock().push_back(Err(error));
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<InvocationRequest> {
        self.requests.lock().clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.prompt.clone()).collect()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn complete(&self, request: &InvocationRequest) -> Result<String, ModelError> {
        self.requests.lock().push(request.clone());
        if let Some(outcome) = self.outcomes.lock().pop_front() {
            return outcome;
        }
        match &self.responder {
            Some(responder) => responder(request),
            None => Err(ModelError::Rejected("no scripted response left".to_string())),
        }
    }
}
