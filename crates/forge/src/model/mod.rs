//! Generative model access
//!
//! The pipeline sees a model as a black box `system + user -> text` call.
//! Providers translate that into their HTTP APIs.

pub mod anthropic;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::DeliverableId;
use crate::config::ModelConfig;

pub use anthropic::AnthropicClient;
pub use openai::OpenAIClient;

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    Anthropic,
    OpenAI,
    /// Ollama local models (OpenAI-compatible)
    Ollama,
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderType::Anthropic => write!(f, "anthropic"),
            ProviderType::OpenAI => write!(f, "openai"),
            ProviderType::Ollama => write!(f, "ollama"),
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(ProviderType::Anthropic),
            "openai" => Ok(ProviderType::OpenAI),
            "ollama" => Ok(ProviderType::Ollama),
            _ => Err(format!("Unknown provider type: {}", s)),
        }
    }
}

/// Failures of a single model call. Every variant is a "generation failed"
/// input to the repair loop; none is retried at batch level.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Response parse error: {0}")]
    ParseError(String),

    #[error("Provider not available: {0}")]
    Unavailable(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Call cancelled")]
    Cancelled,
}

/// Per-call settings
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Deliverable being produced, for logging and call accounting
    pub deliverable: Option<DeliverableId>,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            model: anthropic::DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 8192,
            deliverable: None,
        }
    }
}

impl CallOptions {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            deliverable: None,
        }
    }

    pub fn for_deliverable(&self, deliverable: DeliverableId) -> Self {
        Self {
            deliverable: Some(deliverable),
            ..self.clone()
        }
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Send one prompt pair and return the raw response text
    async fn call(&self, system: &str, user: &str, options: &CallOptions) -> Result<String, ModelError>;
}

/// Build the configured provider. Fails when required credentials are absent.
pub fn create_client(config: &ModelConfig) -> Result<Arc<dyn ModelClient>, ModelError> {
    let client: Arc<dyn ModelClient> = match config.provider {
        ProviderType::Anthropic => {
            let client = AnthropicClient::new(config.endpoint.clone());
            if !client.is_configured() {
                return Err(ModelError::NotConfigured(
                    "ANTHROPIC_API_KEY is not set".to_string(),
                ));
            }
            Arc::new(client)
        }
        ProviderType::OpenAI => {
            let client = OpenAIClient::new(config.endpoint.clone());
            if !client.is_configured() {
                return Err(ModelError::NotConfigured("OPENAI_API_KEY is not set".to_string()));
            }
            Arc::new(client)
        }
        ProviderType::Ollama => Arc::new(OpenAIClient::ollama(config.endpoint.clone())),
    };
    tracing::info!(
        "[MODEL] Using {} provider with model {}",
        config.provider,
        config.model
    );
    Ok(client)
}

/// Client for store-only work (edits, readiness); every call fails
pub struct OfflineClient;

#[async_trait]
impl ModelClient for OfflineClient {
    fn name(&self) -> &str {
        "offline"
    }

    async fn call(&self, _system: &str, _user: &str, _options: &CallOptions) -> Result<String, ModelError> {
        Err(ModelError::NotConfigured(
            "offline pipeline cannot generate content".to_string(),
        ))
    }
}

fn status_error(status: u16, body: String, retry_after: Option<u64>) -> ModelError {
    match status {
        401 | 403 => ModelError::AuthError(body),
        429 => ModelError::RateLimited {
            retry_after_ms: retry_after.map(|secs| secs * 1000),
        },
        503 | 529 => ModelError::Unavailable(body),
        _ => ModelError::ApiError {
            status,
            message: body,
        },
    }
}

/// Request deadlines belong to the queue, so every transport failure here
/// is reported as a failed request
fn transport_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::RequestFailed(format!("transport timed out: {}", e))
    } else {
        ModelError::RequestFailed(e.to_string())
    }
}

/// Retry-After header in whole seconds, when present
fn retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
