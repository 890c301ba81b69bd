//! OpenAI-compatible Chat Completions client (OpenAI, Ollama, proxies)

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{retry_after, status_error, transport_error, CallOptions, ModelClient, ModelError};

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const OLLAMA_ENDPOINT: &str = "http://localhost:11434/v1/chat/completions";

pub struct OpenAIClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    name: &'static str,
    /// Local endpoints accept unauthenticated requests
    requires_key: bool,
}

impl OpenAIClient {
    /// Reads `OPENAI_API_KEY` from the environment
    pub fn new(endpoint: Option<String>) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").ok();
        if api_key.is_none() {
            tracing::warn!("[MODEL] OPENAI_API_KEY not found; OpenAI calls will fail");
        }
        Self {
            client: Client::new(),
            api_key,
            endpoint: endpoint.unwrap_or_else(|| OPENAI_ENDPOINT.to_string()),
            name: "openai",
            requires_key: true,
        }
    }

    pub fn ollama(endpoint: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: None,
            endpoint: endpoint.unwrap_or_else(|| OLLAMA_ENDPOINT.to_string()),
            name: "ollama",
            requires_key: false,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.requires_key || self.api_key.is_some()
    }

    fn payload(system: &str, user: &str, options: &CallOptions) -> Value {
        serde_json::json!({
            "model": options.model,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        })
    }

    fn parse_response(json: &Value) -> Result<String, ModelError> {
        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ModelError::ParseError("response has no message content".to_string()))
    }
}

#[async_trait]
impl ModelClient for OpenAIClient {
    fn name(&self) -> &str {
        self.name
    }

    async fn call(&self, system: &str, user: &str, options: &CallOptions) -> Result<String, ModelError> {
        if !self.is_configured() {
            return Err(ModelError::AuthError("No OpenAI API key configured".to_string()));
        }

        tracing::debug!(
            "[{}] Sending request: model={}, deliverable={:?}, prompt_chars={}",
            self.name,
            options.model,
            options.deliverable,
            system.len() + user.len()
        );

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .json(&Self::payload(system, user, options))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry = retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body, retry));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| ModelError::ParseError(e.to_string()))?;
        Self::parse_response(&json)
    }
}
