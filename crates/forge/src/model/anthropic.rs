//! Anthropic Messages API client

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::{retry_after, status_error, transport_error, CallOptions, ModelClient, ModelError};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl AnthropicClient {
    /// Reads `ANTHROPIC_API_KEY` from the environment
    pub fn new(endpoint: Option<String>) -> Self {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok();
        if api_key.is_none() {
            tracing::warn!("[MODEL] ANTHROPIC_API_KEY not found; Anthropic calls will fail");
        }
        Self {
            client: Client::new(),
            api_key,
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn payload(system: &str, user: &str, options: &CallOptions) -> Value {
        serde_json::json!({
            "model": options.model,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "system": system,
            "messages": [{ "role": "user", "content": user }],
        })
    }

    /// Concatenate the text blocks of a Messages API response
    fn parse_response(json: &Value) -> Result<String, ModelError> {
        let blocks = json["content"]
            .as_array()
            .ok_or_else(|| ModelError::ParseError("response has no content blocks".to_string()))?;
        Ok(blocks
            .iter()
            .filter(|block| block["type"].as_str() == Some("text"))
            .filter_map(|block| block["text"].as_str())
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn call(&self, system: &str, user: &str, options: &CallOptions) -> Result<String, ModelError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ModelError::AuthError("No Anthropic API key configured".to_string()))?;

        tracing::debug!(
            "[Anthropic] Sending request: model={}, deliverable={:?}, prompt_chars={}",
            options.model,
            options.deliverable,
            system.len() + user.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_response_joins_text_blocks() {
        let json = json!({
            "content": [
                {"type": "text", "text": "{\"a\":"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": " 1}"}
            ],
            "stop_reason": "end_turn"
        });
        assert_eq!(AnthropicClient::parse_response(&json).unwrap(), "{\"a\": 1}");
        assert!(AnthropicClient::parse_response(&json!({"error": "x"})).is_err());
    }

    #[test]
    fn test_payload_carries_system_separately() {
        let payload = AnthropicClient::payload("sys", "usr", &CallOptions::default());
        assert_eq!(payload["system"], "sys");
        assert_eq!(payload["messages"][0]["content"], "usr");
        assert_eq!(payload["model"], DEFAULT_MODEL);
    }
}
