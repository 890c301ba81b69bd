//! Forge configuration
//!
//! Layered: built-in defaults, then an optional `forge.toml`, then
//! `FORGE__SECTION__KEY` environment variables.

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::model::ProviderType;
use crate::ForgeError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Concurrent model calls across the whole run
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_min_transcript_chars")]
    pub min_transcript_chars: usize,

    /// Overrides the webinar brief's duration for budget checks
    #[serde(default)]
    pub target_duration_minutes: Option<u32>,

    #[serde(default = "default_readiness_threshold")]
    pub readiness_threshold: u32,
}

fn default_concurrency_limit() -> usize {
    3
}

fn default_request_timeout_secs() -> u64 {
    90
}

fn default_min_transcript_chars() -> usize {
    400
}

fn default_readiness_threshold() -> u32 {
    crate::readiness::DEFAULT_THRESHOLD
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            request_timeout_secs: default_request_timeout_secs(),
            min_transcript_chars: default_min_transcript_chars(),
            target_duration_minutes: None,
            readiness_threshold: default_readiness_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: ProviderType,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Custom API endpoint (proxies, local servers)
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_model() -> String {
    crate::model::anthropic::DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    8192
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::default(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
}

fn default_database_url() -> String {
    "sqlite://forge.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
        }
    }
}

impl ForgeConfig {
    /// Load from an explicit config file (required when given), else
    /// `forge.toml` in the working directory when present, then the environment
    pub fn load_from(path: Option<&Path>) -> Result<Self, ForgeError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("forge").required(false),
        };
        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("FORGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ForgeError::ConfigError(e.to_string()))?;

        let loaded: ForgeConfig = config
            .try_deserialize()
            .map_err(|e| ForgeError::ConfigError(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Parse a TOML document with defaults filled in
    pub fn from_toml_str(toml: &str) -> Result<Self, ForgeError> {
        let loaded: ForgeConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ForgeError::ConfigError(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&self) -> Result<(), ForgeError> {
        if self.pipeline.concurrency_limit == 0 {
            return Err(ForgeError::ConfigError(
                "pipeline.concurrency_limit must be at least 1".to_string(),
            ));
        }
        if self.pipeline.readiness_threshold > 100 {
            return Err(ForgeError::ConfigError(
                "pipeline.readiness_threshold must be between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ForgeConfig::default();
        assert_eq!(config.pipeline.concurrency_limit, 3);
        assert_eq!(config.pipeline.request_timeout_secs, 90);
        assert_eq!(config.pipeline.min_transcript_chars, 400);
        assert_eq!(config.pipeline.readiness_threshold, 70);
        assert_eq!(config.model.provider, ProviderType::Anthropic);
        assert!(config.pipeline.target_duration_minutes.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ForgeConfig::from_toml_str(
            r#"
            [pipeline]
            concurrency_limit = 5
            target_duration_minutes = 45

            [model]
            provider = "ollama"
            model = "llama3.1"
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.concurrency_limit, 5);
        assert_eq!(config.pipeline.target_duration_minutes, Some(45));
        assert_eq!(config.pipeline.request_timeout_secs, 90);
        assert_eq!(config.model.provider, ProviderType::Ollama);
        assert_eq!(config.storage.database_url, "sqlite://forge.db");
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = ForgeConfig::from_toml_str("[pipeline]\nconcurrency_limit = 0").unwrap_err();
        assert!(matches!(err, ForgeError::ConfigError(_)));
    }
}
