//! LLM integration for task groups.
//!
//! Only used for history compression. Supports:
//! - **Anthropic**: Messages API via reqwest

mod anthropic;
pub mod provider;

pub use anthropic::AnthropicProvider;
pub use provider::*;

use std::sync::Arc;

use secrecy::SecretString;

use crate::error::{ConfigError, LlmError};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub base_url: String,
    pub model: String,
}

impl LlmConfig {
    /// Read `ANTHROPIC_API_KEY`, `ANTHROPIC_BASE_URL` and `TASK_GROUP_MODEL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".to_string()))?;
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("TASK_GROUP_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self {
            backend: LlmBackend::Anthropic,
            api_key: SecretString::from(api_key),
            base_url,
            model,
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => {
            tracing::info!("Using Anthropic (model: {})", config.model);
            Ok(Arc::new(AnthropicProvider::new(
                config.api_key.clone(),
                config.base_url.clone(),
                config.model.clone(),
            )))
        }
    }
}
