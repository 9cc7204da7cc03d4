//! Anthropic Messages API provider over reqwest.
//!
//! POST {base_url}/v1/messages with `x-api-key` and `anthropic-version`
//! headers. System-role messages are folded into the top-level `system`
//! field; the rest are sent as the message list. Offered tools are sent as
//! `tools` with their schema under `input_schema`, and `tool_use` blocks in
//! the reply come back as `ToolCall`s.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
    ToolCall,
};

const PROVIDER: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic-compatible completion provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: SecretString, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            api_key,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    fn request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let system = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m: &ChatMessage| {
                serde_json::json!({
                    "role": m.role.to_string(),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
        });
        if !system.is_empty() {
            body["system"] = serde_json::Value::String(system);
        }
        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|tool| {
                    serde_json::json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.parameters,
                    })
                })
                .collect();
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }
}

/// Pull the text blocks and usage out of a Messages API response body.
fn parse_response(json: &serde_json::Value) -> Result<CompletionResponse, LlmError> {
    let blocks = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: "missing content array".to_string(),
        })?;

    let content = blocks
        .iter()
        .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("\n");

    let tool_calls = blocks
        .iter()
        .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("tool_use"))
        .map(|block| {
            let field = |key: &str| block.get(key).and_then(|v| v.as_str());
            match (field("id"), field("name")) {
                (Some(id), Some(name)) => Ok(ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: block.get("input").cloned().unwrap_or_default(),
                }),
                _ => Err(LlmError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    reason: "tool_use block without id or name".to_string(),
                }),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let usage = json.get("usage");
    let tokens = |key: &str| {
        usage
            .and_then(|u| u.get(key))
            .and_then(|v| v.as_u64())
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(0)
    };

    let finish_reason = match json.get("stop_reason").and_then(|s| s.as_str()) {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolUse,
        _ => FinishReason::Unknown,
    };

    Ok(CompletionResponse {
        content,
        tool_calls,
        input_tokens: tokens("input_tokens"),
        output_tokens: tokens("output_tokens"),
        finish_reason,
    })
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let body = self.request_body(&request);

        tracing::debug!(url = %url, model = %self.model, "Calling Anthropic API");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: format!("Failed to read response body: {e}"),
        })?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LlmError::AuthFailed {
                provider: PROVIDER.to_string(),
            });
        }
        if !status.is_success() {
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("API returned {status}: {text}"),
            });
        }

        let json: serde_json::Value = serde_json::from_str(&text)?;
        parse_response(&json)
    }
}
