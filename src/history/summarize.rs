//! History compression.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::history::ChatHistory;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

/// Prefix of the assistant message that carries a summary.
pub const SUMMARY_PREFIX: &str = "[Summary of the conversation so far]";

const SUMMARY_SYSTEM_PROMPT: &str = "You condense conversations. Keep every fact the user \
     provided (names, contact details, decisions, corrections) and drop small talk. \
     When the user corrected an earlier answer, keep only the corrected value. \
     Output plain prose, no preamble.";

/// Options for a summarization call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryOptions {
    /// Trailing messages copied verbatim after the summary.
    pub keep_last_turns: usize,
    /// Token budget for the summary.
    pub max_tokens: u32,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            keep_last_turns: 0,
            max_tokens: 1024,
        }
    }
}

/// Compresses a history into a shorter one.
#[async_trait]
pub trait HistorySummarizer: Send + Sync {
    async fn summarize(
        &self,
        history: &ChatHistory,
        options: &SummaryOptions,
    ) -> Result<ChatHistory, LlmError>;
}

/// Summarizer backed by an LLM provider.
pub struct LlmSummarizer {
    llm: Arc<dyn LlmProvider>,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl HistorySummarizer for LlmSummarizer {
    async fn summarize(
        &self,
        history: &ChatHistory,
        options: &SummaryOptions,
    ) -> Result<ChatHistory, LlmError> {
        let transcript = history.transcript();
        if transcript.is_empty() {
            return Ok(ChatHistory::new());
        }

        let messages = vec![
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(format!("Summarize this conversation:\n\n{transcript}")),
        ];
        let request = CompletionRequest::new(messages)
            .with_max_tokens(options.max_tokens)
            .with_temperature(0.0);
        let response = self.llm.complete(request).await?;

        let summary = response.content.trim();
        if summary.is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: "empty summary".to_string(),
            });
        }

        let mut summarized = ChatHistory::new();
        summarized.add_message(ChatMessage::assistant(format!("{SUMMARY_PREFIX}\n{summary}")));

        let kept = history.messages();
        let start = kept.len().saturating_sub(options.keep_last_turns);
        for message in &kept[start..] {
            summarized.add_message((*message).clone());
        }

        tracing::debug!(
            before = history.len(),
            after = summarized.len(),
            tokens = response.output_tokens,
            "Summarized chat history"
        );
        Ok(summarized)
    }
}
