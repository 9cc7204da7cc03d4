//! Conversation history shared across the tasks of a group.
//!
//! The group owns one `ChatHistory`. Each task receives a private copy and
//! the group adopts that copy back when the task's iteration ends.

pub mod summarize;

pub use summarize::{HistorySummarizer, LlmSummarizer, SummaryOptions};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::{ChatMessage, Role};

/// A tool invocation made by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The output returned to the model for a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutputRecord {
    pub call_id: String,
    pub name: String,
    pub output: String,
    pub is_error: bool,
}

/// Marker recording control passing from one task to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handoff {
    pub from: Option<String>,
    pub to: String,
}

/// Payload of a history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatItemKind {
    Message(ChatMessage),
    ToolCall(ToolCallRecord),
    ToolOutput(ToolOutputRecord),
    Handoff(Handoff),
}

/// One entry in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatItem {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub kind: ChatItemKind,
}

impl ChatItem {
    pub fn new(kind: ChatItemKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            kind,
        }
    }

    pub fn as_message(&self) -> Option<&ChatMessage> {
        match &self.kind {
            ChatItemKind::Message(m) => Some(m),
            _ => None,
        }
    }
}

/// Which items a filtered copy leaves out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    /// Drop system-role messages.
    pub exclude_instructions: bool,
    /// Drop task handoff markers.
    pub exclude_handoffs: bool,
    /// Drop messages with no visible text.
    pub exclude_empty: bool,
    /// Drop tool calls and their outputs.
    pub exclude_tool_calls: bool,
}

impl HistoryFilter {
    /// Everything except user/assistant turns with content.
    pub fn for_summary() -> Self {
        Self {
            exclude_instructions: true,
            exclude_handoffs: true,
            exclude_empty: true,
            exclude_tool_calls: true,
        }
    }

    fn keeps(&self, item: &ChatItem) -> bool {
        match &item.kind {
            ChatItemKind::Message(m) => {
                !(self.exclude_instructions && m.role == Role::System
                    || self.exclude_empty && m.is_empty())
            }
            ChatItemKind::ToolCall(_) | ChatItemKind::ToolOutput(_) => !self.exclude_tool_calls,
            ChatItemKind::Handoff(_) => !self.exclude_handoffs,
        }
    }
}

/// Ordered conversation history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatHistory {
    items: Vec<ChatItem>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history from plain messages.
    pub fn from_messages(messages: impl IntoIterator<Item = ChatMessage>) -> Self {
        Self {
            items: messages
                .into_iter()
                .map(|m| ChatItem::new(ChatItemKind::Message(m)))
                .collect(),
        }
    }

    pub fn push(&mut self, kind: ChatItemKind) {
        self.items.push(ChatItem::new(kind));
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        self.push(ChatItemKind::Message(message));
    }

    pub fn add_tool_call(&mut self, call: ToolCallRecord) {
        self.push(ChatItemKind::ToolCall(call));
    }

    pub fn add_tool_output(&mut self, output: ToolOutputRecord) {
        self.push(ChatItemKind::ToolOutput(output));
    }

    pub fn add_handoff(&mut self, from: Option<String>, to: impl Into<String>) {
        self.push(ChatItemKind::Handoff(Handoff { from, to: to.into() }));
    }

    pub fn items(&self) -> &[ChatItem] {
        &self.items
    }

    /// Messages only, in order.
    pub fn messages(&self) -> Vec<&ChatMessage> {
        self.items.iter().filter_map(ChatItem::as_message).collect()
    }

    /// Copy of this history without the items `filter` excludes.
    pub fn copy(&self, filter: &HistoryFilter) -> ChatHistory {
        ChatHistory {
            items: self
                .items
                .iter()
                .filter(|item| filter.keeps(item))
                .cloned()
                .collect(),
        }
    }

    /// `Role: content` lines for user and assistant messages.
    pub fn transcript(&self) -> String {
        self.items
            .iter()
            .filter_map(ChatItem::as_message)
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = match m.role {
                    Role::User => "User",
                    _ => "Assistant",
                };
                format!("{}: {}", role, m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
