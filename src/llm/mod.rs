//! LLM client layer
//!
//! A provider-agnostic chat interface over the conversation model used by the
//! agent graphs. Messages are a closed sum type so downstream code matches on
//! variants instead of sniffing for a `tool_calls` field at runtime.

pub mod anthropic;
pub mod provider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{AppError, AppResult, TokenUsage};

/// One conversation turn. Assistant turns that request tool invocations are a
/// distinct variant from plain assistant replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    System {
        content: String,
    },
    Human {
        content: String,
    },
    Assistant {
        content: String,
    },
    AssistantToolUse {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        tool_name: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System { content: content.into() }
    }

    pub fn human(content: impl Into<String>) -> Self {
        ChatMessage::Human { content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage::Assistant { content: content.into() }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        ChatMessage::Tool {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
        }
    }

    /// Text payload of the turn, whatever the variant.
    pub fn content(&self) -> &str {
        match self {
            ChatMessage::System { content }
            | ChatMessage::Human { content }
            | ChatMessage::Assistant { content }
            | ChatMessage::AssistantToolUse { content, .. }
            | ChatMessage::Tool { content, .. } => content,
        }
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            ChatMessage::AssistantToolUse { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// Wire-level description of a capability the model may elect to call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub system: Option<String>,
    pub tools: Vec<ToolSpec>,
    /// Force the model to call this tool. `None` leaves tool selection to the
    /// model (automatic when `tools` is non-empty).
    pub tool_choice: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            system: None,
            tools: Vec::new(),
            tool_choice: None,
            max_tokens: 2048,
            temperature: 0.0,
        }
    }
}

impl ChatOptions {
    pub fn with_system(system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub message: ChatMessage,
    pub usage: TokenUsage,
    pub stop_reason: String,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> AppResult<ChatOutcome>;
}

/// Invoke the model with a single forced tool and return that tool call's
/// arguments. Used for binary grading and supervisor routing, where the
/// schema constrains the model to a structured verdict.
pub async fn structured_call(
    llm: &dyn ChatModel,
    messages: &[ChatMessage],
    system: Option<&str>,
    tool: ToolSpec,
    max_tokens: u32,
) -> AppResult<serde_json::Value> {
    let tool_name = tool.name.clone();
    let options = ChatOptions {
        system: system.map(str::to_string),
        tools: vec![tool],
        tool_choice: Some(tool_name.clone()),
        max_tokens,
        temperature: 0.0,
    };

    let outcome = llm.chat(messages, &options).await?;
    let call = outcome
        .message
        .tool_calls()
        .iter()
        .find(|tc| tc.name == tool_name)
        .ok_or_else(|| {
            AppError::LlmApi(format!(
                "Model did not call the forced tool '{}'",
                tool_name
            ))
        })?;

    Ok(call.args.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_calls_only_on_tool_use_variant() {
        let plain = ChatMessage::assistant("done");
        assert!(plain.tool_calls().is_empty());

        let with_calls = ChatMessage::AssistantToolUse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "tc_1".to_string(),
                name: "retrieve_audit_data".to_string(),
                args: serde_json::json!({"query": "open observations"}),
            }],
        };
        assert_eq!(with_calls.tool_calls().len(), 1);
    }

    #[test]
    fn test_message_round_trips_through_serde() {
        let msg = ChatMessage::tool_result("tc_1", "retrieve_audit_data", "doc text");
        let json = serde_json::to_string(&msg).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, back);
    }
}
