// Anthropic Messages API adapter
// Documentation: https://docs.anthropic.com/en/api/messages
//
// Tool-result turns are sent as user-role messages carrying tool_result
// content blocks, and a System variant inside the message list is folded into
// the top-level system string (the Messages API has no system role).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, ChatModel, ChatOptions, ChatOutcome, ToolCall};
use crate::types::{AppError, AppResult, TokenUsage};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicChat {
    client: Client,
    api_key: String,
    model: String,
}

// Request types for the Messages API

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ApiToolChoice>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: Vec<ApiContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ApiContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ApiToolChoice {
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "tool")]
    Tool { name: String },
}

// Response types

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    stop_reason: Option<String>,
    usage: ApiUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

impl AnthropicChat {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Flatten our tagged message list into API messages, folding System
    /// variants into the top-level system string.
    fn convert_messages(
        messages: &[ChatMessage],
        system: Option<&str>,
    ) -> (Option<String>, Vec<ApiMessage>) {
        let mut system_parts: Vec<String> = system.map(|s| vec![s.to_string()]).unwrap_or_default();
        let mut api_messages = Vec::with_capacity(messages.len());

        for message in messages {
            match message {
                ChatMessage::System { content } => system_parts.push(content.clone()),
                ChatMessage::Human { content } => api_messages.push(ApiMessage {
                    role: "user",
                    content: vec![ApiContentBlock::Text {
                        text: content.clone(),
                    }],
                }),
                ChatMessage::Assistant { content } => api_messages.push(ApiMessage {
                    role: "assistant",
                    content: vec![ApiContentBlock::Text {
                        text: content.clone(),
                    }],
                }),
                ChatMessage::AssistantToolUse {
                    content,
                    tool_calls,
                } => {
                    let mut blocks = Vec::with_capacity(tool_calls.len() + 1);
                    if !content.is_empty() {
                        blocks.push(ApiContentBlock::Text {
                            text: content.clone(),
                        });
                    }
                    for call in tool_calls {
                        blocks.push(ApiContentBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            input: call.args.clone(),
                        });
                    }
                    api_messages.push(ApiMessage {
                        role: "assistant",
                        content: blocks,
                    });
                }
                ChatMessage::Tool {
                    tool_call_id,
                    content,
                    ..
                } => api_messages.push(ApiMessage {
                    role: "user",
                    content: vec![ApiContentBlock::ToolResult {
                        tool_use_id: tool_call_id.clone(),
                        content: content.clone(),
                    }],
                }),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, api_messages)
    }

    fn convert_response(response: MessagesResponse) -> ChatOutcome {
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for block in response.content {
            match block {
                ResponseBlock::Text { text: t } => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&t);
                }
                ResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall {
                        id,
                        name,
                        args: input,
                    });
                }
            }
        }

        let message = if tool_calls.is_empty() {
            ChatMessage::Assistant { content: text }
        } else {
            ChatMessage::AssistantToolUse {
                content: text,
                tool_calls,
            }
        };

        ChatOutcome {
            message,
            usage: TokenUsage {
                prompt_tokens: response.usage.input_tokens,
                completion_tokens: response.usage.output_tokens,
                total_tokens: response.usage.input_tokens + response.usage.output_tokens,
            },
            stop_reason: response.stop_reason.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ChatModel for AnthropicChat {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> AppResult<ChatOutcome> {
        let url = format!("{}/messages", ANTHROPIC_API_BASE);
        let (system, api_messages) = Self::convert_messages(messages, options.system.as_deref());

        let tool_choice = if options.tools.is_empty() {
            None
        } else {
            match &options.tool_choice {
                Some(name) => Some(ApiToolChoice::Tool { name: name.clone() }),
                None => Some(ApiToolChoice::Auto),
            }
        };

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            system,
            messages: api_messages,
            tools: options
                .tools
                .iter()
                .map(|t| ApiTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                })
                .collect(),
            tool_choice,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::LlmApi(format!("Anthropic request failed: {}", e)))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(parsed) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                return Err(AppError::LlmApi(format!(
                    "Anthropic API error ({}): {} ({})",
                    status, parsed.error.message, parsed.error.error_type
                )));
            }

            return Err(AppError::LlmApi(format!(
                "Anthropic API error ({}): {}",
                status, error_text
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AppError::LlmApi(format!("Failed to parse Anthropic response: {}", e)))?;

        Ok(Self::convert_response(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_variants_fold_into_system_string() {
        let messages = vec![
            ChatMessage::system("be terse"),
            ChatMessage::human("hello"),
        ];
        let (system, api_messages) = AnthropicChat::convert_messages(&messages, Some("base"));
        assert_eq!(system.as_deref(), Some("base\n\nbe terse"));
        assert_eq!(api_messages.len(), 1);
        assert_eq!(api_messages[0].role, "user");
    }

    #[test]
    fn test_tool_result_becomes_user_role() {
        let messages = vec![ChatMessage::tool_result("tc_9", "retrieve_audit_data", "docs")];
        let (_, api_messages) = AnthropicChat::convert_messages(&messages, None);
        assert_eq!(api_messages[0].role, "user");
        assert!(matches!(
            api_messages[0].content[0],
            ApiContentBlock::ToolResult { .. }
        ));
    }

    #[test]
    fn test_response_with_tool_use_maps_to_tool_use_variant() {
        let response = MessagesResponse {
            content: vec![
                ResponseBlock::Text {
                    text: "searching".to_string(),
                },
                ResponseBlock::ToolUse {
                    id: "tc_1".to_string(),
                    name: "retrieve_audit_data".to_string(),
                    input: serde_json::json!({"query": "overdue audits"}),
                },
            ],
            stop_reason: Some("tool_use".to_string()),
            usage: ApiUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
        };
        let outcome = AnthropicChat::convert_response(response);
        assert_eq!(outcome.message.tool_calls().len(), 1);
        assert_eq!(outcome.usage.total_tokens, 15);
    }
}
