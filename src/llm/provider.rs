use std::sync::Arc;

use crate::config::LlmConfig;
use crate::llm::anthropic::AnthropicChat;
use crate::llm::ChatModel;
use crate::types::{AppError, AppResult};

/// Build the chat model from configuration. The service is constructed once
/// at startup and shared immutably by every agent.
pub fn create_chat_model(config: &LlmConfig) -> AppResult<Arc<dyn ChatModel>> {
    if config.anthropic_api_key.is_empty() {
        return Err(AppError::Internal(
            "ANTHROPIC_API_KEY is empty; cannot construct chat model".to_string(),
        ));
    }

    Ok(Arc::new(AnthropicChat::new(
        &config.anthropic_api_key,
        &config.model,
    )))
}
