//! Tools the agents can call
//!
//! A tool is a named, schema-described capability the LLM may elect to invoke
//! mid-conversation. The agent layer turns registered tools into `ToolSpec`s
//! for the model and executes the calls the model emits.

pub mod pdf_report;
pub mod retriever;

use async_trait::async_trait;
use std::sync::Arc;

use crate::llm::ToolSpec;
use crate::types::AppResult;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema of the tool's input object.
    fn parameters(&self) -> serde_json::Value;
    async fn invoke(&self, args: serde_json::Value) -> AppResult<String>;
}

pub fn spec_for(tool: &dyn Tool) -> ToolSpec {
    ToolSpec {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        input_schema: tool.parameters(),
    }
}

pub fn specs_for(tools: &[Arc<dyn Tool>]) -> Vec<ToolSpec> {
    tools.iter().map(|t| spec_for(t.as_ref())).collect()
}

pub fn find_tool<'a>(tools: &'a [Arc<dyn Tool>], name: &str) -> Option<&'a Arc<dyn Tool>> {
    tools.iter().find(|t| t.name() == name)
}
