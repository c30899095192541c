// Vector-index retrieval exposed through the tool contract
//
// Several independently-named retrievers can be registered at once (one per
// logical data domain); which one the model calls for a given question is
// left to its own judgment of the tool names and descriptions.

use async_trait::async_trait;
use serde_json::json;

use crate::embeddings::vector_index::{Document, Retriever};
use crate::tools::Tool;
use crate::types::{AppError, AppResult};

pub struct RetrieverTool {
    name: String,
    description: String,
    retriever: Retriever,
}

impl RetrieverTool {
    pub fn new(name: &str, description: &str, retriever: Retriever) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            retriever,
        }
    }

    pub fn format_documents(documents: &[Document]) -> String {
        documents
            .iter()
            .map(|d| d.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
impl Tool for RetrieverTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to run against the index"
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: serde_json::Value) -> AppResult<String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AppError::InvalidRequest("retriever tool requires a 'query' string".to_string()))?;

        let documents = self.retriever.retrieve(query).await?;
        Ok(Self::format_documents(&documents))
    }
}
