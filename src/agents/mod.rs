//! Agent layer
//!
//! The three graph topologies built on the engine, plus the one-call
//! comparison summaries:
//!
//! - **rag**: agentic retrieval with a relevance-grading correction loop.
//! - **self_rag**: retrieval plus self-critique of the generation against
//!   both the retrieved facts and the original question.
//! - **supervisor**: a routing node orchestrating ReAct-style workers in a
//!   star topology.
//! - **summary**: SBU-wise and location-wise comparison summaries.

pub mod rag;
pub mod self_rag;
pub mod summary;
pub mod supervisor;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::llm::ToolSpec;
use crate::types::{AppError, AppResult};

/// Binary verdict produced by grading steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Yes,
    No,
}

impl Verdict {
    pub fn is_yes(self) -> bool {
        matches!(self, Verdict::Yes)
    }

    /// Read the verdict out of a grading tool call's arguments.
    pub fn from_args(args: &serde_json::Value) -> AppResult<Self> {
        match args.get("binary_score").and_then(|v| v.as_str()) {
            Some("yes") => Ok(Verdict::Yes),
            Some("no") => Ok(Verdict::No),
            other => Err(AppError::LlmApi(format!(
                "Grader returned an invalid binary_score: {:?}",
                other
            ))),
        }
    }
}

pub const GRADE_TOOL_NAME: &str = "give_relevance_score";

/// Forced-call tool schema that constrains a grader to a yes/no verdict.
pub fn grade_tool_spec() -> ToolSpec {
    ToolSpec {
        name: GRADE_TOOL_NAME.to_string(),
        description: "Give a relevance score to the retrieved documents.".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "binary_score": {
                    "type": "string",
                    "enum": ["yes", "no"],
                    "description": "Relevance score 'yes' or 'no'"
                }
            },
            "required": ["binary_score"]
        }),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_from_args() {
        assert_eq!(
            Verdict::from_args(&json!({"binary_score": "yes"})).unwrap(),
            Verdict::Yes
        );
        assert_eq!(
            Verdict::from_args(&json!({"binary_score": "no"})).unwrap(),
            Verdict::No
        );
        assert!(Verdict::from_args(&json!({"binary_score": "maybe"})).is_err());
        assert!(Verdict::from_args(&json!({})).is_err());
    }
}
