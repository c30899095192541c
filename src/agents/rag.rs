//! Retrieval-Correction agent
//!
//! A messages-state graph: the agent node decides whether to call a retriever
//! tool at all; retrieved context is graded against the original question,
//! and an irrelevant batch sends the run through a query rewrite and back to
//! the agent. The message history is append-only — every node contributes
//! turns, none are replaced.
//!
//! Each call runs in a fresh session: the caller's thread id is suffixed
//! with a millisecond timestamp so checkpointed state never leaks between
//! questions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agents::{grade_tool_spec, Verdict, GRADE_TOOL_NAME};
use crate::graph::{
    ChannelState, Checkpointer, CompiledGraph, GraphError, NodeFn, RouteFn, RunConfig, StateGraph,
    END, START,
};
use crate::llm::{structured_call, ChatMessage, ChatModel, ChatOptions, ToolCall};
use crate::prompts;
use crate::tools::{find_tool, specs_for, Tool};
use crate::types::{AppError, AppResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagState {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Default)]
pub struct RagUpdate {
    pub messages: Vec<ChatMessage>,
}

impl ChannelState for RagState {
    type Update = RagUpdate;

    fn apply(&mut self, update: Self::Update) {
        self.messages.extend(update.messages);
    }
}

fn first_question(state: &RagState) -> AppResult<String> {
    state
        .messages
        .first()
        .map(|m| m.content().to_string())
        .ok_or_else(|| AppError::Internal("Graph state has no messages".to_string()))
}

fn node_error(node: &str, message: String) -> GraphError {
    GraphError::Node {
        node: node.to_string(),
        source: Box::new(AppError::Internal(message)),
    }
}

pub struct RagAgent {
    graph: CompiledGraph<RagState>,
}

impl RagAgent {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        tools: Vec<Arc<dyn Tool>>,
        checkpointer: Arc<dyn Checkpointer<RagState>>,
    ) -> Result<Self, GraphError> {
        let graph = Self::build_graph(llm, Arc::new(tools))?.with_checkpointer(checkpointer);
        Ok(Self { graph })
    }

    /// Ask the agent a question. The final message of the finished run is
    /// the answer — either a generated response over retrieved context or
    /// the agent's direct reply when it decided not to retrieve.
    pub async fn ask(&self, question: &str, thread_id: &str) -> AppResult<String> {
        // Fresh session per call: suffixing the thread id prevents context
        // carryover between questions.
        let unique_thread = format!("{}_{}", thread_id, Utc::now().timestamp_millis());
        info!(thread_id = %unique_thread, "Starting agent query");

        let update = RagUpdate {
            messages: vec![ChatMessage::human(prompts::rag_question(question))],
        };
        let state = self
            .graph
            .invoke(update, &RunConfig::for_thread(unique_thread))
            .await?;

        let answer = state
            .messages
            .last()
            .map(|m| m.content().to_string())
            .ok_or_else(|| AppError::Internal("Agent produced no messages".to_string()))?;
        info!(answer_len = answer.len(), "Agent query complete");
        Ok(answer)
    }

    fn build_graph(
        llm: Arc<dyn ChatModel>,
        tools: Arc<Vec<Arc<dyn Tool>>>,
    ) -> Result<CompiledGraph<RagState>, GraphError> {
        let agent_node = Self::agent_node(llm.clone(), tools.clone());
        let retrieve_node = Self::retrieve_node(tools);
        let grade_node = Self::grade_documents_node(llm.clone());
        let rewrite_node = Self::rewrite_node(llm.clone());
        let generate_node = Self::generate_node(llm);

        let should_retrieve: RouteFn<RagState> = Arc::new(|state| {
            match state.messages.last() {
                Some(ChatMessage::AssistantToolUse { tool_calls, .. }) if !tool_calls.is_empty() => {
                    info!("Decision: retrieve");
                    Ok("retrieve".to_string())
                }
                _ => {
                    info!("Decision: end");
                    Ok(END.to_string())
                }
            }
        });

        let check_relevance: RouteFn<RagState> = Arc::new(|state| {
            let last = state
                .messages
                .last()
                .ok_or_else(|| node_error("grade_documents", "no messages to grade".to_string()))?;
            let call = last
                .tool_calls()
                .iter()
                .find(|tc| tc.name == GRADE_TOOL_NAME)
                .ok_or_else(|| {
                    node_error(
                        "grade_documents",
                        "most recent message carries no relevance score".to_string(),
                    )
                })?;
            let verdict = Verdict::from_args(&call.args).map_err(|e| GraphError::Node {
                node: "grade_documents".to_string(),
                source: Box::new(e),
            })?;
            if verdict.is_yes() {
                info!("Decision: docs relevant");
                Ok("yes".to_string())
            } else {
                info!("Decision: docs not relevant");
                Ok("no".to_string())
            }
        });

        StateGraph::new()
            .add_node("agent", agent_node)
            .add_node("retrieve", retrieve_node)
            .add_node("grade_documents", grade_node)
            .add_node("rewrite", rewrite_node)
            .add_node("generate", generate_node)
            .add_edge(START, "agent")
            .add_conditional_edges("agent", should_retrieve, HashMap::new())
            .add_edge("retrieve", "grade_documents")
            .add_conditional_edges(
                "grade_documents",
                check_relevance,
                HashMap::from([
                    ("yes".to_string(), "generate".to_string()),
                    ("no".to_string(), "rewrite".to_string()),
                ]),
            )
            .add_edge("generate", END)
            .add_edge("rewrite", "agent")
            .compile()
    }

    /// The agent decides whether to retrieve by answering with or without a
    /// tool call. Earlier relevance-score turns are filtered out of the
    /// history first — the agent has no business seeing its grader's notes.
    fn agent_node(llm: Arc<dyn ChatModel>, tools: Arc<Vec<Arc<dyn Tool>>>) -> NodeFn<RagState> {
        Arc::new(move |state: RagState| {
            let llm = llm.clone();
            let tools = tools.clone();
            Box::pin(async move {
                info!(message_count = state.messages.len(), "Calling agent");

                let filtered: Vec<ChatMessage> = state
                    .messages
                    .into_iter()
                    .filter(|m| {
                        m.tool_calls()
                            .first()
                            .map(|tc| tc.name != GRADE_TOOL_NAME)
                            .unwrap_or(true)
                    })
                    .collect();

                let options = ChatOptions {
                    system: Some(prompts::RAG_AGENT_SYSTEM.to_string()),
                    tools: specs_for(&tools),
                    ..ChatOptions::default()
                };
                let outcome = llm.chat(&filtered, &options).await?;

                info!(
                    tool_call_count = outcome.message.tool_calls().len(),
                    "Agent response received"
                );
                Ok(RagUpdate {
                    messages: vec![outcome.message],
                })
            })
        })
    }

    /// Execute the tool calls requested by the last message. A failing
    /// retriever degrades to an empty-context tool result so the correction
    /// loop can proceed to a rewrite instead of failing the request.
    fn retrieve_node(tools: Arc<Vec<Arc<dyn Tool>>>) -> NodeFn<RagState> {
        Arc::new(move |state: RagState| {
            let tools = tools.clone();
            Box::pin(async move {
                let calls: Vec<ToolCall> = state
                    .messages
                    .last()
                    .map(|m| m.tool_calls().to_vec())
                    .unwrap_or_default();
                if calls.is_empty() {
                    return Err(AppError::Internal(
                        "retrieve node reached without pending tool calls".to_string(),
                    ));
                }

                let mut messages = Vec::with_capacity(calls.len());
                for call in calls {
                    let content = match find_tool(&tools, &call.name) {
                        Some(tool) => match tool.invoke(call.args.clone()).await {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(error = %e, tool = %call.name, "Retrieval failed, degrading to empty context");
                                String::new()
                            }
                        },
                        None => {
                            warn!(tool = %call.name, "Model requested an unregistered tool");
                            String::new()
                        }
                    };
                    messages.push(ChatMessage::tool_result(call.id, call.name, content));
                }
                Ok(RagUpdate { messages })
            })
        })
    }

    /// One verdict for the whole retrieved batch, carried in the history as
    /// a tool-use turn.
    fn grade_documents_node(llm: Arc<dyn ChatModel>) -> NodeFn<RagState> {
        Arc::new(move |state: RagState| {
            let llm = llm.clone();
            Box::pin(async move {
                info!("Grading retrieved context");

                let question = first_question(&state)?;
                let context = state
                    .messages
                    .last()
                    .map(|m| m.content().to_string())
                    .unwrap_or_default();

                let prompt = prompts::grade_context_prompt(&question, &context);
                let args = structured_call(
                    llm.as_ref(),
                    &[ChatMessage::human(prompt)],
                    None,
                    grade_tool_spec(),
                    256,
                )
                .await?;

                Ok(RagUpdate {
                    messages: vec![ChatMessage::AssistantToolUse {
                        content: String::new(),
                        tool_calls: vec![ToolCall {
                            id: format!("grade_{}", state.messages.len()),
                            name: GRADE_TOOL_NAME.to_string(),
                            args,
                        }],
                    }],
                })
            })
        })
    }

    fn rewrite_node(llm: Arc<dyn ChatModel>) -> NodeFn<RagState> {
        Arc::new(move |state: RagState| {
            let llm = llm.clone();
            Box::pin(async move {
                info!("Transforming query");
                let question = first_question(&state)?;
                let outcome = llm
                    .chat(
                        &[ChatMessage::human(prompts::rewrite_prompt(&question))],
                        &ChatOptions::default(),
                    )
                    .await?;
                Ok(RagUpdate {
                    messages: vec![outcome.message],
                })
            })
        })
    }

    /// Answer over the most recent retrieved context.
    fn generate_node(llm: Arc<dyn ChatModel>) -> NodeFn<RagState> {
        Arc::new(move |state: RagState| {
            let llm = llm.clone();
            Box::pin(async move {
                info!("Generating answer");
                let question = first_question(&state)?;
                let docs = state
                    .messages
                    .iter()
                    .rev()
                    .find_map(|m| match m {
                        ChatMessage::Tool { content, .. } => Some(content.clone()),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        AppError::Internal(
                            "No tool message found in the conversation history".to_string(),
                        )
                    })?;

                let outcome = llm
                    .chat(
                        &[ChatMessage::human(prompts::generate_prompt(&question, &docs))],
                        &ChatOptions::default(),
                    )
                    .await?;
                Ok(RagUpdate {
                    messages: vec![outcome.message],
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::{
        grade_message, tool_use_message, AdversarialModel, FailingTool, ScriptedModel, SpyTool,
    };
    use crate::graph::MemorySaver;

    fn agent_with(
        llm: Arc<dyn ChatModel>,
        tools: Vec<Arc<dyn Tool>>,
    ) -> RagAgent {
        RagAgent::new(llm, tools, MemorySaver::<RagState>::new(16)).unwrap()
    }

    #[test]
    fn test_state_merge_appends_messages() {
        let mut state = RagState::default();
        state.apply(RagUpdate {
            messages: vec![ChatMessage::human("q")],
        });
        state.apply(RagUpdate {
            messages: vec![ChatMessage::assistant("a"), ChatMessage::assistant("b")],
        });
        assert_eq!(state.messages.len(), 3);

        // An empty update leaves the history untouched.
        state.apply(RagUpdate::default());
        assert_eq!(state.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_relevant_first_pass_skips_rewrite() {
        let spy = SpyTool::new("retrieve_audit_data", "open observations: 3");
        let llm = ScriptedModel::new(vec![
            tool_use_message("retrieve_audit_data", "open observations"),
            grade_message("yes"),
            ChatMessage::assistant("There are 3 open observations."),
        ]);
        let agent = agent_with(llm.clone(), vec![spy.clone()]);

        let answer = agent
            .ask("How many open observations are there?", "t1")
            .await
            .unwrap();
        assert_eq!(answer, "There are 3 open observations.");
        assert_eq!(spy.call_count(), 1);
        // Every scripted turn was consumed: no rewrite happened.
        assert_eq!(llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_irrelevant_first_pass_rewrites_once() {
        let spy = SpyTool::new("retrieve_audit_data", "audit context");
        let llm = ScriptedModel::new(vec![
            tool_use_message("retrieve_audit_data", "open observations"),
            grade_message("no"),
            ChatMessage::assistant("What is the count of open audit observations?"),
            tool_use_message("retrieve_audit_data", "count of open audit observations"),
            grade_message("yes"),
            ChatMessage::assistant("There are 3 open observations."),
        ]);
        let agent = agent_with(llm.clone(), vec![spy.clone()]);

        let answer = agent
            .ask("How many open observations are there?", "t1")
            .await
            .unwrap();
        assert_eq!(answer, "There are 3 open observations.");
        assert_eq!(spy.call_count(), 2);
        assert_eq!(llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_plain_reply_ends_without_retrieval() {
        let spy = SpyTool::new("retrieve_audit_data", "unused");
        let llm = ScriptedModel::new(vec![ChatMessage::assistant(
            "I'm sorry, I can only answer questions based on the audit data and observation data.",
        )]);
        let agent = agent_with(llm, vec![spy.clone()]);

        let answer = agent.ask("What's the weather?", "t1").await.unwrap();
        assert!(answer.starts_with("I'm sorry"));
        assert_eq!(spy.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_retrieval_degrades_and_run_continues() {
        let failing = FailingTool::new("retrieve_audit_data");
        let llm = ScriptedModel::new(vec![
            tool_use_message("retrieve_audit_data", "open observations"),
            grade_message("no"),
            ChatMessage::assistant("improved question"),
            ChatMessage::assistant("No data is available to answer that."),
        ]);
        let agent = agent_with(llm, vec![failing]);

        // The retrieval failure becomes an empty tool result; the grader
        // rejects it, the query is rewritten, and the agent answers plainly.
        let answer = agent.ask("How many audits?", "t1").await.unwrap();
        assert_eq!(answer, "No data is available to answer that.");
    }

    #[tokio::test]
    async fn test_adversarial_grader_hits_recursion_limit() {
        let spy = SpyTool::new("retrieve_audit_data", "context");
        let agent = agent_with(
            Arc::new(AdversarialModel { grade: "no" }),
            vec![spy],
        );

        let err = agent.ask("How many audits?", "t1").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Graph(GraphError::RecursionLimit { .. })
        ));
    }

    #[tokio::test]
    async fn test_same_thread_id_still_starts_fresh() {
        // The timestamp suffix forces a new session per ask(), so a second
        // call with the same thread id replays nothing.
        let spy = SpyTool::new("retrieve_audit_data", "ctx");
        let llm = ScriptedModel::new(vec![
            ChatMessage::assistant("first answer"),
            ChatMessage::assistant("second answer"),
        ]);
        let agent = agent_with(llm, vec![spy]);

        assert_eq!(agent.ask("q1", "same").await.unwrap(), "first answer");
        assert_eq!(agent.ask("q2", "same").await.unwrap(), "second answer");
    }
}
