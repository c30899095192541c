//! Supervisor / multi-worker orchestrator
//!
//! A star topology over the graph engine: a routing node inspects the full
//! message history after every worker turn and picks the next worker or
//! terminates. Workers are bounded ReAct loops — propose a tool call, feed
//! the result back, repeat until the worker answers plainly or its step
//! budget runs out. Unlike the fixed retrieval pipelines, control flow here
//! is re-decided on every step.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::db::operations;
use crate::graph::{
    ChannelState, Checkpointer, CompiledGraph, GraphError, NodeFn, RouteFn, RunConfig, StateGraph,
    END, START,
};
use crate::llm::{structured_call, ChatMessage, ChatModel, ChatOptions, ToolSpec};
use crate::prompts;
use crate::tools::{find_tool, specs_for, Tool};
use crate::types::{AppError, AppResult};

const RECURSION_LIMIT: u32 = 30;
/// Tool-use rounds a single worker turn may take.
const WORKER_STEP_BUDGET: usize = 8;
const FINISH: &str = "FINISH";

pub const SUMMARIZER: &str = "summarizer";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorState {
    pub messages: Vec<ChatMessage>,
    /// The node the supervisor picked to act next; defaults to termination.
    pub next: String,
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            next: END.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SupervisorUpdate {
    pub messages: Vec<ChatMessage>,
    pub next: Option<String>,
}

impl ChannelState for SupervisorState {
    type Update = SupervisorUpdate;

    fn apply(&mut self, update: Self::Update) {
        self.messages.extend(update.messages);
        if let Some(next) = update.next {
            self.next = next;
        }
    }
}

pub struct Supervisor {
    graph: CompiledGraph<SupervisorState>,
    pool: PgPool,
}

impl Supervisor {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        worker_tools: Vec<Arc<dyn Tool>>,
        pool: PgPool,
        checkpointer: Arc<dyn Checkpointer<SupervisorState>>,
    ) -> Result<Self, GraphError> {
        let members = vec![SUMMARIZER.to_string()];
        let graph =
            Self::build_graph(llm, Arc::new(worker_tools), members)?.with_checkpointer(checkpointer);
        Ok(Self { graph, pool })
    }

    /// Fetch the audit data, wrap it in the report-analyst prompt, and let
    /// the orchestrator produce and store the report.
    pub async fn run(&self, task: Option<&str>, thread_id: &str) -> AppResult<String> {
        info!(thread_id, "Starting report generation");

        let audits = operations::get_audit_records(&self.pool).await?;
        let data = serde_json::to_string(&audits)
            .map_err(|e| AppError::Internal(format!("Failed to serialize audit data: {}", e)))?;

        let content = prompts::supervisor_summary_prompt(
            &data,
            task.unwrap_or("Create a detailed summary report of the audit data"),
            &Utc::now().date_naive().to_string(),
        );

        self.generate_summary_report(&content, thread_id).await
    }

    pub async fn generate_summary_report(
        &self,
        content: &str,
        thread_id: &str,
    ) -> AppResult<String> {
        info!(content_len = content.len(), thread_id, "Generating summary report");

        let update = SupervisorUpdate {
            messages: vec![ChatMessage::human(content)],
            next: None,
        };
        let config = RunConfig::for_thread(thread_id).with_recursion_limit(RECURSION_LIMIT);
        let state = self.graph.invoke(update, &config).await?;

        state
            .messages
            .last()
            .map(|m| m.content().to_string())
            .ok_or_else(|| AppError::Internal("Supervisor run produced no messages".to_string()))
    }

    fn build_graph(
        llm: Arc<dyn ChatModel>,
        worker_tools: Arc<Vec<Arc<dyn Tool>>>,
        members: Vec<String>,
    ) -> Result<CompiledGraph<SupervisorState>, GraphError> {
        let supervisor_node = Self::supervisor_node(llm.clone(), members.clone());
        let summarizer_node = Self::worker_node(
            llm,
            worker_tools,
            prompts::SUMMARIZER_WORKER_PROMPT,
            SUMMARIZER,
        );

        // The supervisor's pick is already a node name or the terminal
        // sentinel, so the route map stays empty.
        let route_next: RouteFn<SupervisorState> = Arc::new(|state| Ok(state.next.clone()));

        let mut graph = StateGraph::new()
            .add_node("supervisor", supervisor_node)
            .add_node(SUMMARIZER, summarizer_node)
            .add_edge(START, "supervisor")
            .add_conditional_edges("supervisor", route_next, HashMap::new());

        // Every worker reports back to the supervisor.
        for member in &members {
            graph = graph.add_edge(member, "supervisor");
        }

        graph.compile()
    }

    /// Structured-output routing call: the model must pick one of FINISH or
    /// a worker name.
    fn supervisor_node(llm: Arc<dyn ChatModel>, members: Vec<String>) -> NodeFn<SupervisorState> {
        let route_options: Vec<String> = std::iter::once(FINISH.to_string())
            .chain(members.iter().cloned())
            .collect();
        let route_tool = ToolSpec {
            name: "route".to_string(),
            description: "Select the next role.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "next": {
                        "type": "string",
                        "enum": route_options
                    }
                },
                "required": ["next"]
            }),
        };
        let member_list = members.join(", ");
        let option_list = format!("{}, {}", FINISH, member_list);

        Arc::new(move |state: SupervisorState| {
            let llm = llm.clone();
            let route_tool = route_tool.clone();
            let system = prompts::supervisor_system(&member_list);
            let question = prompts::supervisor_route_question(&option_list);
            Box::pin(async move {
                let mut messages = state.messages;
                messages.push(ChatMessage::human(question));

                let args =
                    structured_call(llm.as_ref(), &messages, Some(&system), route_tool, 256)
                        .await?;
                let next = args
                    .get("next")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| {
                        AppError::LlmApi("Supervisor routing call returned no 'next'".to_string())
                    })?;

                info!(next, "Supervisor routed");
                let next = if next == FINISH { END } else { next };
                Ok(SupervisorUpdate {
                    messages: Vec::new(),
                    next: Some(next.to_string()),
                })
            })
        })
    }

    /// A bounded ReAct loop: the worker keeps proposing tool calls and
    /// consuming their results until it answers without one. Tool failures
    /// propagate and abort the run.
    fn worker_node(
        llm: Arc<dyn ChatModel>,
        tools: Arc<Vec<Arc<dyn Tool>>>,
        system_prompt: &'static str,
        worker_name: &'static str,
    ) -> NodeFn<SupervisorState> {
        Arc::new(move |state: SupervisorState| {
            let llm = llm.clone();
            let tools = tools.clone();
            Box::pin(async move {
                let options = ChatOptions {
                    system: Some(system_prompt.to_string()),
                    tools: specs_for(&tools),
                    max_tokens: 4096,
                    ..ChatOptions::default()
                };

                let mut transcript = state.messages;
                let mut produced = Vec::new();

                for _ in 0..WORKER_STEP_BUDGET {
                    let outcome = llm.chat(&transcript, &options).await?;
                    let message = outcome.message;
                    transcript.push(message.clone());
                    produced.push(message.clone());

                    let calls = message.tool_calls().to_vec();
                    if calls.is_empty() {
                        return Ok(SupervisorUpdate {
                            messages: produced,
                            next: None,
                        });
                    }

                    for call in calls {
                        let tool = find_tool(&tools, &call.name).ok_or_else(|| {
                            AppError::Internal(format!(
                                "Worker '{}' requested unknown tool '{}'",
                                worker_name, call.name
                            ))
                        })?;
                        let result = tool.invoke(call.args.clone()).await?;
                        let result_message =
                            ChatMessage::tool_result(call.id, call.name, result);
                        transcript.push(result_message.clone());
                        produced.push(result_message);
                    }
                }

                warn!(worker = worker_name, budget = WORKER_STEP_BUDGET, "Worker step budget exhausted");
                Ok(SupervisorUpdate {
                    messages: produced,
                    next: None,
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::{ScriptedModel, SpyTool};
    use crate::graph::MemorySaver;
    use crate::llm::ToolCall;

    fn route_message(next: &str) -> ChatMessage {
        ChatMessage::AssistantToolUse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "route_1".to_string(),
                name: "route".to_string(),
                args: json!({ "next": next }),
            }],
        }
    }

    fn pdf_call_message() -> ChatMessage {
        ChatMessage::AssistantToolUse {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "pdf_1".to_string(),
                name: "generate_pdf_report".to_string(),
                args: json!({ "content": "# Report", "title": "Audit Summary" }),
            }],
        }
    }

    fn build_graph_for_test(
        llm: Arc<dyn ChatModel>,
        tools: Vec<Arc<dyn Tool>>,
    ) -> CompiledGraph<SupervisorState> {
        Supervisor::build_graph(llm, Arc::new(tools), vec![SUMMARIZER.to_string()])
            .unwrap()
            .with_checkpointer(MemorySaver::<SupervisorState>::new(8))
    }

    #[test]
    fn test_state_merge_concat_messages_latest_next() {
        let mut state = SupervisorState::default();
        assert_eq!(state.next, END);

        state.apply(SupervisorUpdate {
            messages: vec![ChatMessage::human("task")],
            next: Some(SUMMARIZER.to_string()),
        });
        state.apply(SupervisorUpdate {
            messages: vec![ChatMessage::assistant("done")],
            next: None,
        });
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.next, SUMMARIZER);
    }

    #[tokio::test]
    async fn test_worker_acts_then_supervisor_finishes() {
        let pdf_tool = SpyTool::new(
            "generate_pdf_report",
            "PDF generated successfully, file URL: http://localhost:3000/files/report.pdf",
        );
        let llm = ScriptedModel::new(vec![
            route_message(SUMMARIZER),
            pdf_call_message(),
            ChatMessage::assistant("Report complete: http://localhost:3000/files/report.pdf"),
            route_message(FINISH),
        ]);
        let graph = build_graph_for_test(llm.clone(), vec![pdf_tool.clone()]);

        let state = graph
            .invoke(
                SupervisorUpdate {
                    messages: vec![ChatMessage::human("summarize the audit data")],
                    next: None,
                },
                &RunConfig::for_thread("t1").with_recursion_limit(RECURSION_LIMIT),
            )
            .await
            .unwrap();

        assert_eq!(pdf_tool.call_count(), 1);
        assert_eq!(llm.remaining(), 0);
        let last = state.messages.last().unwrap();
        assert!(last.content().contains("Report complete"));
    }

    #[tokio::test]
    async fn test_supervisor_can_finish_immediately() {
        let pdf_tool = SpyTool::new("generate_pdf_report", "unused");
        let llm = ScriptedModel::new(vec![route_message(FINISH)]);
        let graph = build_graph_for_test(llm, vec![pdf_tool.clone()]);

        let state = graph
            .invoke(
                SupervisorUpdate {
                    messages: vec![ChatMessage::human("nothing to do")],
                    next: None,
                },
                &RunConfig::for_thread("t1"),
            )
            .await
            .unwrap();

        assert_eq!(pdf_tool.call_count(), 0);
        assert_eq!(state.next, END);
    }

    #[tokio::test]
    async fn test_supervisor_reconsults_after_every_worker_turn() {
        // Two worker rounds: the supervisor is consulted between them and
        // after the second one.
        let pdf_tool = SpyTool::new("generate_pdf_report", "PDF generated");
        let llm = ScriptedModel::new(vec![
            route_message(SUMMARIZER),
            ChatMessage::assistant("draft ready"),
            route_message(SUMMARIZER),
            pdf_call_message(),
            ChatMessage::assistant("final report stored"),
            route_message(FINISH),
        ]);
        let graph = build_graph_for_test(llm.clone(), vec![pdf_tool.clone()]);

        let state = graph
            .invoke(
                SupervisorUpdate {
                    messages: vec![ChatMessage::human("summarize")],
                    next: None,
                },
                &RunConfig::for_thread("t1").with_recursion_limit(RECURSION_LIMIT),
            )
            .await
            .unwrap();

        assert_eq!(llm.remaining(), 0);
        assert_eq!(pdf_tool.call_count(), 1);
        assert!(state.messages.last().unwrap().content().contains("final report"));
    }

    #[tokio::test]
    async fn test_checkpointed_thread_keeps_history() {
        let pdf_tool = SpyTool::new("generate_pdf_report", "PDF generated");
        let llm = ScriptedModel::new(vec![
            route_message(FINISH),
            route_message(FINISH),
        ]);
        let checkpointer = MemorySaver::<SupervisorState>::new(8);
        let graph =
            Supervisor::build_graph(llm, Arc::new(vec![pdf_tool as Arc<dyn Tool>]), vec![SUMMARIZER.to_string()])
                .unwrap()
                .with_checkpointer(checkpointer);

        let config = RunConfig::for_thread("conv");
        let first = graph
            .invoke(
                SupervisorUpdate {
                    messages: vec![ChatMessage::human("first request")],
                    next: None,
                },
                &config,
            )
            .await
            .unwrap();
        assert_eq!(first.messages.len(), 1);

        // The second invocation sees the first request in its history.
        let second = graph
            .invoke(
                SupervisorUpdate {
                    messages: vec![ChatMessage::human("second request")],
                    next: None,
                },
                &config,
            )
            .await
            .unwrap();
        assert_eq!(second.messages.len(), 2);
        assert_eq!(second.messages[0].content(), "first request");
    }
}
