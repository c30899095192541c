//! Self-correcting generation agent
//!
//! Retrieval feeds per-document relevance grading; if nothing survives, the
//! question is rewritten and retrieval retried. A produced answer is then
//! critiqued twice — once against the retrieved facts (regenerate when
//! unsupported) and once against the question (rewrite and retry when
//! unhelpful). Both loops carry their own retry budget in state, so
//! exhausting one fails distinguishably from hitting the graph's overall
//! step ceiling.
//!
//! A cheap single-shot classifier gates entry: out-of-domain questions get a
//! fixed refusal and never touch the graph or a retriever.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agents::{grade_tool_spec, Verdict};
use crate::embeddings::vector_index::{Document, Retriever};
use crate::graph::{
    ChannelState, Checkpointer, CompiledGraph, GraphError, NodeFn, RouteFn, RunConfig, StateGraph,
    END, START,
};
use crate::llm::{structured_call, ChatMessage, ChatModel, ChatOptions};
use crate::prompts;
use crate::tools::retriever::RetrieverTool;
use crate::types::{AppError, AppResult};

const RECURSION_LIMIT: u32 = 50;
/// Retry budgets per correction loop, surfaced in state.
const MAX_TRANSFORM_ATTEMPTS: u32 = 3;
const MAX_GENERATE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SelfRagState {
    pub question: String,
    pub documents: Vec<Document>,
    pub generation: String,
    pub generation_v_documents_grade: Option<Verdict>,
    pub generation_v_question_grade: Option<Verdict>,
    pub transform_attempts: u32,
    pub generate_attempts: u32,
}

/// Partial update: a `None` field leaves the state untouched, a `Some`
/// replaces it. Documents are replaced wholesale on every retrieval and
/// grading pass — the latest working set always wins.
#[derive(Debug, Default)]
pub struct SelfRagUpdate {
    pub question: Option<String>,
    pub documents: Option<Vec<Document>>,
    pub generation: Option<String>,
    pub generation_v_documents_grade: Option<Verdict>,
    pub generation_v_question_grade: Option<Verdict>,
    pub transform_attempts: Option<u32>,
    pub generate_attempts: Option<u32>,
}

impl ChannelState for SelfRagState {
    type Update = SelfRagUpdate;

    fn apply(&mut self, update: Self::Update) {
        if let Some(question) = update.question {
            self.question = question;
        }
        if let Some(documents) = update.documents {
            self.documents = documents;
        }
        if let Some(generation) = update.generation {
            self.generation = generation;
        }
        if let Some(grade) = update.generation_v_documents_grade {
            self.generation_v_documents_grade = Some(grade);
        }
        if let Some(grade) = update.generation_v_question_grade {
            self.generation_v_question_grade = Some(grade);
        }
        if let Some(attempts) = update.transform_attempts {
            self.transform_attempts = attempts;
        }
        if let Some(attempts) = update.generate_attempts {
            self.generate_attempts = attempts;
        }
    }
}

pub struct SelfRagAgent {
    llm: Arc<dyn ChatModel>,
    graph: CompiledGraph<SelfRagState>,
}

impl SelfRagAgent {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        retriever: Arc<Retriever>,
        checkpointer: Arc<dyn Checkpointer<SelfRagState>>,
    ) -> Result<Self, GraphError> {
        let graph = Self::build_graph(llm.clone(), retriever)?.with_checkpointer(checkpointer);
        Ok(Self { llm, graph })
    }

    pub async fn ask(&self, question: &str, thread_id: &str) -> AppResult<String> {
        info!(thread_id, "Starting self-correcting query");

        if !self.is_in_domain(question).await? {
            info!("Question rejected by domain gate");
            return Ok(prompts::DOMAIN_REFUSAL.to_string());
        }

        let update = SelfRagUpdate {
            question: Some(question.to_string()),
            documents: Some(Vec::new()),
            generation: Some(String::new()),
            transform_attempts: Some(0),
            generate_attempts: Some(0),
            ..SelfRagUpdate::default()
        };

        let config = RunConfig::for_thread(thread_id).with_recursion_limit(RECURSION_LIMIT);
        let state = self.graph.invoke(update, &config).await?;

        info!(generation_len = state.generation.len(), "Self-correcting query complete");
        Ok(state.generation)
    }

    /// Single-shot domain classifier; anything but RELEVANT short-circuits.
    async fn is_in_domain(&self, question: &str) -> AppResult<bool> {
        let outcome = self
            .llm
            .chat(
                &[ChatMessage::human(question)],
                &ChatOptions::with_system(prompts::DOMAIN_GATE_SYSTEM),
            )
            .await?;
        Ok(!outcome.message.content().contains("NOT RELEVANT"))
    }

    fn build_graph(
        llm: Arc<dyn ChatModel>,
        retriever: Arc<Retriever>,
    ) -> Result<CompiledGraph<SelfRagState>, GraphError> {
        let retrieve = Self::retrieve_node(retriever);
        let grade_documents = Self::grade_documents_node(llm.clone());
        let generate = Self::generate_node(llm.clone());
        let grade_v_documents = Self::grade_generation_v_documents_node(llm.clone());
        let grade_v_question = Self::grade_generation_v_question_node(llm.clone());
        let transform_query = Self::transform_query_node(llm);

        // Zero surviving documents is an explicit empty-set edge, not a
        // relevance score: rewrite the question and retry retrieval.
        let decide_to_generate: RouteFn<SelfRagState> = Arc::new(|state| {
            if state.documents.is_empty() {
                if state.transform_attempts >= MAX_TRANSFORM_ATTEMPTS {
                    return Err(GraphError::LoopLimit {
                        loop_name: "transform_query".to_string(),
                        limit: MAX_TRANSFORM_ATTEMPTS,
                    });
                }
                info!("Decision: transform query");
                Ok("transform_query".to_string())
            } else {
                info!(documents = state.documents.len(), "Decision: generate");
                Ok("generate".to_string())
            }
        });

        let check_supported: RouteFn<SelfRagState> = Arc::new(|state| {
            match state.generation_v_documents_grade {
                Some(Verdict::Yes) => {
                    info!("Decision: generation supported by documents");
                    Ok("supported".to_string())
                }
                Some(Verdict::No) => {
                    if state.generate_attempts >= MAX_GENERATE_ATTEMPTS {
                        return Err(GraphError::LoopLimit {
                            loop_name: "generate".to_string(),
                            limit: MAX_GENERATE_ATTEMPTS,
                        });
                    }
                    info!("Decision: generation unsupported, regenerating");
                    Ok("not_supported".to_string())
                }
                None => Err(GraphError::Node {
                    node: "grade_generation_v_documents".to_string(),
                    source: Box::new(AppError::Internal(
                        "support grade missing from state".to_string(),
                    )),
                }),
            }
        });

        let check_useful: RouteFn<SelfRagState> = Arc::new(|state| {
            match state.generation_v_question_grade {
                Some(Verdict::Yes) => {
                    info!("Decision: generation useful");
                    Ok("useful".to_string())
                }
                Some(Verdict::No) => {
                    if state.transform_attempts >= MAX_TRANSFORM_ATTEMPTS {
                        return Err(GraphError::LoopLimit {
                            loop_name: "transform_query".to_string(),
                            limit: MAX_TRANSFORM_ATTEMPTS,
                        });
                    }
                    info!("Decision: generation not useful, rewriting question");
                    Ok("not_useful".to_string())
                }
                None => Err(GraphError::Node {
                    node: "grade_generation_v_question".to_string(),
                    source: Box::new(AppError::Internal(
                        "usefulness grade missing from state".to_string(),
                    )),
                }),
            }
        });

        StateGraph::new()
            .add_node("retrieve", retrieve)
            .add_node("grade_documents", grade_documents)
            .add_node("generate", generate)
            .add_node("grade_generation_v_documents", grade_v_documents)
            .add_node("grade_generation_v_question", grade_v_question)
            .add_node("transform_query", transform_query)
            .add_edge(START, "retrieve")
            .add_edge("retrieve", "grade_documents")
            .add_conditional_edges(
                "grade_documents",
                decide_to_generate,
                HashMap::new(),
            )
            .add_edge("transform_query", "retrieve")
            .add_edge("generate", "grade_generation_v_documents")
            .add_conditional_edges(
                "grade_generation_v_documents",
                check_supported,
                HashMap::from([
                    ("supported".to_string(), "grade_generation_v_question".to_string()),
                    ("not_supported".to_string(), "generate".to_string()),
                ]),
            )
            .add_conditional_edges(
                "grade_generation_v_question",
                check_useful,
                HashMap::from([
                    ("useful".to_string(), END.to_string()),
                    ("not_useful".to_string(), "transform_query".to_string()),
                ]),
            )
            .compile()
    }

    /// Retrieval failures degrade to an empty document set; the empty-set
    /// edge then sends the run through a query rewrite instead of aborting.
    fn retrieve_node(retriever: Arc<Retriever>) -> NodeFn<SelfRagState> {
        Arc::new(move |state: SelfRagState| {
            let retriever = retriever.clone();
            Box::pin(async move {
                info!("Retrieving documents");
                let documents = match retriever.retrieve(&state.question).await {
                    Ok(documents) => {
                        info!(count = documents.len(), "Documents retrieved");
                        documents
                    }
                    Err(e) => {
                        warn!(error = %e, "Retrieval failed, continuing with empty document set");
                        Vec::new()
                    }
                };
                Ok(SelfRagUpdate {
                    documents: Some(documents),
                    ..SelfRagUpdate::default()
                })
            })
        })
    }

    /// Sequential per-document grading: one independent LLM verdict per
    /// document, rejected documents dropped, survivor order preserved.
    fn grade_documents_node(llm: Arc<dyn ChatModel>) -> NodeFn<SelfRagState> {
        Arc::new(move |state: SelfRagState| {
            let llm = llm.clone();
            Box::pin(async move {
                info!(count = state.documents.len(), "Grading documents");

                let mut filtered = Vec::with_capacity(state.documents.len());
                for document in &state.documents {
                    let prompt =
                        prompts::grade_document_prompt(&state.question, &document.page_content);
                    let args = structured_call(
                        llm.as_ref(),
                        &[ChatMessage::human(prompt)],
                        None,
                        grade_tool_spec(),
                        256,
                    )
                    .await?;
                    match Verdict::from_args(&args)? {
                        Verdict::Yes => {
                            info!("Grade: document relevant");
                            filtered.push(document.clone());
                        }
                        Verdict::No => info!("Grade: document not relevant"),
                    }
                }

                Ok(SelfRagUpdate {
                    documents: Some(filtered),
                    ..SelfRagUpdate::default()
                })
            })
        })
    }

    fn generate_node(llm: Arc<dyn ChatModel>) -> NodeFn<SelfRagState> {
        Arc::new(move |state: SelfRagState| {
            let llm = llm.clone();
            Box::pin(async move {
                info!("Generating answer");
                let context = RetrieverTool::format_documents(&state.documents);
                let outcome = llm
                    .chat(
                        &[ChatMessage::human(prompts::generate_prompt(
                            &state.question,
                            &context,
                        ))],
                        &ChatOptions::default(),
                    )
                    .await?;
                Ok(SelfRagUpdate {
                    generation: Some(outcome.message.content().to_string()),
                    generate_attempts: Some(state.generate_attempts + 1),
                    ..SelfRagUpdate::default()
                })
            })
        })
    }

    fn grade_generation_v_documents_node(llm: Arc<dyn ChatModel>) -> NodeFn<SelfRagState> {
        Arc::new(move |state: SelfRagState| {
            let llm = llm.clone();
            Box::pin(async move {
                info!("Grading generation against documents");
                let documents = RetrieverTool::format_documents(&state.documents);
                let prompt =
                    prompts::grade_generation_v_documents_prompt(&documents, &state.generation);
                let args = structured_call(
                    llm.as_ref(),
                    &[ChatMessage::human(prompt)],
                    None,
                    grade_tool_spec(),
                    256,
                )
                .await?;
                Ok(SelfRagUpdate {
                    generation_v_documents_grade: Some(Verdict::from_args(&args)?),
                    ..SelfRagUpdate::default()
                })
            })
        })
    }

    fn grade_generation_v_question_node(llm: Arc<dyn ChatModel>) -> NodeFn<SelfRagState> {
        Arc::new(move |state: SelfRagState| {
            let llm = llm.clone();
            Box::pin(async move {
                info!("Grading generation against question");
                let prompt = prompts::grade_generation_v_question_prompt(
                    &state.question,
                    &state.generation,
                );
                let args = structured_call(
                    llm.as_ref(),
                    &[ChatMessage::human(prompt)],
                    None,
                    grade_tool_spec(),
                    256,
                )
                .await?;
                Ok(SelfRagUpdate {
                    generation_v_question_grade: Some(Verdict::from_args(&args)?),
                    ..SelfRagUpdate::default()
                })
            })
        })
    }

    /// Rewrite the question for better retrieval. The output is trusted
    /// as-is; only the attempt counter guards this loop.
    fn transform_query_node(llm: Arc<dyn ChatModel>) -> NodeFn<SelfRagState> {
        Arc::new(move |state: SelfRagState| {
            let llm = llm.clone();
            Box::pin(async move {
                info!("Transforming query");
                let outcome = llm
                    .chat(
                        &[ChatMessage::human(prompts::rewrite_prompt(&state.question))],
                        &ChatOptions::default(),
                    )
                    .await?;
                Ok(SelfRagUpdate {
                    question: Some(outcome.message.content().to_string()),
                    transform_attempts: Some(state.transform_attempts + 1),
                    ..SelfRagUpdate::default()
                })
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::{grade_message, ScriptedModel};
    use crate::embeddings::vector_index::VectorIndex;
    use crate::embeddings::Embedder;
    use crate::graph::MemorySaver;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            Err(AppError::Embedding("offline".to_string()))
        }
    }

    fn retriever_with_docs(docs: &[&str]) -> Arc<Retriever> {
        let mut index = VectorIndex::new();
        for doc in docs {
            index.add(vec![1.0, 0.0], Document::new(*doc, "audit_data"));
        }
        Arc::new(Retriever::new(
            Arc::new(index),
            Arc::new(CountingEmbedder {
                calls: AtomicUsize::new(0),
            }),
        ))
    }

    fn agent_with(llm: Arc<dyn ChatModel>, retriever: Arc<Retriever>) -> SelfRagAgent {
        SelfRagAgent::new(llm, retriever, MemorySaver::<SelfRagState>::new(16)).unwrap()
    }

    #[test]
    fn test_state_merge_latest_wins_and_omission_is_no_change() {
        let mut state = SelfRagState::default();
        state.apply(SelfRagUpdate {
            question: Some("original".to_string()),
            documents: Some(vec![Document::new("d1", "s")]),
            ..SelfRagUpdate::default()
        });
        // Omitting documents leaves them unchanged; a new question replaces.
        state.apply(SelfRagUpdate {
            question: Some("rewritten".to_string()),
            ..SelfRagUpdate::default()
        });
        assert_eq!(state.question, "rewritten");
        assert_eq!(state.documents.len(), 1);

        // Replacing documents overwrites, never appends.
        state.apply(SelfRagUpdate {
            documents: Some(vec![]),
            ..SelfRagUpdate::default()
        });
        assert!(state.documents.is_empty());
    }

    #[tokio::test]
    async fn test_happy_path_generates_without_rewrite() {
        let retriever = retriever_with_docs(&["open observations: 3", "audit backlog", "sbu list"]);
        // domain gate, 3 per-document grades, generate, 2 self-critiques
        let llm = ScriptedModel::new(vec![
            ChatMessage::assistant("RELEVANT"),
            grade_message("yes"),
            grade_message("yes"),
            grade_message("yes"),
            ChatMessage::assistant("There are 3 open observations."),
            grade_message("yes"),
            grade_message("yes"),
        ]);
        let agent = agent_with(llm.clone(), retriever);

        let answer = agent
            .ask("How many open observations are there?", "t1")
            .await
            .unwrap();
        assert_eq!(answer, "There are 3 open observations.");
        assert_eq!(llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_all_documents_rejected_routes_through_transform() {
        let retriever = retriever_with_docs(&["something unrelated"]);
        let llm = ScriptedModel::new(vec![
            ChatMessage::assistant("RELEVANT"),
            grade_message("no"),                          // first pass: rejected
            ChatMessage::assistant("better question"),    // transform_query
            grade_message("yes"),                         // second pass: kept
            ChatMessage::assistant("The backlog holds 4 audits."),
            grade_message("yes"),
            grade_message("yes"),
        ]);
        let agent = agent_with(llm.clone(), retriever);

        let answer = agent.ask("How big is the backlog?", "t1").await.unwrap();
        assert_eq!(answer, "The backlog holds 4 audits.");
        assert_eq!(llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_out_of_domain_question_is_refused_without_retrieval() {
        let embedder = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
        });
        let mut index = VectorIndex::new();
        index.add(vec![1.0, 0.0], Document::new("doc", "audit_data"));
        let retriever = Arc::new(Retriever::new(Arc::new(index), embedder.clone()));

        let llm = ScriptedModel::new(vec![ChatMessage::assistant("NOT RELEVANT")]);
        let agent = agent_with(llm, retriever);

        let answer = agent.ask("What's the weather?", "t1").await.unwrap();
        assert_eq!(answer, prompts::DOMAIN_REFUSAL);
        // The graph never ran: no embedding (hence no retrieval) happened.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retrieval_failure_degrades_to_transform_loop() {
        let mut index = VectorIndex::new();
        index.add(vec![1.0, 0.0], Document::new("doc", "audit_data"));
        let retriever = Arc::new(Retriever::new(Arc::new(index), Arc::new(FailingEmbedder)));

        // Every retrieval degrades to zero documents, so the run burns its
        // transform budget and fails with the loop-specific error.
        let llm = ScriptedModel::new(vec![
            ChatMessage::assistant("RELEVANT"),
            ChatMessage::assistant("rewrite 1"),
            ChatMessage::assistant("rewrite 2"),
            ChatMessage::assistant("rewrite 3"),
        ]);
        let agent = agent_with(llm, retriever);

        let err = agent.ask("How many audits?", "t1").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Graph(GraphError::LoopLimit { ref loop_name, .. })
                if loop_name == "transform_query"
        ));
    }

    #[tokio::test]
    async fn test_unsupported_generation_exhausts_generate_budget() {
        let retriever = retriever_with_docs(&["doc"]);
        let llm = ScriptedModel::new(vec![
            ChatMessage::assistant("RELEVANT"),
            grade_message("yes"),
            ChatMessage::assistant("attempt 1"),
            grade_message("no"),
            ChatMessage::assistant("attempt 2"),
            grade_message("no"),
            ChatMessage::assistant("attempt 3"),
            grade_message("no"),
        ]);
        let agent = agent_with(llm, retriever);

        let err = agent.ask("How many audits?", "t1").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Graph(GraphError::LoopLimit { ref loop_name, limit: 3 })
                if loop_name == "generate"
        ));
    }

    #[tokio::test]
    async fn test_regrading_same_documents_is_idempotent() {
        let retriever = retriever_with_docs(&["relevant doc", "irrelevant doc"]);
        // Two identical runs with a deterministic grader: keep the first
        // document, drop the second, both times.
        let script = || {
            vec![
                ChatMessage::assistant("RELEVANT"),
                grade_message("yes"),
                grade_message("no"),
                ChatMessage::assistant("answer"),
                grade_message("yes"),
                grade_message("yes"),
            ]
        };

        let first = agent_with(ScriptedModel::new(script()), retriever.clone());
        let second = agent_with(ScriptedModel::new(script()), retriever);

        let a = first.ask("question", "t1").await.unwrap();
        let b = second.ask("question", "t2").await.unwrap();
        assert_eq!(a, b);
    }
}
