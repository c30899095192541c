// Graph construction and the single-threaded interpreter

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::graph::checkpoint::Checkpointer;
use crate::graph::state::ChannelState;
use crate::types::{AppError, AppResult};

/// Virtual source of the entry edge.
pub const START: &str = "__start__";
/// Terminal sentinel: routing here halts execution.
pub const END: &str = "__end__";

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("recursion limit of {limit} exceeded at node '{node}'")]
    RecursionLimit { limit: u32, node: String },

    #[error("retry budget of {limit} exceeded for loop '{loop_name}'")]
    LoopLimit { loop_name: String, limit: u32 },

    #[error("node '{node}' failed: {source}")]
    Node {
        node: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("graph has no entry point")]
    MissingEntryPoint,

    #[error("edge from '{from}' targets unknown node '{to}'")]
    InvalidEdge { from: String, to: String },

    #[error("node '{node}' has no outgoing edge")]
    MissingEdge { node: String },
}

/// A node: current state in, partial update out. Nodes must not mutate
/// anything outside the returned update (external side effects such as LLM
/// calls and logging aside).
pub type NodeFn<S> = Arc<
    dyn Fn(S) -> BoxFuture<'static, AppResult<<S as ChannelState>::Update>> + Send + Sync,
>;

/// Routing predicate for conditional edges, evaluated against the state
/// *after* the source node's update has been merged. May fail, e.g. when a
/// per-loop retry budget is exhausted.
pub type RouteFn<S> = Arc<dyn Fn(&S) -> Result<String, GraphError> + Send + Sync>;

enum Edge<S: ChannelState> {
    Direct(String),
    Conditional {
        decide: RouteFn<S>,
        /// Maps branch labels to node names. When empty, the label returned
        /// by `decide` is itself the target.
        routes: HashMap<String, String>,
    },
}

/// Builder for a graph: an explicit registry of node name → function and an
/// edge table, inspectable and validated at compile time rather than wired up
/// through ad-hoc closures.
pub struct StateGraph<S: ChannelState> {
    nodes: HashMap<String, NodeFn<S>>,
    edges: HashMap<String, Edge<S>>,
    entry: Option<String>,
}

impl<S: ChannelState> Default for StateGraph<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ChannelState> StateGraph<S> {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
        }
    }

    pub fn add_node(mut self, name: &str, node: NodeFn<S>) -> Self {
        self.nodes.insert(name.to_string(), node);
        self
    }

    /// Unconditional edge. `START` as the source sets the entry point.
    pub fn add_edge(mut self, from: &str, to: &str) -> Self {
        if from == START {
            self.entry = Some(to.to_string());
        } else {
            self.edges
                .insert(from.to_string(), Edge::Direct(to.to_string()));
        }
        self
    }

    /// Conditional edge. `routes` maps the labels returned by `decide` to
    /// target nodes; pass an empty map when the labels already are node names
    /// (or `END`).
    pub fn add_conditional_edges(
        mut self,
        from: &str,
        decide: RouteFn<S>,
        routes: HashMap<String, String>,
    ) -> Self {
        self.edges
            .insert(from.to_string(), Edge::Conditional { decide, routes });
        self
    }

    /// Validate the topology and produce an executable graph.
    pub fn compile(self) -> Result<CompiledGraph<S>, GraphError> {
        let entry = self.entry.clone().ok_or(GraphError::MissingEntryPoint)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::InvalidEdge {
                from: START.to_string(),
                to: entry,
            });
        }

        for (from, edge) in &self.edges {
            let targets: Vec<&String> = match edge {
                Edge::Direct(to) => vec![to],
                Edge::Conditional { routes, .. } => routes.values().collect(),
            };
            for to in targets {
                if to != END && !self.nodes.contains_key(to) {
                    return Err(GraphError::InvalidEdge {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
        }

        for name in self.nodes.keys() {
            if !self.edges.contains_key(name) {
                return Err(GraphError::MissingEdge { node: name.clone() });
            }
        }

        Ok(CompiledGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            checkpointer: None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Scopes checkpointed state across invocations. `None` runs stateless.
    pub thread_id: Option<String>,
    pub recursion_limit: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            thread_id: None,
            recursion_limit: 25,
        }
    }
}

impl RunConfig {
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    pub fn with_recursion_limit(mut self, limit: u32) -> Self {
        self.recursion_limit = limit;
        self
    }
}

pub struct CompiledGraph<S: ChannelState> {
    nodes: HashMap<String, NodeFn<S>>,
    edges: HashMap<String, Edge<S>>,
    entry: String,
    checkpointer: Option<Arc<dyn Checkpointer<S>>>,
}

impl<S: ChannelState> CompiledGraph<S> {
    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer<S>>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Execute the graph to completion.
    ///
    /// The input update is merged into the thread's checkpointed state (or
    /// `S::default()` for a fresh thread), then nodes run one at a time from
    /// the entry point until an edge routes to `END`. The merged state is
    /// checkpointed after every successful node; a failing node aborts the
    /// run without committing its step.
    pub async fn invoke(&self, input: S::Update, config: &RunConfig) -> Result<S, GraphError> {
        let mut state = match (&self.checkpointer, &config.thread_id) {
            (Some(checkpointer), Some(thread_id)) => {
                checkpointer.get(thread_id).await.unwrap_or_default()
            }
            _ => S::default(),
        };
        state.apply(input);

        let mut current = self.entry.clone();
        let mut steps: u32 = 0;

        while current != END {
            steps += 1;
            if steps > config.recursion_limit {
                return Err(GraphError::RecursionLimit {
                    limit: config.recursion_limit,
                    node: current,
                });
            }

            debug!(node = %current, step = steps, "Executing graph node");

            let node = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::UnknownNode(current.clone()))?;

            let update = node(state.clone()).await.map_err(|source| GraphError::Node {
                node: current.clone(),
                source: Box::new(source),
            })?;
            state.apply(update);

            if let (Some(checkpointer), Some(thread_id)) = (&self.checkpointer, &config.thread_id) {
                checkpointer.put(thread_id, state.clone()).await;
            }

            current = self.next_node(&current, &state)?;
        }

        info!(steps, "Graph run complete");
        Ok(state)
    }

    fn next_node(&self, from: &str, state: &S) -> Result<String, GraphError> {
        let edge = self.edges.get(from).ok_or_else(|| GraphError::MissingEdge {
            node: from.to_string(),
        })?;

        match edge {
            Edge::Direct(to) => Ok(to.clone()),
            Edge::Conditional { decide, routes } => {
                let label = decide(state)?;
                if routes.is_empty() {
                    return Ok(label);
                }
                routes
                    .get(&label)
                    .cloned()
                    .ok_or_else(|| GraphError::InvalidEdge {
                        from: from.to_string(),
                        to: label,
                    })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemorySaver;

    /// Counter state: `total` accumulates, `last` is latest-wins.
    #[derive(Debug, Clone, Default, PartialEq)]
    struct Counter {
        total: u32,
        last: Option<String>,
    }

    #[derive(Default)]
    struct CounterUpdate {
        add: u32,
        last: Option<String>,
    }

    impl ChannelState for Counter {
        type Update = CounterUpdate;

        fn apply(&mut self, update: Self::Update) {
            self.total += update.add;
            if let Some(last) = update.last {
                self.last = Some(last);
            }
        }
    }

    fn add_node(amount: u32, name: &'static str) -> NodeFn<Counter> {
        Arc::new(move |_state| {
            Box::pin(async move {
                Ok(CounterUpdate {
                    add: amount,
                    last: Some(name.to_string()),
                })
            })
        })
    }

    #[tokio::test]
    async fn test_linear_graph_runs_to_end() {
        let graph = StateGraph::new()
            .add_node("a", add_node(1, "a"))
            .add_node("b", add_node(10, "b"))
            .add_edge(START, "a")
            .add_edge("a", "b")
            .add_edge("b", END)
            .compile()
            .unwrap();

        let state = graph
            .invoke(CounterUpdate::default(), &RunConfig::default())
            .await
            .unwrap();
        assert_eq!(state.total, 11);
        assert_eq!(state.last.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_conditional_edge_routes_on_merged_state() {
        let decide: RouteFn<Counter> = Arc::new(|state| {
            Ok(if state.total >= 3 {
                END.to_string()
            } else {
                "a".to_string()
            })
        });

        let graph = StateGraph::new()
            .add_node("a", add_node(1, "a"))
            .add_edge(START, "a")
            .add_conditional_edges("a", decide, HashMap::new())
            .compile()
            .unwrap();

        let state = graph
            .invoke(CounterUpdate::default(), &RunConfig::default())
            .await
            .unwrap();
        assert_eq!(state.total, 3);
    }

    #[tokio::test]
    async fn test_infinite_cycle_hits_recursion_limit() {
        let decide: RouteFn<Counter> = Arc::new(|_| Ok("a".to_string()));

        let graph = StateGraph::new()
            .add_node("a", add_node(1, "a"))
            .add_edge(START, "a")
            .add_conditional_edges("a", decide, HashMap::new())
            .compile()
            .unwrap();

        let config = RunConfig::default().with_recursion_limit(5);
        let err = graph.invoke(CounterUpdate::default(), &config).await.unwrap_err();
        assert!(matches!(err, GraphError::RecursionLimit { limit: 5, .. }));
    }

    #[tokio::test]
    async fn test_failing_node_aborts_without_commit() {
        let failing: NodeFn<Counter> = Arc::new(|_state| {
            Box::pin(async { Err(crate::types::AppError::LlmApi("boom".to_string())) })
        });

        let checkpointer = MemorySaver::<Counter>::new(4);
        let graph = StateGraph::new()
            .add_node("a", add_node(1, "a"))
            .add_node("b", failing)
            .add_edge(START, "a")
            .add_edge("a", "b")
            .add_edge("b", END)
            .compile()
            .unwrap()
            .with_checkpointer(checkpointer.clone());

        let config = RunConfig::for_thread("t1");
        let err = graph.invoke(CounterUpdate::default(), &config).await.unwrap_err();
        assert!(matches!(err, GraphError::Node { ref node, .. } if node == "b"));

        // The checkpoint holds the last successful step, not the failed one.
        let persisted: Counter = checkpointer.get("t1").await.unwrap();
        assert_eq!(persisted.total, 1);
        assert_eq!(persisted.last.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_checkpoint_resumes_accumulated_state() {
        let checkpointer = MemorySaver::<Counter>::new(4);
        let graph = StateGraph::new()
            .add_node("a", add_node(1, "a"))
            .add_edge(START, "a")
            .add_edge("a", END)
            .compile()
            .unwrap()
            .with_checkpointer(checkpointer);

        let config = RunConfig::for_thread("conv");
        let first = graph.invoke(CounterUpdate::default(), &config).await.unwrap();
        assert_eq!(first.total, 1);

        // Second invocation resumes from the persisted state.
        let second = graph.invoke(CounterUpdate::default(), &config).await.unwrap();
        assert_eq!(second.total, 2);

        // A different thread starts fresh.
        let other = graph
            .invoke(CounterUpdate::default(), &RunConfig::for_thread("other"))
            .await
            .unwrap();
        assert_eq!(other.total, 1);
    }

    #[tokio::test]
    async fn test_route_error_propagates() {
        let decide: RouteFn<Counter> = Arc::new(|_| {
            Err(GraphError::LoopLimit {
                loop_name: "rewrite".to_string(),
                limit: 3,
            })
        });

        let graph = StateGraph::new()
            .add_node("a", add_node(1, "a"))
            .add_edge(START, "a")
            .add_conditional_edges("a", decide, HashMap::new())
            .compile()
            .unwrap();

        let err = graph
            .invoke(CounterUpdate::default(), &RunConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::LoopLimit { .. }));
    }

    #[test]
    fn test_compile_rejects_unknown_edge_target() {
        let result = StateGraph::new()
            .add_node("a", add_node(1, "a"))
            .add_edge(START, "a")
            .add_edge("a", "missing")
            .compile();
        assert!(matches!(result, Err(GraphError::InvalidEdge { .. })));
    }

    #[test]
    fn test_compile_rejects_missing_entry() {
        let result = StateGraph::new().add_node("a", add_node(1, "a")).compile();
        assert!(matches!(result, Err(GraphError::MissingEntryPoint)));
    }

    #[test]
    fn test_compile_rejects_dangling_node() {
        let result = StateGraph::new()
            .add_node("a", add_node(1, "a"))
            .add_node("b", add_node(1, "b"))
            .add_edge(START, "a")
            .add_edge("a", END)
            .compile();
        assert!(matches!(result, Err(GraphError::MissingEdge { .. })));
    }
}
