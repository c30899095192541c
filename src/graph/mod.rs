//! Agent Graph Engine
//!
//! A directed graph of named node functions and (conditional) edges executed
//! against an accumulating state object. One state type flows through each
//! graph; nodes return partial updates that the state merges with per-field
//! reducers. Execution is single-threaded and cooperative: the interpreter
//! awaits each node to completion before evaluating outgoing edges.
//!
//! Per-thread checkpointing makes conversations resumable: with a thread id
//! supplied, the engine persists the merged state after every successful node
//! and the next invocation with the same id picks up from there.

pub mod checkpoint;
pub mod engine;
pub mod state;

pub use checkpoint::{Checkpointer, MemorySaver};
pub use engine::{CompiledGraph, GraphError, NodeFn, RouteFn, RunConfig, StateGraph, END, START};
pub use state::ChannelState;
