//! Conditional-edge workflow graph: nodes, edges, termination, executor.

mod edge;
mod executor;
mod node;
mod termination;

pub use edge::{ActivationMode, Edge};
pub use executor::{
    GraphExecutor, GraphRun, Turn, WorkflowGraph, DEFAULT_ASK_MARKER, DEFAULT_REPLY_MARKER,
};
pub use node::Node;
pub use termination::Termination;
