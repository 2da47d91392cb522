pub mod graph;
pub mod intake;
pub mod retry;
pub mod transcript;

#[cfg(test)]
pub(crate) mod testing;

pub use graph::{
    ActivationMode, Edge, GraphExecutor, GraphRun, Node, Termination, Turn, WorkflowGraph,
    DEFAULT_ASK_MARKER, DEFAULT_REPLY_MARKER,
};
pub use intake::{
    latest_directive, parse_directive, IntakeDecision, IntakeGate, IntakeReview, IntakeStatus,
};
pub use retry::{RetryPolicy, RetryRunner};
pub use transcript::{extract_follow_ups, final_text, last_message_from};
