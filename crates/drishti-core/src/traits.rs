use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::Completion;

/// Agent backend — turns a task string into a text response.
///
/// Instances are long-lived and shared across graph runs. A backend may keep
/// internal conversational memory between `generate` calls; `reset` must
/// clear it so unrelated runs never see each other's context.
pub trait AgentBackend: Send + Sync + 'static {
    /// Stable backend name (also used as the graph node id by convention).
    fn name(&self) -> &str;

    /// Produce a response for the given task.
    fn generate(&self, task: &str) -> BoxFuture<'_, Result<Completion>>;

    /// Clear any internal conversational memory.
    fn reset(&self) -> BoxFuture<'_, Result<()>>;
}

/// Human reply supplier for the interjection boundary.
///
/// Implementations must eventually yield a non-empty string; the console
/// implementation re-prompts on empty input or EOF.
pub trait ReplySource: Send + Sync {
    fn reply(&self, question: &str) -> BoxFuture<'_, Result<String>>;
}

/// Decides whether a routing tag applies to a message's content.
///
/// The default is a literal substring check over free-form generated text.
/// Keeping this behind a trait lets stricter structured-output schemes (e.g.
/// a required leading token) replace it without touching the graph engine.
pub trait MessageClassifier: Send + Sync + 'static {
    fn matches(&self, content: &str, tag: &str) -> bool;
}

/// Literal substring classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubstringClassifier;

impl MessageClassifier for SubstringClassifier {
    fn matches(&self, content: &str, tag: &str) -> bool {
        content.contains(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substring_classifier() {
        let classifier = SubstringClassifier;
        assert!(classifier.matches("done. [PROCEED] to the next stage", "[PROCEED]"));
        assert!(!classifier.matches("still thinking", "[PROCEED]"));
    }
}
