use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prompt/completion token counters for one or more generations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
}

impl TokenUsage {
    pub fn new(prompt: u64, completion: u64) -> Self {
        Self { prompt, completion }
    }

    /// Accumulate another usage delta into this counter.
    pub fn add(&mut self, other: TokenUsage) {
        self.prompt += other.prompt;
        self.completion += other.completion;
    }

    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }
}

/// One generation from an agent backend.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

/// One transcript entry produced during a graph run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Node id that produced this content.
    pub source: String,
    pub content: String,
    /// Usage consumed by this generation (zero for human replies).
    #[serde(default)]
    pub usage: TokenUsage,
}

impl Message {
    pub fn new(source: impl Into<String>, content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
            usage,
        }
    }
}

/// Result of one successful graph run. Immutable once produced.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Messages in strict generation order.
    pub messages: Vec<Message>,
    pub usage: TokenUsage,
    pub elapsed_ms: u64,
    /// Node ids in first-invocation order, deduplicated.
    pub agents_invoked: Vec<String>,
}

/// A question/answer pair exchanged over the human-interjection boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUp {
    pub question: String,
    pub answer: String,
    pub captured_at: DateTime<Utc>,
}

impl FollowUp {
    /// Build a pair stamped with the current time.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            captured_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accumulation() {
        let mut usage = TokenUsage::default();
        usage.add(TokenUsage::new(10, 5));
        usage.add(TokenUsage::new(3, 2));
        assert_eq!(usage.prompt, 13);
        assert_eq!(usage.completion, 7);
        assert_eq!(usage.total(), 20);
    }

    #[test]
    fn test_message_serialization_roundtrip() {
        let msg = Message::new("deep_diver", "[ASK_HUMAN] when did you move?", TokenUsage::new(5, 9));
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.source, "deep_diver");
        assert_eq!(parsed.usage, TokenUsage::new(5, 9));
    }
}
