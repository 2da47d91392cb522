//! Intake gate: turns a reviewer agent's raw output into a routing decision
//! without any further generation.

use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use drishti_core::error::{DrishtiError, Result};
use drishti_core::traits::AgentBackend;
use drishti_core::types::{Message, TokenUsage};

const PROCEED_TOKEN: &str = "PROCEED:";
const FOLLOW_UP_TOKEN: &str = "FOLLOW_UP:";

const DEFAULT_FOLLOW_UP: &str =
    "Could you share a little more detail about what you would like examined?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStatus {
    /// The question is specific enough to analyse.
    Proceed,
    /// The subject needs to be asked for more detail first.
    FollowUp,
}

#[derive(Debug, Clone)]
pub struct IntakeDecision {
    pub status: IntakeStatus,
    /// Refined task (proceed) or the follow-up to put to the user.
    pub message: String,
    pub raw: String,
}

/// Outcome of one reviewer pass.
#[derive(Debug, Clone)]
pub struct IntakeReview {
    pub decision: IntakeDecision,
    pub usage: TokenUsage,
    pub elapsed_ms: u64,
}

/// Parse a reviewer output of the form `PROCEED: <payload>` or
/// `FOLLOW_UP: <payload>`.
///
/// Anything else is `UnexpectedDirective`: a misbehaving agent, not a
/// transient failure, so callers must not retry it. An empty payload falls
/// back to the original question (proceed) or a generic request for detail
/// (follow-up).
pub fn parse_directive(raw: &str, original_question: &str) -> Result<IntakeDecision> {
    let trimmed = raw.trim();
    for (token, status) in [
        (PROCEED_TOKEN, IntakeStatus::Proceed),
        (FOLLOW_UP_TOKEN, IntakeStatus::FollowUp),
    ] {
        let head = trimmed.get(..token.len());
        if head.is_some_and(|h| h.eq_ignore_ascii_case(token)) {
            let payload = trimmed[token.len()..].trim();
            let message = if payload.is_empty() {
                match status {
                    IntakeStatus::Proceed => original_question.trim().to_string(),
                    IntakeStatus::FollowUp => DEFAULT_FOLLOW_UP.to_string(),
                }
            } else {
                payload.to_string()
            };
            return Ok(IntakeDecision {
                status,
                message,
                raw: trimmed.to_string(),
            });
        }
    }
    Err(DrishtiError::UnexpectedDirective(trimmed.to_string()))
}

/// Parse the most recent message not sourced from `user_source`.
pub fn latest_directive(
    messages: &[Message],
    user_source: &str,
    original_question: &str,
) -> Result<IntakeDecision> {
    let latest = messages
        .iter()
        .rev()
        .find(|m| m.source != user_source)
        .ok_or_else(|| {
            DrishtiError::UnexpectedDirective("no reviewer output in transcript".into())
        })?;
    parse_directive(&latest.content, original_question)
}

/// Wraps a reviewer backend: one generation, reset, parse. Performs no
/// further model calls itself.
pub struct IntakeGate {
    reviewer: Arc<dyn AgentBackend>,
}

impl IntakeGate {
    pub fn new(reviewer: Arc<dyn AgentBackend>) -> Self {
        Self { reviewer }
    }

    /// Classify `question`, optionally framed with case context.
    pub async fn review(&self, question: &str, context: &str) -> Result<IntakeReview> {
        let start = Instant::now();
        let payload = if context.is_empty() {
            question.to_string()
        } else {
            format!("{}\n\n{}", question, context)
        };
        let completion = self.reviewer.generate(&payload).await?;
        if let Err(e) = self.reviewer.reset().await {
            warn!(error = %e, "failed to reset intake reviewer");
        }
        let decision = parse_directive(&completion.text, question)?;
        Ok(IntakeReview {
            decision,
            usage: completion.usage,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAgent;

    #[test]
    fn test_proceed_with_payload() {
        let decision = parse_directive("PROCEED: check career for 2025", "career?").unwrap();
        assert_eq!(decision.status, IntakeStatus::Proceed);
        assert_eq!(decision.message, "check career for 2025");
    }

    #[test]
    fn test_follow_up_with_payload() {
        let decision =
            parse_directive("FOLLOW_UP: which year are you asking about?", "career?").unwrap();
        assert_eq!(decision.status, IntakeStatus::FollowUp);
        assert_eq!(decision.message, "which year are you asking about?");
    }

    #[test]
    fn test_unrecognized_output_is_fatal() {
        let err = parse_directive("hello there", "career?").unwrap_err();
        assert!(matches!(err, DrishtiError::UnexpectedDirective(_)));
    }

    #[test]
    fn test_empty_payload_defaults() {
        let decision = parse_directive("PROCEED:", "check marriage timing").unwrap();
        assert_eq!(decision.status, IntakeStatus::Proceed);
        assert_eq!(decision.message, "check marriage timing");

        let decision = parse_directive("FOLLOW_UP:  ", "hello").unwrap();
        assert_eq!(decision.status, IntakeStatus::FollowUp);
        assert_eq!(decision.message, DEFAULT_FOLLOW_UP);
    }

    #[test]
    fn test_token_case_and_whitespace_tolerance() {
        let decision = parse_directive("  proceed: marriage timing  ", "q").unwrap();
        assert_eq!(decision.status, IntakeStatus::Proceed);
        assert_eq!(decision.message, "marriage timing");
    }

    #[test]
    fn test_latest_directive_skips_user_messages() {
        let messages = vec![
            Message::new(
                "reviewer",
                "FOLLOW_UP: when were you born?",
                TokenUsage::default(),
            ),
            Message::new(
                "user",
                "PROCEED: not actually a directive",
                TokenUsage::default(),
            ),
        ];
        let decision = latest_directive(&messages, "user", "q").unwrap();
        assert_eq!(decision.status, IntakeStatus::FollowUp);
    }

    #[tokio::test]
    async fn test_gate_generates_once_and_resets() {
        let reviewer =
            ScriptedAgent::new("reviewer", &["PROCEED: audit 2025 career windows"]).with_usage(8, 4);
        let gate = IntakeGate::new(Arc::new(reviewer.clone()));

        let review = gate.review("career in 2025?", "").await.unwrap();
        assert_eq!(review.decision.status, IntakeStatus::Proceed);
        assert_eq!(review.decision.message, "audit 2025 career windows");
        assert_eq!(review.usage, TokenUsage::new(8, 4));
        assert_eq!(reviewer.inputs().len(), 1);
        assert_eq!(reviewer.resets(), 1);
    }

    #[tokio::test]
    async fn test_gate_includes_context_in_payload() {
        let reviewer = ScriptedAgent::new("reviewer", &["PROCEED: go"]);
        let gate = IntakeGate::new(Arc::new(reviewer.clone()));

        gate.review("career?", "[CASE_METADATA]\n{}").await.unwrap();
        assert!(reviewer.inputs()[0].contains("[CASE_METADATA]"));
    }
}
