//! Helpers for reading information back out of a run transcript.

use drishti_core::types::{FollowUp, Message};

/// Pair up ask/reply markers in transcript order.
///
/// Each question is matched with the first reply that follows it; questions
/// the run never answered are dropped.
pub fn extract_follow_ups(
    messages: &[Message],
    ask_marker: &str,
    reply_marker: &str,
) -> Vec<FollowUp> {
    let mut pairs = Vec::new();
    let mut open_question: Option<String> = None;
    for message in messages {
        if let Some((_, after)) = message.content.split_once(ask_marker) {
            open_question = Some(after.trim().to_string());
        } else if let Some((_, after)) = message.content.split_once(reply_marker) {
            if let Some(question) = open_question.take() {
                pairs.push(FollowUp::new(question, after.trim()));
            }
        }
    }
    pairs
}

/// Latest message produced by `source`, if any.
pub fn last_message_from<'a>(messages: &'a [Message], source: &str) -> Option<&'a Message> {
    messages.iter().rev().find(|m| m.source == source)
}

/// Content of the transcript's final message, empty when there is none.
pub fn final_text(messages: &[Message]) -> &str {
    messages.last().map(|m| m.content.as_str()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use drishti_core::types::TokenUsage;

    fn msg(source: &str, content: &str) -> Message {
        Message::new(source, content, TokenUsage::default())
    }

    #[test]
    fn test_extract_follow_ups_pairs_in_order() {
        let messages = vec![
            msg("diver", "[ASK_HUMAN] where were you in 2019?"),
            msg("clarifier", "[HUMAN_REPLY] Pune"),
            msg("diver", "[ASK_HUMAN] any career switch?"),
            msg("clarifier", "[HUMAN_REPLY] yes, in 2021"),
            msg("diver", "noted. [PROCEED]"),
        ];
        let pairs = extract_follow_ups(&messages, "[ASK_HUMAN]", "[HUMAN_REPLY]");
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].question, "where were you in 2019?");
        assert_eq!(pairs[0].answer, "Pune");
        assert_eq!(pairs[1].answer, "yes, in 2021");
    }

    #[test]
    fn test_unanswered_question_is_dropped() {
        let messages = vec![msg("diver", "[ASK_HUMAN] anything else?")];
        assert!(extract_follow_ups(&messages, "[ASK_HUMAN]", "[HUMAN_REPLY]").is_empty());
    }

    #[test]
    fn test_last_message_from() {
        let messages = vec![
            msg("a", "first"),
            msg("b", "second"),
            msg("a", "third"),
        ];
        assert_eq!(last_message_from(&messages, "a").map(|m| m.content.as_str()), Some("third"));
        assert!(last_message_from(&messages, "c").is_none());
        assert_eq!(final_text(&messages), "third");
    }
}
