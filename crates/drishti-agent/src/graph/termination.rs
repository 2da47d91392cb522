use std::sync::Arc;

use drishti_core::types::Message;

/// Ends a graph run when satisfied over the accumulated history.
#[derive(Clone)]
pub enum Termination {
    /// Stop once the transcript holds `n` messages.
    MaxMessages(usize),
    /// Stop once the predicate holds over the transcript.
    Predicate(Arc<dyn Fn(&[Message]) -> bool + Send + Sync>),
    /// Stop when any member condition holds (OR combination).
    Any(Vec<Termination>),
}

impl Termination {
    pub fn is_met(&self, history: &[Message]) -> bool {
        match self {
            Self::MaxMessages(n) => history.len() >= *n,
            Self::Predicate(predicate) => predicate(history),
            Self::Any(members) => members.iter().any(|t| t.is_met(history)),
        }
    }

    /// Combine with another condition; the first satisfied one ends the run.
    pub fn or(self, other: Termination) -> Termination {
        match self {
            Self::Any(mut members) => {
                members.push(other);
                Self::Any(members)
            }
            first => Self::Any(vec![first, other]),
        }
    }

    /// Predicate satisfied once any message contains `marker`.
    pub fn text_contains(marker: impl Into<String>) -> Termination {
        let marker = marker.into();
        Self::Predicate(Arc::new(move |history: &[Message]| {
            history.iter().any(|m| m.content.contains(&marker))
        }))
    }
}

impl std::fmt::Debug for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxMessages(n) => write!(f, "MaxMessages({})", n),
            Self::Predicate(_) => write!(f, "Predicate(..)"),
            Self::Any(members) => f.debug_tuple("Any").field(members).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drishti_core::types::TokenUsage;

    fn msg(content: &str) -> Message {
        Message::new("n1", content, TokenUsage::default())
    }

    #[test]
    fn test_max_messages() {
        let t = Termination::MaxMessages(2);
        assert!(!t.is_met(&[msg("one")]));
        assert!(t.is_met(&[msg("one"), msg("two")]));
    }

    #[test]
    fn test_text_contains_or_count() {
        let t = Termination::MaxMessages(40).or(Termination::text_contains("FINALISE"));
        assert!(!t.is_met(&[msg("still working")]));
        assert!(t.is_met(&[msg("coverage complete. FINALISE")]));
    }
}
