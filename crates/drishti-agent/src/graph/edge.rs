use serde::{Deserialize, Serialize};

/// How a group of edges from the same source decides to fire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationMode {
    /// The group fires on the first member (in declaration order) whose
    /// condition matches the latest output.
    #[default]
    Any,
    /// The group fires only when every member's condition holds.
    All,
}

/// A transition between two nodes in the workflow graph.
///
/// `condition: None` is unconditional. Otherwise the condition is a literal
/// tag that must appear in the source node's latest output (as judged by the
/// executor's `MessageClassifier`). Edges sharing a `group` are evaluated
/// together as mutually-relevant routing options; ungrouped edges each form
/// a singleton group in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub mode: ActivationMode,
}

impl Edge {
    /// Unconditional edge (sequential chaining, the common case).
    pub fn direct(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
            group: None,
            mode: ActivationMode::Any,
        }
    }

    /// Edge that fires when `tag` appears in the source's latest output.
    pub fn tagged(
        from: impl Into<String>,
        to: impl Into<String>,
        tag: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(tag.into()),
            group: Some(group.into()),
            mode: ActivationMode::Any,
        }
    }

    pub fn with_mode(mut self, mode: ActivationMode) -> Self {
        self.mode = mode;
        self
    }
}
