use std::sync::Arc;

use drishti_core::traits::AgentBackend;

/// A node in the workflow graph: either a generating agent or the human
/// channel (a pause point with no generation capability of its own).
#[derive(Clone)]
pub enum Node {
    Agent {
        id: String,
        backend: Arc<dyn AgentBackend>,
    },
    Human {
        id: String,
    },
}

impl Node {
    pub fn agent(id: impl Into<String>, backend: Arc<dyn AgentBackend>) -> Self {
        Self::Agent {
            id: id.into(),
            backend,
        }
    }

    /// Agent node whose id is the backend's own name.
    pub fn from_backend(backend: Arc<dyn AgentBackend>) -> Self {
        Self::Agent {
            id: backend.name().to_string(),
            backend,
        }
    }

    pub fn human(id: impl Into<String>) -> Self {
        Self::Human { id: id.into() }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Agent { id, .. } => id,
            Self::Human { id } => id,
        }
    }

    pub fn is_human(&self) -> bool {
        matches!(self, Self::Human { .. })
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Agent { id, .. } => f.debug_struct("Agent").field("id", id).finish(),
            Self::Human { id } => f.debug_struct("Human").field("id", id).finish(),
        }
    }
}
