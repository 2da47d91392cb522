use thiserror::Error;

#[derive(Debug, Error)]
pub enum DrishtiError {
    // Backend errors (transient from the retry runner's perspective)
    #[error("generation failed for agent {agent}: {message}")]
    Generation { agent: String, message: String },

    // Graph engine errors
    #[error("graph protocol violation at node {node}: {message}")]
    GraphProtocol { node: String, message: String },

    #[error("run failed after {attempts} attempts")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        source: Box<DrishtiError>,
    },

    // Intake gate errors
    #[error("unexpected intake directive: {0}")]
    UnexpectedDirective(String),

    // Store errors
    #[error("persistence error: {0}")]
    Persistence(String),

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DrishtiError>;
