pub mod agent;
pub mod client;

pub use agent::ChatAgent;
pub use client::{ChatClient, ChatMessage};
