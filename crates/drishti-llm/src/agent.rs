use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::debug;

use drishti_core::error::Result;
use drishti_core::traits::AgentBackend;
use drishti_core::types::Completion;

use crate::client::{ChatClient, ChatMessage};

/// A named conversational agent over a shared `ChatClient`.
///
/// Each `generate` call appends to the agent's private history, so within a
/// single graph run the agent sees its own earlier turns. `reset` drops the
/// history; the orchestration layer calls it between runs so nothing bleeds
/// across unrelated subjects.
pub struct ChatAgent {
    name: String,
    system_prompt: String,
    client: Arc<ChatClient>,
    history: Mutex<Vec<ChatMessage>>,
}

impl ChatAgent {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        client: Arc<ChatClient>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            client,
            history: Mutex::new(Vec::new()),
        }
    }

    fn build_messages(&self, history: &[ChatMessage], task: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(&self.system_prompt));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(task));
        messages
    }
}

impl AgentBackend for ChatAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, task: &str) -> BoxFuture<'_, Result<Completion>> {
        let task = task.to_string();
        Box::pin(async move {
            let mut history = self.history.lock().await;
            let messages = self.build_messages(&history, &task);
            let completion = self.client.complete(&messages).await?;
            history.push(ChatMessage::user(&task));
            history.push(ChatMessage::assistant(&completion.text));
            debug!(
                agent = %self.name,
                history_len = history.len(),
                prompt_tokens = completion.usage.prompt,
                completion_tokens = completion.usage.completion,
                "chat turn complete"
            );
            Ok(completion)
        })
    }

    fn reset(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.history.lock().await.clear();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drishti_core::config::ModelConfig;

    fn agent() -> ChatAgent {
        let config = ModelConfig {
            base_url: "http://localhost:11434/v1".to_string(),
            model_id: "test-model".to_string(),
            api_key: None,
            max_tokens: 256,
            temperature: None,
        };
        ChatAgent::new(
            "chart_reader",
            "you read charts",
            Arc::new(ChatClient::new(config)),
        )
    }

    #[test]
    fn test_prompt_assembly_orders_system_history_task() {
        let agent = agent();
        let history = vec![
            ChatMessage::user("first task"),
            ChatMessage::assistant("first answer"),
        ];
        let messages = agent.build_messages(&history, "second task");
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[0].content, "you read charts");
        assert_eq!(messages[3].content, "second task");
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let agent = agent();
        agent
            .history
            .lock()
            .await
            .push(ChatMessage::user("stale turn"));
        agent.reset().await.unwrap();
        assert!(agent.history.lock().await.is_empty());
    }
}
