//! Mock backends shared by the crate's unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use drishti_core::error::{DrishtiError, Result};
use drishti_core::traits::{AgentBackend, ReplySource};
use drishti_core::types::{Completion, TokenUsage};

struct ScriptedState {
    script: VecDeque<String>,
    inputs: Vec<String>,
}

/// Agent that replays a fixed script, one line per `generate` call.
///
/// Clones share state, so a test can hand a clone to the graph and keep one
/// for assertions.
#[derive(Clone)]
pub(crate) struct ScriptedAgent {
    name: String,
    usage: TokenUsage,
    state: Arc<Mutex<ScriptedState>>,
    resets: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

impl ScriptedAgent {
    pub fn new(name: &str, script: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            usage: TokenUsage::default(),
            state: Arc::new(Mutex::new(ScriptedState {
                script: script.iter().map(|s| s.to_string()).collect(),
                inputs: Vec::new(),
            })),
            resets: Arc::new(AtomicUsize::new(0)),
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_usage(mut self, prompt: u64, completion: u64) -> Self {
        self.usage = TokenUsage::new(prompt, completion);
        self
    }

    /// Make the next `n` generate calls fail before the script resumes.
    pub fn failing(self, n: usize) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn inputs(&self) -> Vec<String> {
        self.state.lock().unwrap().inputs.clone()
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

impl AgentBackend for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, task: &str) -> BoxFuture<'_, Result<Completion>> {
        let task = task.to_string();
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.inputs.push(task);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(DrishtiError::Generation {
                    agent: self.name.clone(),
                    message: "scripted failure".into(),
                });
            }
            let text = state.script.pop_front().ok_or_else(|| DrishtiError::Generation {
                agent: self.name.clone(),
                message: "script exhausted".into(),
            })?;
            Ok(Completion {
                text,
                usage: self.usage,
            })
        })
    }

    fn reset(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// Reply source serving canned answers, recording the questions asked.
pub(crate) struct CannedReplies {
    replies: Mutex<VecDeque<String>>,
    asked: Mutex<Vec<String>>,
}

impl CannedReplies {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|s| s.to_string()).collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// For runs that must not reach the human channel at all.
    pub fn none() -> Self {
        Self::new(&[])
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl ReplySource for CannedReplies {
    fn reply(&self, question: &str) -> BoxFuture<'_, Result<String>> {
        let question = question.to_string();
        Box::pin(async move {
            self.asked.lock().unwrap().push(question);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| DrishtiError::Config("no canned reply left".into()))
        })
    }
}
