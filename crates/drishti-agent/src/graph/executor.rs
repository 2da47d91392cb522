use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use drishti_core::error::{DrishtiError, Result};
use drishti_core::traits::{MessageClassifier, ReplySource, SubstringClassifier};
use drishti_core::types::{Message, RunResult, TokenUsage};

use super::edge::{ActivationMode, Edge};
use super::node::Node;
use super::termination::Termination;

pub const DEFAULT_ASK_MARKER: &str = "[ASK_HUMAN]";
pub const DEFAULT_REPLY_MARKER: &str = "[HUMAN_REPLY]";

/// Declarative node/edge/entry description of a workflow.
///
/// Invariants, checked at construction: node ids are unique, every edge
/// endpoint names a node, and every non-entry node is reachable from the
/// entry.
pub struct WorkflowGraph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    entry: String,
}

impl WorkflowGraph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>, entry: impl Into<String>) -> Result<Self> {
        let entry = entry.into();
        let mut index = HashMap::new();
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.id().to_string(), position).is_some() {
                return Err(DrishtiError::Config(format!(
                    "duplicate node id '{}' in graph",
                    node.id()
                )));
            }
        }
        if !index.contains_key(&entry) {
            return Err(DrishtiError::Config(format!(
                "entry node '{}' not found in graph",
                entry
            )));
        }
        for edge in &edges {
            for endpoint in [&edge.from, &edge.to] {
                if !index.contains_key(endpoint) {
                    return Err(DrishtiError::Config(format!(
                        "edge endpoint '{}' not found in graph",
                        endpoint
                    )));
                }
            }
        }

        // Every non-entry node must be reachable from the entry.
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(entry.as_str());
        queue.push_back(entry.as_str());
        while let Some(current) = queue.pop_front() {
            for edge in edges.iter().filter(|e| e.from == current) {
                if visited.insert(edge.to.as_str()) {
                    queue.push_back(edge.to.as_str());
                }
            }
        }
        for node in &nodes {
            if !visited.contains(node.id()) {
                return Err(DrishtiError::Config(format!(
                    "node '{}' is not reachable from entry '{}'",
                    node.id(),
                    entry
                )));
            }
        }

        Ok(Self {
            nodes,
            index,
            edges,
            entry,
        })
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Reset every agent node's internal memory.
    ///
    /// All nodes are attempted even when some fail; the first failure is
    /// reported after the sweep.
    pub async fn reset(&self) -> Result<()> {
        let mut first_error = None;
        for node in &self.nodes {
            if let Node::Agent { id, backend } = node {
                if let Err(e) = backend.reset().await {
                    warn!(node = %id, error = %e, "failed to reset agent node");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for WorkflowGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowGraph")
            .field("nodes", &self.nodes)
            .field("edges", &self.edges.len())
            .field("entry", &self.entry)
            .finish()
    }
}

/// Outcome of driving a run as far as it can go without external input.
#[derive(Debug)]
pub enum Turn {
    /// The run hit the human-interjection boundary and needs a reply.
    Suspended { question: String },
    /// The run finished; failed runs surface as errors instead.
    Completed(RunResult),
}

/// Walks a `WorkflowGraph` from its entry node, one generation per step.
///
/// Exactly one node is active at any time. Termination is evaluated over the
/// transcript after every appended message (generated or injected) and takes
/// precedence over edge routing, so count bounds also account for injected
/// human replies.
pub struct GraphExecutor {
    graph: Arc<WorkflowGraph>,
    termination: Termination,
    classifier: Arc<dyn MessageClassifier>,
    ask_marker: String,
    reply_marker: String,
}

impl GraphExecutor {
    pub fn new(graph: WorkflowGraph, termination: Termination) -> Self {
        Self {
            graph: Arc::new(graph),
            termination,
            classifier: Arc::new(SubstringClassifier),
            ask_marker: DEFAULT_ASK_MARKER.to_string(),
            reply_marker: DEFAULT_REPLY_MARKER.to_string(),
        }
    }

    /// Swap in a different tag-matching scheme.
    pub fn with_classifier(mut self, classifier: Arc<dyn MessageClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_markers(mut self, ask: impl Into<String>, reply: impl Into<String>) -> Self {
        self.ask_marker = ask.into();
        self.reply_marker = reply.into();
        self
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Start a run. The returned `GraphRun` is the resumption handle for the
    /// human-interjection boundary.
    pub fn begin(&self, task: impl Into<String>) -> GraphRun {
        let task = task.into();
        GraphRun {
            graph: Arc::clone(&self.graph),
            termination: self.termination.clone(),
            classifier: Arc::clone(&self.classifier),
            ask_marker: self.ask_marker.clone(),
            reply_marker: self.reply_marker.clone(),
            next_input: task.clone(),
            task,
            messages: Vec::new(),
            usage: TokenUsage::default(),
            agents_invoked: Vec::new(),
            active: self.graph.entry().to_string(),
            pending: None,
            started: Instant::now(),
            finished: false,
        }
    }

    /// Run to completion, answering interjections through `replies`.
    pub async fn run(&self, task: &str, replies: &dyn ReplySource) -> Result<RunResult> {
        let mut run = self.begin(task);
        loop {
            match run.advance().await? {
                Turn::Completed(result) => return Ok(result),
                Turn::Suspended { question } => {
                    let reply = replies.reply(&question).await?;
                    run.resume(&reply)?;
                }
            }
        }
    }
}

/// One in-flight graph run. Created per run, discarded at run end; no state
/// leaks across runs except explicit agent memory (cleared by `reset`).
pub struct GraphRun {
    graph: Arc<WorkflowGraph>,
    termination: Termination,
    classifier: Arc<dyn MessageClassifier>,
    ask_marker: String,
    reply_marker: String,
    task: String,
    messages: Vec<Message>,
    usage: TokenUsage,
    agents_invoked: Vec<String>,
    active: String,
    next_input: String,
    pending: Option<String>,
    started: Instant,
    finished: bool,
}

impl GraphRun {
    /// True while the run is waiting on a human reply.
    pub fn is_suspended(&self) -> bool {
        self.pending.is_some()
    }

    /// The question awaiting an answer, if suspended.
    pub fn pending_question(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Transcript so far, in strict generation order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Drive the run until it suspends on the human channel or completes.
    pub async fn advance(&mut self) -> Result<Turn> {
        if self.finished {
            return Err(DrishtiError::Config("graph run already completed".into()));
        }
        if self.pending.is_some() {
            return Err(DrishtiError::Config(
                "graph run is suspended; call resume() with the reply first".into(),
            ));
        }

        loop {
            if self.termination.is_met(&self.messages) {
                debug!(messages = self.messages.len(), "termination condition met");
                return Ok(Turn::Completed(self.complete()));
            }

            let backend = match self.graph.node(&self.active) {
                Some(Node::Agent { backend, .. }) => Arc::clone(backend),
                Some(Node::Human { id }) => {
                    return Err(DrishtiError::GraphProtocol {
                        node: id.clone(),
                        message: "human channel has no generation capability".into(),
                    })
                }
                None => {
                    return Err(DrishtiError::GraphProtocol {
                        node: self.active.clone(),
                        message: "active node missing from graph".into(),
                    })
                }
            };

            info!(node = %self.active, "executing graph node");
            let completion = backend.generate(&self.next_input).await?;
            self.usage.add(completion.usage);
            if !self.agents_invoked.contains(&self.active) {
                self.agents_invoked.push(self.active.clone());
            }
            self.messages.push(Message::new(
                self.active.clone(),
                completion.text,
                completion.usage,
            ));

            // Termination outranks routing: a final message that satisfies
            // the condition completes the run even when it matches no edge
            // or would otherwise suspend on the human channel.
            if self.termination.is_met(&self.messages) {
                debug!(messages = self.messages.len(), "termination condition met");
                return Ok(Turn::Completed(self.complete()));
            }

            let Some(edge) = self.select_edge(&self.active.clone())? else {
                debug!(node = %self.active, "no outgoing edges, run complete");
                return Ok(Turn::Completed(self.complete()));
            };

            let target_is_human = self
                .graph
                .node(&edge.to)
                .map(Node::is_human)
                .unwrap_or(false);
            if target_is_human {
                let latest = self
                    .messages
                    .last()
                    .map(|m| m.content.as_str())
                    .unwrap_or("");
                let question = match latest.split_once(self.ask_marker.as_str()) {
                    Some((_, after)) => after.trim().to_string(),
                    None => latest.trim().to_string(),
                };
                self.active = edge.to.clone();
                self.pending = Some(question.clone());
                debug!(node = %self.active, "run suspended awaiting human reply");
                return Ok(Turn::Suspended { question });
            }

            self.active = edge.to.clone();
            // Nodes receive the task as originally framed, not the transcript.
            self.next_input = self.task.clone();
        }
    }

    /// Supply the human reply and route from the human channel.
    ///
    /// The reply is appended as `{source: human-id, content: reply-marker +
    /// reply}` with zero usage; the node that asked receives it as its next
    /// generation input.
    pub fn resume(&mut self, reply: &str) -> Result<()> {
        if self.finished {
            return Err(DrishtiError::Config("graph run already completed".into()));
        }
        if self.pending.take().is_none() {
            return Err(DrishtiError::Config(
                "graph run is not suspended; nothing to resume".into(),
            ));
        }

        let content = format!("{} {}", self.reply_marker, reply.trim());
        self.messages.push(Message::new(
            self.active.clone(),
            content.clone(),
            TokenUsage::default(),
        ));
        info!(node = %self.active, "human reply injected");

        let Some(edge) = self.select_edge(&self.active.clone())? else {
            return Err(DrishtiError::GraphProtocol {
                node: self.active.clone(),
                message: "human channel has no outgoing edge for the reply".into(),
            });
        };
        self.active = edge.to.clone();
        self.next_input = content;
        Ok(())
    }

    /// Pick the firing edge out of `source`'s outgoing edges, or `None` when
    /// the node has no outgoing edges (natural completion).
    fn select_edge(&self, source: &str) -> Result<Option<Edge>> {
        let outgoing: Vec<&Edge> = self
            .graph
            .edges()
            .iter()
            .filter(|e| e.from == source)
            .collect();
        if outgoing.is_empty() {
            return Ok(None);
        }

        let latest = self
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or("");

        // Partition by activation group, preserving declaration order.
        // Ungrouped edges each form their own singleton group.
        let mut groups: Vec<(Option<&str>, Vec<&Edge>)> = Vec::new();
        for edge in &outgoing {
            match edge.group.as_deref() {
                Some(group) => {
                    if let Some(entry) = groups
                        .iter_mut()
                        .find(|(key, _)| *key == Some(group))
                    {
                        entry.1.push(edge);
                    } else {
                        groups.push((Some(group), vec![edge]));
                    }
                }
                None => groups.push((None, vec![edge])),
            }
        }

        for (_, members) in &groups {
            match members[0].mode {
                ActivationMode::Any => {
                    // First match in declaration order wins; see DESIGN.md on
                    // the tie-break for simultaneously matching tags.
                    for edge in members {
                        match &edge.condition {
                            None => return Ok(Some((*edge).clone())),
                            Some(tag) if self.classifier.matches(latest, tag) => {
                                return Ok(Some((*edge).clone()))
                            }
                            Some(_) => {}
                        }
                    }
                }
                ActivationMode::All => {
                    let all_hold = members.iter().all(|edge| {
                        edge.condition
                            .as_ref()
                            .map_or(true, |tag| self.classifier.matches(latest, tag))
                    });
                    if all_hold {
                        return Ok(Some(members[0].clone()));
                    }
                }
            }
        }

        let expected: Vec<&str> = outgoing
            .iter()
            .filter_map(|e| e.condition.as_deref())
            .collect();
        Err(DrishtiError::GraphProtocol {
            node: source.to_string(),
            message: format!(
                "output matched no outgoing edge; expected one of: {}",
                expected.join(", ")
            ),
        })
    }

    fn complete(&mut self) -> RunResult {
        self.finished = true;
        RunResult {
            messages: std::mem::take(&mut self.messages),
            usage: self.usage,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            agents_invoked: std::mem::take(&mut self.agents_invoked),
        }
    }
}
