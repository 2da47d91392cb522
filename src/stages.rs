//! Stage construction: agent prompts, workflow graphs, and task builders for
//! the three analysis stages plus the intake and synthesis agents.

use std::sync::Arc;

use serde_json::Value;

use drishti_agent::{Edge, GraphExecutor, Node, Termination, WorkflowGraph};
use drishti_core::error::Result;
use drishti_llm::{ChatAgent, ChatClient};

use crate::chart::{DashaPeriod, FocusHints, format_period_list};

pub const ASK_MARKER: &str = "[ASK_HUMAN]";
pub const REPLY_MARKER: &str = "[HUMAN_REPLY]";
pub const PROCEED_MARKER: &str = "[PROCEED]";
pub const FINALISE_MARKER: &str = "FINALISE";

/// Node id of the Lagna profiler whose last message becomes the stored case
/// summary.
pub const PROFILER_NODE: &str = "psy_profiler";
pub const CLARIFIER_NODE: &str = "clarifier";

const LAGNA_MESSAGE_CAP: usize = 25;
const VARGA_MESSAGE_CAP: usize = 40;
const DASHA_MESSAGE_CAP: usize = 6;

const CHART_READER_PROMPT: &str = "You are the Lagna skeptic. Parse the chart summary to extract \
ascendant context, planetary strengths, and dignity claims. Tag each insight with a confidence \
level and note any missing evidence.";

const PLANET_NARRATOR_PROMPT: &str = "Narrate planetary roles strictly as hypotheses. Link chart \
factors to observable life outcomes, flag every assumption, and point out non-astrological \
explanations worth investigating.";

const YOGA_AUDITOR_PROMPT: &str = "Inventory the cited yogas and combinations, explain their \
supposed activation conditions, and underline where classical doctrine lacks empirical support \
or conflicts with the data.";

const DEEP_DIVER_PROMPT: &str = "You are the deep-dive skeptic. Audit the earlier Lagna \
insights, surface contradictions or blind spots, and track what is already evidenced.\n\
Ask exactly one clarifying follow-up before concluding: prefix it with [ASK_HUMAN], keep it in \
plain Indian English, and spell out why the data point matters for testing the hypothesis.\n\
Use short sentences, empathetic yet forthright. After the human reply (tagged [HUMAN_REPLY]) \
restate the new fact, note its reliability, then continue.\n\
When you have enough evidence, hand off with [PROCEED] on its own (never combined with \
[ASK_HUMAN]).";

const PSY_PROFILER_PROMPT: &str = "Synthesize cautious psychological and behavioural hypotheses, \
explicitly labelling speculative sections and contrasting them with real-world behaviours the \
subject could actually observe.";

const D9_PROMPT: &str = "Interpret the Navamsa (D9) for marriage, inner strength, and the \
second half of life. Flag weak evidence, suggest real-world validation, and acknowledge \
non-astrological factors.";

const D10_PROMPT: &str = "Analyse the Dasamsa (D10) for career, status, and public achievements. \
Extract leadership signals, opportunities, and risks. Flag weak evidence, suggest real-world \
validation, and acknowledge non-astrological factors.";

const VARGA_STRATEGIST_PROMPT: &str = "You consolidate the divisional specialists' readings into \
one professional-outlook brief. Reconcile conflicts, rank the claims by evidential support, and \
keep it concise. When coverage is complete, end your message with FINALISE.";

const DASHA_ANALYST_PROMPT: &str = "You receive a condensed Vimshottari timeline. Treat every \
astrological linkage as a hypothesis to test. Identify the relevant Mahadasha and zoom into the \
Antar segments covering the asked time span, always stating confidence levels, evidence gaps, \
and mundane explanations. Summarise impacts on career and relationships with exact date ranges, \
then advise how a skeptic could validate each claim. Never repeat raw data or speculate beyond \
what was supplied.";

pub const REVIEWER_PROMPT: &str = "You are the intake skeptic. Demand specific, testable detail \
before anything reaches analysis.\n\
Apply in order:\n\
1) Pure greetings or vague curiosities: reply FOLLOW_UP: asking for a concrete area, intent, \
and timeframe.\n\
2) A brief with no life area, objective, or dates: reply FOLLOW_UP: asking for the single \
missing piece that would let a skeptic verify the claim.\n\
3) Only when the request states a falsifiable task (life area + intent + timeframe) reply \
PROCEED: with a crisp restatement for the analyst team.\n\
Hard rules: output MUST start with 'PROCEED:' or 'FOLLOW_UP:' and nothing else. For FOLLOW_UP, \
explain why tighter evidence is required. Warm yet forthright Indian English, at most two \
sentences.";

pub const MASTER_WRITER_PROMPT: &str = "You are an astro-skeptical researcher summarising \
chart-derived hypotheses. Treat every pattern as a claim needing evidence. Inputs arrive from \
the Lagna, Varga, and Dasha streams plus the user brief. Never fabricate chart data, never \
imply certainty, cite the source stream for each claim.\n\
Structure the Markdown report as: # Reality Check (two sentences), # Chart Hypotheses (up to \
four sourced bullets), # Contradictions & Gaps, # Timeline Watch (table, up to three rows: \
Window | Claim | How to fact-check), # Action Experiments (numbered, max four). Close with one \
succinct disclaimer that the interpretations are speculative.";

pub const CONCIERGE_PROMPT: &str = "You are the front-door concierge for an astrology analysis \
service. Your only job is to welcome the user and ask one short, friendly follow-up so they \
provide a proper question: life area, intent, and timeframe or dates. Mention that a specific \
question produces a deeper answer. One or two warm sentences of Indian English; never perform \
analysis.";

fn chat_node(client: &Arc<ChatClient>, id: &str, prompt: &str) -> Node {
    Node::agent(id, Arc::new(ChatAgent::new(id, prompt, Arc::clone(client))))
}

/// Lagna stage: reader chain into a deep diver that may loop through the
/// human clarifier before handing off to the profiler.
pub fn lagna_executor(client: &Arc<ChatClient>) -> Result<GraphExecutor> {
    let graph = WorkflowGraph::new(
        vec![
            chat_node(client, "chart_reader", CHART_READER_PROMPT),
            chat_node(client, "planet_narrator", PLANET_NARRATOR_PROMPT),
            chat_node(client, "yoga_auditor", YOGA_AUDITOR_PROMPT),
            chat_node(client, "deep_diver", DEEP_DIVER_PROMPT),
            Node::human(CLARIFIER_NODE),
            chat_node(client, PROFILER_NODE, PSY_PROFILER_PROMPT),
        ],
        vec![
            Edge::direct("chart_reader", "planet_narrator"),
            Edge::direct("planet_narrator", "yoga_auditor"),
            Edge::direct("yoga_auditor", "deep_diver"),
            Edge::tagged("deep_diver", CLARIFIER_NODE, ASK_MARKER, "clarify"),
            Edge::tagged(CLARIFIER_NODE, "deep_diver", REPLY_MARKER, "reply"),
            Edge::tagged("deep_diver", PROFILER_NODE, PROCEED_MARKER, "handoff"),
        ],
        "chart_reader",
    )?;
    Ok(GraphExecutor::new(graph, Termination::MaxMessages(LAGNA_MESSAGE_CAP))
        .with_markers(ASK_MARKER, REPLY_MARKER))
}

/// Varga stage: divisional specialists feeding a strategist that loops until
/// it declares FINALISE (or the message cap trips).
pub fn varga_executor(client: &Arc<ChatClient>) -> Result<GraphExecutor> {
    let graph = WorkflowGraph::new(
        vec![
            chat_node(client, "d9_navamsa", D9_PROMPT),
            chat_node(client, "d10_dasamsa", D10_PROMPT),
            chat_node(client, "varga_strategist", VARGA_STRATEGIST_PROMPT),
        ],
        vec![
            Edge::direct("d9_navamsa", "d10_dasamsa"),
            Edge::direct("d10_dasamsa", "varga_strategist"),
            Edge::direct("varga_strategist", "d9_navamsa"),
        ],
        "d9_navamsa",
    )?;
    let termination = Termination::MaxMessages(VARGA_MESSAGE_CAP)
        .or(Termination::text_contains(FINALISE_MARKER));
    Ok(GraphExecutor::new(graph, termination))
}

/// Dasha stage: a single timeline analyst.
pub fn dasha_executor(client: &Arc<ChatClient>) -> Result<GraphExecutor> {
    let graph = WorkflowGraph::new(
        vec![chat_node(client, "dasha_analyst", DASHA_ANALYST_PROMPT)],
        vec![],
        "dasha_analyst",
    )?;
    Ok(GraphExecutor::new(graph, Termination::MaxMessages(DASHA_MESSAGE_CAP)))
}

pub fn intake_reviewer(client: &Arc<ChatClient>) -> Arc<ChatAgent> {
    Arc::new(ChatAgent::new("reviewer", REVIEWER_PROMPT, Arc::clone(client)))
}

pub fn master_writer(client: &Arc<ChatClient>) -> Arc<ChatAgent> {
    Arc::new(ChatAgent::new("master_writer", MASTER_WRITER_PROMPT, Arc::clone(client)))
}

pub fn build_lagna_task(summary: &str, memory_context: &str) -> String {
    let mut lines = vec![
        "You are the Lagna analysis team. Study the summarised chart data and produce focused \
insights."
            .to_string(),
        "Highlight ascendant context, key house occupancies, and planetary strengths. Avoid \
repeating data verbatim."
            .to_string(),
        format!("\nSummary:\n{}", summary),
    ];
    if !memory_context.is_empty() {
        lines.push(format!("\nPrior-case intelligence:\n{}", memory_context));
    }
    lines.join("\n")
}

pub fn build_varga_task(d10_summary: &str) -> String {
    format!(
        "You are the divisional chart team. Analyse the summarised professional indicators \
below.\nExtract leadership signals, opportunities, and risks. Keep the response concise.\n\
\nSummary:\n{}",
        d10_summary
    )
}

pub fn build_dasha_task(
    question: &str,
    current_utc: &str,
    age_years: Option<f64>,
    focus: &FocusHints,
    periods: &[DashaPeriod],
) -> String {
    let mut lines = vec![
        "You are the Dasha analyst. Use the provided timeline summary to address the user's \
question, giving priority to the most relevant sub-periods. Highlight impacts on career and \
relationships and always mention date ranges."
            .to_string(),
        format!("\nUser question: {}", question),
        format!("Current UTC time: {}", current_utc),
    ];
    if let Some(age) = age_years {
        lines.push(format!("Subject age (years): {}", age));
    }
    if !focus.is_empty() {
        let hints = serde_json::to_string(focus).unwrap_or_default();
        lines.push(format!("Detected focus hints: {}", hints));
    }
    lines.push(format!("Selected periods:\n{}", format_period_list(periods)));
    lines.join("\n")
}

pub fn build_synthesis_task(question: &str, lagna: &str, varga: &str, dasha: &str) -> String {
    format!(
        "User question: {}\n\nBirth Chart Insights:\n{}\n\nDivisional (D10) Insights:\n{}\n\n\
Dasha Timeline Insights:\n{}\n\nDeliver a single consolidated forecast.",
        question, lagna, varga, dasha
    )
}

/// Review-gate context block built from case metadata.
pub fn format_review_context(meta: &Value) -> String {
    if meta.is_null() || meta == &Value::Object(Default::default()) {
        return String::new();
    }
    let serialized =
        serde_json::to_string_pretty(meta).unwrap_or_else(|_| meta.to_string());
    format!("[CASE_METADATA]\n{}\n", serialized)
}
