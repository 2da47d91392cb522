//! Orchestration driver: loads a case bundle, sequences the three analysis
//! stages with retry and failure isolation, wires the case memory, and
//! assembles the final reports.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use drishti_agent::{extract_follow_ups, last_message_from, GraphExecutor, RetryPolicy, RetryRunner};
use drishti_core::config::AppConfig;
use drishti_core::error::Result as DrishtiResult;
use drishti_core::traits::{AgentBackend, ReplySource};
use drishti_core::types::{RunResult, TokenUsage};
use drishti_llm::ChatClient;
use drishti_memory::{
    build_feature_set, format_similarity_context, CaseMemory, CaseUpdate, DEFAULT_MIN_SIMILARITY,
    DEFAULT_SIMILAR_LIMIT,
};

use crate::chart;
use crate::metrics::{self, Outputs, RunMetrics, StageMetrics};
use crate::stages;

/// The chart payloads and identity of one case directory.
pub struct CaseBundle {
    pub lagna: Value,
    pub dasha: Value,
    pub d10: Value,
    pub meta: Value,
    pub context: Value,
    pub subject_id: String,
    pub session_id: String,
    pub origin: String,
}

fn load_json(path: &Path) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn load_json_optional(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Default::default());
    }
    match load_json(path) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "optional case file unreadable, ignoring");
            Value::Object(Default::default())
        }
    }
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_string())
}

/// Load the chart payloads for a case directory.
///
/// `lagna.json`, `dasha.json` and `dseries/d10.json` are required;
/// `meta.json` and `context.json` are optional. Subject and session identity
/// come from the context file when present, otherwise from the directory
/// layout (with a generated session id as the last resort).
pub fn load_case(case_dir: &Path, session_override: Option<&str>) -> anyhow::Result<CaseBundle> {
    anyhow::ensure!(case_dir.exists(), "case folder not found: {}", case_dir.display());

    let lagna = load_json(&case_dir.join("lagna.json"))?;
    let dasha = load_json(&case_dir.join("dasha.json"))?;
    let d10 = load_json(&case_dir.join("dseries").join("d10.json"))?;
    let meta = load_json_optional(&case_dir.join("meta.json"));
    let context = load_json_optional(&case_dir.join("context.json"));

    let subject_id = context
        .get("user_id")
        .or_else(|| context.get("tenant_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| case_dir.parent().and_then(Path::parent).and_then(dir_name))
        .or_else(|| case_dir.parent().and_then(dir_name))
        .unwrap_or_else(|| "unknown-subject".to_string());

    let session_id = session_override
        .map(str::to_string)
        .or_else(|| {
            context
                .get("session_id")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .or_else(|| dir_name(case_dir))
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Ok(CaseBundle {
        lagna,
        dasha,
        d10,
        meta,
        context,
        subject_id,
        session_id,
        origin: case_dir.display().to_string(),
    })
}

/// Per-stage outcome row; a failed stage carries its error text instead of a
/// summary so the remaining stages and the report can still proceed.
pub struct StageRow {
    pub name: &'static str,
    pub summary: String,
    pub usage: TokenUsage,
    pub elapsed_ms: u64,
    pub messages: usize,
    pub agents: Vec<String>,
    pub error: Option<String>,
}

impl StageRow {
    fn failed(name: &'static str, error: String) -> Self {
        Self {
            name,
            summary: String::new(),
            usage: TokenUsage::default(),
            elapsed_ms: 0,
            messages: 0,
            agents: Vec::new(),
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Section body for the detailed report.
    fn report_section(&self) -> &str {
        match &self.error {
            Some(_) => "(stage failed; no insights available)",
            None => &self.summary,
        }
    }
}

fn join_summary(result: &RunResult) -> String {
    result
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

async fn run_stage(
    runner: &RetryRunner,
    name: &'static str,
    executor: DrishtiResult<GraphExecutor>,
    task: &str,
    replies: &dyn ReplySource,
) -> (StageRow, Option<RunResult>) {
    let executor = match executor {
        Ok(executor) => executor,
        Err(e) => {
            warn!(stage = %name, error = %e, "stage graph construction failed");
            return (StageRow::failed(name, e.to_string()), None);
        }
    };
    match runner.run(name, &executor, task, replies).await {
        Ok(result) => {
            info!(
                stage = %name,
                messages = result.messages.len(),
                prompt_tokens = result.usage.prompt,
                completion_tokens = result.usage.completion,
                elapsed_ms = result.elapsed_ms,
                "stage complete"
            );
            let row = StageRow {
                name,
                summary: join_summary(&result),
                usage: result.usage,
                elapsed_ms: result.elapsed_ms,
                messages: result.messages.len(),
                agents: result.agents_invoked.clone(),
                error: None,
            };
            (row, Some(result))
        }
        Err(e) => {
            warn!(stage = %name, error = %e, "stage failed after retries");
            (StageRow::failed(name, e.to_string()), None)
        }
    }
}

/// Note how the current chart signature differs from a prior case's.
pub fn describe_feature_delta(current: &[String], reference: Option<&[String]>) -> String {
    let Some(reference) = reference else {
        return String::new();
    };
    let current_set: std::collections::BTreeSet<&str> = current
        .iter()
        .map(String::as_str)
        .filter(|f| !f.is_empty())
        .collect();
    let reference_set: std::collections::BTreeSet<&str> = reference
        .iter()
        .map(String::as_str)
        .filter(|f| !f.is_empty())
        .collect();
    if current_set.is_empty() && reference_set.is_empty() {
        return String::new();
    }

    let new_only: Vec<&str> = current_set.difference(&reference_set).copied().take(6).collect();
    let missing: Vec<&str> = reference_set.difference(&current_set).copied().take(6).collect();
    let mut notes = Vec::new();
    if !new_only.is_empty() {
        notes.push(format!("New traits: {}", new_only.join(", ")));
    }
    if !missing.is_empty() {
        notes.push(format!("Absent vs prior case: {}", missing.join(", ")));
    }
    notes.join(" | ")
}

pub struct CaseRunOutcome {
    pub final_summary: String,
    pub stages: Vec<StageRow>,
    pub writer_usage: TokenUsage,
    pub writer_elapsed_ms: u64,
    pub total_usage: TokenUsage,
    pub user_output: PathBuf,
    pub detailed_output: PathBuf,
}

/// Run the full analysis for one case: Lagna, Varga and Dasha stages under
/// retry with failure isolation, case-memory capture after the Lagna run,
/// then the master-writer synthesis and report files.
pub async fn run_case(
    config: &AppConfig,
    client: &Arc<ChatClient>,
    bundle: &CaseBundle,
    question: &str,
    replies: &dyn ReplySource,
    user_output: &Path,
    detailed_output: &Path,
) -> anyhow::Result<CaseRunOutcome> {
    let mut memory = CaseMemory::open(&config.memory.path);
    let features = build_feature_set(&bundle.lagna);
    let matches = memory.find_similar(&features, DEFAULT_SIMILAR_LIMIT, DEFAULT_MIN_SIMILARITY);
    let memory_context = if matches.is_empty() {
        String::new()
    } else {
        format_similarity_context(&matches)
    };
    let top_match_features: Option<Vec<String>> =
        matches.first().map(|(_, record)| record.chart_features.clone());
    drop(matches);

    let now = Utc::now();
    let subject = chart::subject_context(&bundle.meta, now);
    let mut focus = chart::extract_focus(question);
    focus.apply_birth_year(subject.birth_year);

    let summary_config = chart::pick_lagna_summary_config(&[
        &bundle.context,
        &bundle.meta,
        bundle.meta.get("primary").unwrap_or(&Value::Null),
    ]);
    let lagna_summary = chart::resolve_lagna_summary(&bundle.lagna, summary_config);
    let lagna_task = stages::build_lagna_task(&lagna_summary, &memory_context);
    let varga_task = stages::build_varga_task(&chart::summarize_d10(&bundle.d10));

    let periods = chart::select_dasha_periods(&bundle.dasha, &focus, now.naive_utc());
    let dasha_task = stages::build_dasha_task(
        question,
        &now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        subject.age_years,
        &focus,
        &periods,
    );

    let runner = RetryRunner::new(RetryPolicy::from(&config.retry));

    let (lagna_row, lagna_result) = run_stage(
        &runner,
        "lagna",
        stages::lagna_executor(client),
        &lagna_task,
        replies,
    )
    .await;

    if let Some(result) = &lagna_result {
        let follow_ups = extract_follow_ups(&result.messages, stages::ASK_MARKER, stages::REPLY_MARKER);
        let profile_summary = last_message_from(&result.messages, stages::PROFILER_NODE)
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();
        let difference_notes = describe_feature_delta(&features, top_match_features.as_deref());
        memory.upsert_case(CaseUpdate {
            subject_id: bundle.subject_id.clone(),
            session_id: bundle.session_id.clone(),
            origin_case: bundle.origin.clone(),
            features: features.clone(),
            question: question.to_string(),
            summary: profile_summary,
            follow_ups,
            difference_notes,
        });
        // The analysis still ships even when the memory file cannot be
        // persisted.
        if let Err(e) = memory.save() {
            warn!(error = %e, "failed to persist case memory");
        }
    }

    let (varga_row, _) = run_stage(
        &runner,
        "varga",
        stages::varga_executor(client),
        &varga_task,
        replies,
    )
    .await;
    let (dasha_row, _) = run_stage(
        &runner,
        "dasha",
        stages::dasha_executor(client),
        &dasha_task,
        replies,
    )
    .await;

    let stage_rows = vec![lagna_row, varga_row, dasha_row];
    anyhow::ensure!(
        stage_rows.iter().any(StageRow::succeeded),
        "all analysis stages failed"
    );

    let synthesis_task = stages::build_synthesis_task(
        question,
        stage_rows[0].report_section(),
        stage_rows[1].report_section(),
        stage_rows[2].report_section(),
    );
    let writer = stages::master_writer(client);
    let writer_start = Instant::now();
    let completion = writer
        .generate(&synthesis_task)
        .await
        .context("final synthesis failed")?;
    let writer_elapsed_ms = writer_start.elapsed().as_millis() as u64;
    if let Err(e) = writer.reset().await {
        warn!(error = %e, "failed to reset master writer");
    }
    let final_summary = completion.text;

    let detailed_report = format!(
        "# Final Forecast\n{}\n\n# Birth Chart Insights\n{}\n\n# D10 Insights\n{}\n\n# Dasha Insights\n{}",
        final_summary,
        stage_rows[0].report_section(),
        stage_rows[1].report_section(),
        stage_rows[2].report_section(),
    );
    let user_report = format!("# Final Forecast\n{}", final_summary);
    write_report(detailed_output, &detailed_report)?;
    write_report(user_output, &user_report)?;
    info!(path = %detailed_output.display(), "detailed report written");
    info!(path = %user_output.display(), "user report written");

    let mut total_usage = completion.usage;
    for row in &stage_rows {
        total_usage.add(row.usage);
    }

    let run_metrics = RunMetrics {
        timestamp: now,
        case: bundle.origin.clone(),
        question: question.to_string(),
        focus_hints: focus,
        stages: stage_rows
            .iter()
            .map(|row| StageMetrics {
                name: row.name.to_string(),
                tokens: row.usage,
                elapsed_ms: row.elapsed_ms,
                messages: row.messages,
                agents: row.agents.clone(),
                error: row.error.clone(),
            })
            .chain(std::iter::once(StageMetrics {
                name: "master_writer".to_string(),
                tokens: completion.usage,
                elapsed_ms: writer_elapsed_ms,
                messages: 1,
                agents: vec!["master_writer".to_string()],
                error: None,
            }))
            .collect(),
        totals: total_usage.into(),
        outputs: Outputs {
            user: user_output.display().to_string(),
            detailed: detailed_output.display().to_string(),
        },
    };
    if let Err(e) = metrics::append(&config.reports.metrics_log, &run_metrics) {
        warn!(error = %e, "failed to append run metrics");
    }

    Ok(CaseRunOutcome {
        final_summary,
        stages: stage_rows,
        writer_usage: completion.usage,
        writer_elapsed_ms,
        total_usage,
        user_output: user_output.to_path_buf(),
        detailed_output: detailed_output.to_path_buf(),
    })
}

fn write_report(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))
}
