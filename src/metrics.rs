//! Append-only JSONL metrics: one line per case run. The format is
//! crash-resilient — lines written before a failure stay intact.

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use drishti_core::types::TokenUsage;

use crate::chart::FocusHints;

#[derive(Debug, Serialize)]
pub struct StageMetrics {
    pub name: String,
    pub tokens: TokenUsage,
    pub elapsed_ms: u64,
    pub messages: usize,
    pub agents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunMetrics {
    pub timestamp: DateTime<Utc>,
    pub case: String,
    pub question: String,
    pub focus_hints: FocusHints,
    pub stages: Vec<StageMetrics>,
    pub totals: Totals,
    pub outputs: Outputs,
}

#[derive(Debug, Serialize)]
pub struct Totals {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

impl From<TokenUsage> for Totals {
    fn from(usage: TokenUsage) -> Self {
        Self {
            prompt: usage.prompt,
            completion: usage.completion,
            total: usage.total(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Outputs {
    pub user: String,
    pub detailed: String,
}

/// Append one metrics line, creating parent directories as needed.
pub fn append(path: &Path, metrics: &RunMetrics) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let line = serde_json::to_string(metrics)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writeln!(file, "{}", line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_creates_directories_and_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/run_metrics.jsonl");
        let metrics = RunMetrics {
            timestamp: Utc::now(),
            case: "cases/0001".to_string(),
            question: "career in 2025?".to_string(),
            focus_hints: crate::chart::extract_focus("career in 2025?"),
            stages: vec![StageMetrics {
                name: "lagna".to_string(),
                tokens: TokenUsage::new(10, 5),
                elapsed_ms: 120,
                messages: 4,
                agents: vec!["chart_reader".to_string()],
                error: None,
            }],
            totals: TokenUsage::new(10, 5).into(),
            outputs: Outputs {
                user: "reports/user_report.md".to_string(),
                detailed: "reports/detailed_report.md".to_string(),
            },
        };

        append(&path, &metrics).unwrap();
        append(&path, &metrics).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let parsed: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["totals"]["total"], 15);
        assert_eq!(parsed["focus_hints"]["years"][0], 2025);
    }
}
