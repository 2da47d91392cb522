use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use drishti_core::error::{DrishtiError, Result};
use drishti_core::types::FollowUp;

pub const DEFAULT_SIMILAR_LIMIT: usize = 3;
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.25;

/// One remembered case: the chart signature of a previously analyzed subject
/// plus the facts gathered while analyzing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub subject_id: String,
    pub session_id: String,
    pub origin_case: String,
    #[serde(default)]
    pub chart_features: Vec<String>,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub follow_ups: Vec<FollowUp>,
    #[serde(default)]
    pub difference_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied to `upsert_case`.
#[derive(Debug, Clone, Default)]
pub struct CaseUpdate {
    pub subject_id: String,
    pub session_id: String,
    pub origin_case: String,
    pub features: Vec<String>,
    pub question: String,
    pub summary: String,
    pub follow_ups: Vec<FollowUp>,
    pub difference_notes: String,
}

/// On-disk document shape. This is the only bit-exact contract the store
/// owns and must round-trip exactly through load/save.
#[derive(Serialize, Deserialize)]
struct StoreDocument {
    cases: Vec<CaseRecord>,
}

/// JSON-file-backed memory of prior cases, queryable by Jaccard similarity
/// over chart feature signatures.
///
/// Loading is fail-open: a missing or corrupt file starts an empty store.
/// `save` is an explicit full rewrite with no cross-process locking; callers
/// embedding this in a concurrent server must serialize mutations behind a
/// single mutex.
pub struct CaseMemory {
    path: PathBuf,
    records: Vec<CaseRecord>,
}

impl CaseMemory {
    /// Open the store at `path`, loading whatever records the file holds.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = Self::load(&path);
        debug!(path = %path.display(), records = records.len(), "case memory opened");
        Self { path, records }
    }

    fn load(path: &Path) -> Vec<CaseRecord> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };
        // Accept both the owned document shape and a bare record array
        // written by earlier versions.
        if let Ok(doc) = serde_json::from_str::<StoreDocument>(&content) {
            return doc.cases;
        }
        match serde_json::from_str::<Vec<CaseRecord>>(&content) {
            Ok(records) => records,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "case memory file unreadable, starting empty");
                Vec::new()
            }
        }
    }

    pub fn records(&self) -> &[CaseRecord] {
        &self.records
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrite the backing file with all records.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DrishtiError::Persistence(format!("create store directory: {}", e)))?;
        }
        let doc = StoreDocument {
            cases: self.records.clone(),
        };
        let payload = serde_json::to_string_pretty(&doc)
            .map_err(|e| DrishtiError::Persistence(e.to_string()))?;
        std::fs::write(&self.path, payload)
            .map_err(|e| DrishtiError::Persistence(format!("write store file: {}", e)))?;
        Ok(())
    }

    /// Create or merge the record keyed by `(subject_id, session_id)`.
    ///
    /// Follow-up entries with both question and answer blank are dropped. An
    /// empty `difference_notes` preserves the value already on record.
    pub fn upsert_case(&mut self, update: CaseUpdate) -> &CaseRecord {
        let now = Utc::now();
        let follow_ups: Vec<FollowUp> = update
            .follow_ups
            .into_iter()
            .filter(|f| !(f.question.trim().is_empty() && f.answer.trim().is_empty()))
            .map(|f| FollowUp {
                question: f.question.trim().to_string(),
                answer: f.answer.trim().to_string(),
                captured_at: f.captured_at,
            })
            .collect();

        let position = self.records.iter().position(|record| {
            record.subject_id == update.subject_id && record.session_id == update.session_id
        });

        match position {
            Some(index) => {
                let record = &mut self.records[index];
                record.origin_case = update.origin_case;
                record.chart_features = update.features;
                record.question = update.question;
                record.summary = update.summary;
                record.follow_ups = follow_ups;
                if !update.difference_notes.is_empty() {
                    record.difference_notes = update.difference_notes;
                }
                record.updated_at = now;
                &self.records[index]
            }
            None => {
                self.records.push(CaseRecord {
                    subject_id: update.subject_id,
                    session_id: update.session_id,
                    origin_case: update.origin_case,
                    chart_features: update.features,
                    question: update.question,
                    summary: update.summary,
                    follow_ups,
                    difference_notes: update.difference_notes,
                    created_at: now,
                    updated_at: now,
                });
                self.records.last().expect("record just pushed")
            }
        }
    }

    /// Rank stored records by Jaccard similarity against `features`.
    ///
    /// Records scoring below `min_similarity` or with empty feature sets are
    /// skipped. Ties keep store order (stable sort). An empty input yields an
    /// empty list.
    pub fn find_similar(
        &self,
        features: &[String],
        limit: usize,
        min_similarity: f64,
    ) -> Vec<(f64, &CaseRecord)> {
        let query: HashSet<&str> = features
            .iter()
            .map(String::as_str)
            .filter(|f| !f.is_empty())
            .collect();
        if query.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(f64, &CaseRecord)> = Vec::new();
        for record in &self.records {
            let stored: HashSet<&str> = record
                .chart_features
                .iter()
                .map(String::as_str)
                .filter(|f| !f.is_empty())
                .collect();
            if stored.is_empty() {
                continue;
            }
            let overlap = query.intersection(&stored).count();
            let union = query.union(&stored).count();
            let score = overlap as f64 / union as f64;
            if score >= min_similarity {
                scored.push((score, record));
            }
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

/// Render similarity matches as a prompt fragment for the Lagna stage.
pub fn format_similarity_context(matches: &[(f64, &CaseRecord)]) -> String {
    if matches.is_empty() {
        return "[CASE_MEMORY] No prior similar cases captured yet.".to_string();
    }
    let mut lines = vec!["[CASE_MEMORY] Historical cases with similar Lagna signatures:".to_string()];
    for (index, (score, record)) in matches.iter().enumerate() {
        lines.push(format!(
            "{}. subject={} session={} similarity={:.2}",
            index + 1,
            record.subject_id,
            record.session_id,
            score
        ));
        if !record.summary.is_empty() {
            lines.push(format!("   Profile: {}", record.summary));
        }
        for follow in record.follow_ups.iter().take(3) {
            if !follow.question.is_empty() || !follow.answer.is_empty() {
                lines.push(format!(
                    "   Follow-up: Q: {} | A: {}",
                    follow.question, follow.answer
                ));
            }
        }
        if !record.difference_notes.is_empty() {
            lines.push(format!("   Difference noted: {}", record.difference_notes));
        }
    }
    lines.push(
        "Use these patterns to validate the current native: check if the same behaviours appear or clarify divergences."
            .to_string(),
    );
    lines.join("\n")
}
