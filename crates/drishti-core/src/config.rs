use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DrishtiError, Result};

/// Top-level Drishti configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub reports: ReportConfig,
}

/// Chat-completion backend settings (OpenAI-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub model_id: String,
    /// Raw key or a `${ENV_VAR}` reference (expanded at load time).
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
}

/// Whole-run retry policy applied around each stage's graph execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

/// Case memory store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_path")]
    pub path: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: default_memory_path(),
        }
    }
}

/// Report and metrics output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_user_output")]
    pub user_output: PathBuf,
    #[serde(default = "default_detailed_output")]
    pub detailed_output: PathBuf,
    #[serde(default = "default_metrics_log")]
    pub metrics_log: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            user_output: default_user_output(),
            detailed_output: default_detailed_output(),
            metrics_log: default_metrics_log(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_max_jitter_ms() -> u64 {
    750
}

fn default_memory_path() -> PathBuf {
    PathBuf::from("logs/case_memory.json")
}

fn default_user_output() -> PathBuf {
    PathBuf::from("reports/user_report.md")
}

fn default_detailed_output() -> PathBuf {
    PathBuf::from("reports/detailed_report.md")
}

fn default_metrics_log() -> PathBuf {
    PathBuf::from("logs/run_metrics.jsonl")
}

impl AppConfig {
    /// Load config from a TOML file, expanding `${ENV_VAR}` references.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| DrishtiError::ConfigNotFound(path.display().to_string()))?;

        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| DrishtiError::Config(e.to_string()))
    }

    /// Load from file, or fall back to environment-driven defaults when the
    /// file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        Ok(Self {
            model: ModelConfig {
                base_url: std::env::var("DRISHTI_BASE_URL").unwrap_or_else(|_| default_base_url()),
                model_id: std::env::var("DRISHTI_MODEL")
                    .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                api_key: std::env::var("DRISHTI_API_KEY").ok(),
                max_tokens: default_max_tokens(),
                temperature: None,
            },
            retry: RetryConfig::default(),
            memory: MemoryConfig::default(),
            reports: ReportConfig::default(),
        })
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for vc in chars.by_ref() {
                if vc == '}' {
                    break;
                }
                var_name.push(vc);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_defaults() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.base_backoff_ms, 1000);
        assert_eq!(retry.max_jitter_ms, 750);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [model]
            model_id = "gpt-4o-mini"
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.model.model_id, "gpt-4o-mini");
        assert_eq!(config.model.base_url, "https://api.openai.com/v1");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.memory.path, PathBuf::from("logs/case_memory.json"));
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("DRISHTI_TEST_KEY", "sk-123");
        let expanded = expand_env_vars("api_key = \"${DRISHTI_TEST_KEY}\"");
        assert_eq!(expanded, "api_key = \"sk-123\"");

        let kept = expand_env_vars("api_key = \"${DRISHTI_UNSET_VAR}\"");
        assert_eq!(kept, "api_key = \"${DRISHTI_UNSET_VAR}\"");
    }
}
