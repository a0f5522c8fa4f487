//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Breakdown pipeline tuning
    pub breakdown: BreakdownConfig,

    /// Prompt template overrides
    pub prompts: PromptsConfig,

    /// Optional external item sink
    pub sink: SinkConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the API key environment variable is set and the sink
    /// URL is usable. Call this before any model call to fail fast.
    pub fn validate(&self) -> Result<()> {
        debug!("Config::validate: called");
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        if self.sink.enabled && !self.sink.url.starts_with("http://") && !self.sink.url.starts_with("https://") {
            return Err(eyre::eyre!("sink.url must start with http:// or https://, got '{}'", self.sink.url));
        }
        if self.breakdown.subexpand_concurrency == 0 {
            return Err(eyre::eyre!("breakdown.subexpand-concurrency must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for candidate in Self::default_paths() {
            if candidate.exists() {
                match Self::load_from_file(&candidate) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", candidate.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed here; `load` reports them once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let paths = match config_path {
            Some(p) => vec![p.clone()],
            None => Self::default_paths(),
        };
        paths
            .iter()
            .filter(|p| p.exists())
            .find_map(|p| Self::load_from_file(p).ok())
            .and_then(|c| c.log_level)
    }

    /// Project-local config first, then the user config dir
    fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".taskbreak.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("taskbreak").join("taskbreak.yml"));
        }
        paths
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("openai" or "anthropic")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Upper bound on tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 4096,
            timeout_ms: 120_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        debug!(%self.api_key_env, "LlmConfig::get_api_key: called");
        let key = std::env::var(&self.api_key_env)
            .with_context(|| format!("Environment variable {} is not set", self.api_key_env))?;
        if key.trim().is_empty() {
            return Err(eyre::eyre!("Environment variable {} is empty", self.api_key_env));
        }
        Ok(key)
    }
}

/// Breakdown pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakdownConfig {
    /// Episodic recall breadth forced by the pre-recall hook
    #[serde(rename = "recall-k")]
    pub recall_k: usize,

    /// Concurrent sub-expansion calls (1 = strictly sequential)
    #[serde(rename = "subexpand-concurrency")]
    pub subexpand_concurrency: usize,

    /// Token budget for the goal analysis call
    #[serde(rename = "analysis-max-tokens")]
    pub analysis_max_tokens: u32,

    /// Token budget for the label call
    #[serde(rename = "classifier-max-tokens")]
    pub classifier_max_tokens: u32,

    /// Token budget for each sub-expansion call
    #[serde(rename = "subexpand-max-tokens")]
    pub subexpand_max_tokens: u32,

    /// Token budget for the consolidation call
    #[serde(rename = "consolidate-max-tokens")]
    pub consolidate_max_tokens: u32,
}

impl Default for BreakdownConfig {
    fn default() -> Self {
        Self {
            recall_k: 1,
            subexpand_concurrency: 1,
            analysis_max_tokens: 1024,
            classifier_max_tokens: 16,
            subexpand_max_tokens: 1024,
            consolidate_max_tokens: 4096,
        }
    }
}

/// Prompt template configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Directory with `{name}.pmt` overrides, checked before the embedded defaults
    pub dir: Option<PathBuf>,
}

/// External item sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Mirror consolidated tasks to the sink
    pub enabled: bool,

    /// Endpoint accepting POSTed task items
    pub url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://localhost:8000/items".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.breakdown.recall_k, 1);
        assert_eq!(config.breakdown.subexpand_concurrency, 1);
        assert!(!config.sink.enabled);
        assert!(config.prompts.dir.is_none());
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
log-level: debug

llm:
  provider: anthropic
  model: claude-sonnet-4
  api-key-env: MY_API_KEY
  base-url: https://api.example.com
  max-tokens: 8192
  timeout-ms: 60000

breakdown:
  recall-k: 0
  subexpand-concurrency: 4

sink:
  enabled: true
  url: http://localhost:9000/tasks
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.api_key_env, "MY_API_KEY");
        assert_eq!(config.llm.max_tokens, 8192);
        assert_eq!(config.breakdown.recall_k, 0);
        assert_eq!(config.breakdown.subexpand_concurrency, 4);
        assert!(config.sink.enabled);
        assert_eq!(config.sink.url, "http://localhost:9000/tasks");
        assert_eq!(config.sink.timeout_ms, 10_000);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
llm:
  model: gpt-4o
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.breakdown.consolidate_max_tokens, 4096);
    }

    #[test]
    fn test_validate_missing_api_key() {
        let mut config = Config::default();
        config.llm.api_key_env = "TASKBREAK_TEST_UNSET_KEY_VAR".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("TASKBREAK_TEST_UNSET_KEY_VAR"));
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskbreak.yml");
        fs::write(&path, "log-level: warn\nbreakdown:\n  recall-k: 2\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.breakdown.recall_k, 2);
        assert_eq!(Config::load_log_level(Some(&path)).as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_from_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/taskbreak.yml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
