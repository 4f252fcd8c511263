//! Configuration loading, validation, and management for clinq.
//!
//! Loads configuration from `~/.clinq/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.clinq/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model provider (shared by both models unless overridden)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// The streaming answering model
    #[serde(default = "default_answer_model", deserialize_with = "answer_model")]
    pub answer: ModelConfig,

    /// The small non-streaming model that consolidates user memory
    #[serde(
        default = "default_consolidation_model",
        deserialize_with = "consolidation_model"
    )]
    pub consolidation: ModelConfig,

    /// Source adapters and fan-out settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// History / profile / analytics storage
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("answer", &self.answer)
            .field("consolidation", &self.consolidation)
            .field("retrieval", &self.retrieval)
            .field("gateway", &self.gateway)
            .field("storage", &self.storage)
            .finish()
    }
}

/// One model endpoint. Fields missing from a `[answer]` or
/// `[consolidation]` table keep that section's defaults.
#[derive(Debug, Clone, Serialize)]
pub struct ModelConfig {
    /// OpenAI-compatible base URL
    pub api_url: String,

    pub model: String,

    pub max_tokens: u32,
}

/// A model table as written in the file, every field optional.
#[derive(Deserialize)]
struct ModelTable {
    api_url: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
}

impl ModelTable {
    fn over(self, base: ModelConfig) -> ModelConfig {
        ModelConfig {
            api_url: self.api_url.unwrap_or(base.api_url),
            model: self.model.unwrap_or(base.model),
            max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
        }
    }
}

fn answer_model<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ModelConfig, D::Error> {
    Ok(ModelTable::deserialize(deserializer)?.over(default_answer_model()))
}

fn consolidation_model<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<ModelConfig, D::Error> {
    Ok(ModelTable::deserialize(deserializer)?.over(default_consolidation_model()))
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_answer_model() -> ModelConfig {
    ModelConfig {
        api_url: default_api_url(),
        model: "gpt-4o".into(),
        max_tokens: default_max_tokens(),
    }
}
fn default_consolidation_model() -> ModelConfig {
    ModelConfig {
        api_url: default_api_url(),
        model: "gpt-4o-mini".into(),
        max_tokens: 300,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Upper bound on each adapter call; a timed-out adapter contributes nothing.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub local: LocalSourceConfig,

    #[serde(default)]
    pub academic: AcademicSourceConfig,

    #[serde(default)]
    pub web: WebSourceConfig,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            local: LocalSourceConfig::default(),
            academic: AcademicSourceConfig::default(),
            web: WebSourceConfig::default(),
        }
    }
}

/// The external semantic-search service over the pre-embedded corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSourceConfig {
    /// Search endpoint; unset disables the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_local_top_k")]
    pub top_k: usize,
}

fn default_local_top_k() -> usize {
    4
}

impl Default for LocalSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            top_k: default_local_top_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademicSourceConfig {
    #[serde(default = "default_academic_url")]
    pub api_url: String,

    /// Terms OR-ed into the query to bias results toward local guidance.
    #[serde(default = "default_bias_terms")]
    pub bias_terms: Vec<String>,

    #[serde(default = "default_academic_results")]
    pub max_results: usize,

    /// Abstracts longer than this are truncated.
    #[serde(default = "default_abstract_chars")]
    pub abstract_chars: usize,
}

fn default_academic_url() -> String {
    "https://www.ebi.ac.uk/europepmc/webservices/rest".into()
}
fn default_bias_terms() -> Vec<String> {
    vec!["NICE".into(), "NHS".into(), "\"United Kingdom\"".into()]
}
fn default_academic_results() -> usize {
    3
}
fn default_abstract_chars() -> usize {
    1200
}

impl Default for AcademicSourceConfig {
    fn default() -> Self {
        Self {
            api_url: default_academic_url(),
            bias_terms: default_bias_terms(),
            max_results: default_academic_results(),
            abstract_chars: default_abstract_chars(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WebSourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_web_url")]
    pub api_url: String,

    /// Only these domains are searched.
    #[serde(default = "default_trusted_domains")]
    pub trusted_domains: Vec<String>,

    /// At most 3.
    #[serde(default = "default_web_results")]
    pub max_results: usize,
}

fn default_web_url() -> String {
    "https://api.tavily.com".into()
}
fn default_trusted_domains() -> Vec<String> {
    vec![
        "nice.org.uk".into(),
        "cks.nice.org.uk".into(),
        "bnf.nice.org.uk".into(),
        "nhs.uk".into(),
        "sign.ac.uk".into(),
        "gov.uk".into(),
        "rcgp.org.uk".into(),
        "patient.info".into(),
    ]
}
fn default_web_results() -> usize {
    3
}

impl Default for WebSourceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_web_url(),
            trusted_domains: default_trusted_domains(),
            max_results: default_web_results(),
        }
    }
}

impl std::fmt::Debug for WebSourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSourceConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("trusted_domains", &self.trusted_domains)
            .field("max_results", &self.max_results)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite connection string.
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    format!("sqlite://{}", AppConfig::config_dir().join("clinq.db").display())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.clinq/config.toml).
    ///
    /// Environment variables override the file:
    /// - `CLINQ_API_KEY`, then `OPENAI_API_KEY` — model provider key
    /// - `TAVILY_API_KEY` — trusted web search key
    /// - `CLINQ_MODEL` — answering model
    /// - `CLINQ_DATABASE` — storage connection string
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::resolve(&config_path, |key| std::env::var(key).ok())
    }

    /// Load configuration from a specific file path, without environment
    /// overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// File (or defaults), then environment, then validation.
    fn resolve(path: &Path, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(var);
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("CLINQ_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(key) = var("TAVILY_API_KEY") {
            self.retrieval.web.api_key = Some(key);
        }
        if let Some(model) = var("CLINQ_MODEL") {
            self.answer.model = model;
        }
        if let Some(database) = var("CLINQ_DATABASE") {
            self.storage.database = database;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".clinq")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        for (section, model) in [("answer", &self.answer), ("consolidation", &self.consolidation)] {
            if model.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{section}.model must not be empty"
                )));
            }
        }

        if self.retrieval.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.timeout_secs must be > 0".into(),
            ));
        }

        if self.retrieval.web.trusted_domains.is_empty() {
            return Err(ConfigError::ValidationError(
                "retrieval.web.trusted_domains must not be empty".into(),
            ));
        }

        if !(1..=3).contains(&self.retrieval.web.max_results) {
            return Err(ConfigError::ValidationError(
                "retrieval.web.max_results must be between 1 and 3".into(),
            ));
        }

        Ok(())
    }

    /// Check if a model API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            answer: default_answer_model(),
            consolidation: default_consolidation_model(),
            retrieval: RetrievalConfig::default(),
            gateway: GatewayConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.port, 42618);
        assert_eq!(config.retrieval.web.max_results, 3);
        assert!(!config.has_api_key());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.answer.model, config.answer.model);
        assert_eq!(parsed.retrieval.web.trusted_domains, config.retrieval.web.trusted_domains);
    }

    #[test]
    fn web_result_count_above_three_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.web.max_results = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.consolidation.model, "gpt-4o-mini");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[retrieval]
timeout_secs = 4

[retrieval.web]
trusted_domains = ["nice.org.uk"]
max_results = 2
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.retrieval.timeout_secs, 4);
        assert_eq!(config.retrieval.web.trusted_domains, vec!["nice.org.uk"]);
        assert_eq!(config.retrieval.web.max_results, 2);
        assert_eq!(config.answer.model, "gpt-4o");
    }

    #[test]
    fn partial_model_tables_keep_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[answer]
api_url = "http://localhost:8000/v1"

[consolidation]
max_tokens = 200
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.answer.api_url, "http://localhost:8000/v1");
        assert_eq!(config.answer.model, "gpt-4o");
        assert_eq!(config.answer.max_tokens, 2048);
        assert_eq!(config.consolidation.model, "gpt-4o-mini");
        assert_eq!(config.consolidation.max_tokens, 200);
    }

    #[test]
    fn env_overrides_are_validated_without_a_file() {
        let vars: HashMap<&str, &str> = [("CLINQ_MODEL", " ")].into_iter().collect();
        let result = AppConfig::resolve(Path::new("/nonexistent/config.toml"), |k| {
            vars.get(k).map(|v| v.to_string())
        });
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn env_overrides_apply_before_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[answer]\nmodel = \"\"\n").unwrap();

        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));

        let vars: HashMap<&str, &str> = [("CLINQ_MODEL", "gpt-4.1")].into_iter().collect();
        let config = AppConfig::resolve(&path, |k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.answer.model, "gpt-4.1");
    }

    #[test]
    fn invalid_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "retrieval = 7").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_take_priority() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-openai"),
            ("TAVILY_API_KEY", "tvly-key"),
            ("CLINQ_MODEL", "gpt-4.1"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.retrieval.web.api_key.as_deref(), Some("tvly-key"));
        assert_eq!(config.answer.model, "gpt-4.1");
    }

    #[test]
    fn debug_output_redacts_keys() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-secret".into());
        config.retrieval.web.api_key = Some("tvly-secret".into());
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(!dbg.contains("tvly-secret"));
        assert!(dbg.contains("[REDACTED]"));
    }
}
