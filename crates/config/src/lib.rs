//! Configuration loading, validation, and management for ZeroToHire.
//!
//! Loads configuration from `~/.zerotohire/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.zerotohire/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model endpoint and sampling settings
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Prompt token budget
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Prompt assembly settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Problem retrieval settings
    #[serde(default)]
    pub retriever: RetrieverConfig,

    /// Session persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Problem corpus location
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Turn concurrency
    #[serde(default)]
    pub session: SessionConfig,
}

// ── Inference ─────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Backend flavour: "llama_cpp", "ollama", "openai", or "custom"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Endpoint override; each provider has a sensible default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Max tokens for conversational replies
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Max tokens for code evaluation replies
    #[serde(default = "default_evaluation_max_tokens")]
    pub evaluation_max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "llama_cpp".into()
}
fn default_model() -> String {
    "qwen2.5-coder-7b-instruct".into()
}
fn default_max_tokens() -> u32 {
    400
}
fn default_evaluation_max_tokens() -> u32 {
    300
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.9
}
fn default_timeout_secs() -> u64 {
    120
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            evaluation_max_tokens: default_evaluation_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("evaluation_max_tokens", &self.evaluation_max_tokens)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Budget ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Total context window of the model, in tokens
    #[serde(default = "default_model_context_tokens")]
    pub model_context_tokens: usize,

    /// Tokens held back for the reply. Defaults to the larger of the two
    /// generation limits in `[inference]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved_output_tokens: Option<usize>,

    /// Slack for estimation error
    #[serde(default = "default_safety_margin")]
    pub safety_margin: usize,
}

fn default_model_context_tokens() -> usize {
    4096
}
fn default_safety_margin() -> usize {
    128
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            model_context_tokens: default_model_context_tokens(),
            reserved_output_tokens: None,
            safety_margin: default_safety_margin(),
        }
    }
}

// ── Context ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// The tutor persona's name, used in prompts and turn labels
    #[serde(default = "default_tutor_name")]
    pub tutor_name: String,

    /// History window sizes tried in order until the prompt fits
    #[serde(default = "default_history_windows")]
    pub history_windows: Vec<usize>,

    /// How many messages to load from the store into a session snapshot
    #[serde(default = "default_history_fetch_limit")]
    pub history_fetch_limit: usize,

    /// Longest accepted student message, in characters
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Longest accepted code submission, in characters
    #[serde(default = "default_max_code_chars")]
    pub max_code_chars: usize,
}

fn default_tutor_name() -> String {
    "Alex".into()
}
fn default_history_windows() -> Vec<usize> {
    vec![5, 3, 1, 0]
}
fn default_history_fetch_limit() -> usize {
    50
}
fn default_max_message_chars() -> usize {
    4000
}
fn default_max_code_chars() -> usize {
    8000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            tutor_name: default_tutor_name(),
            history_windows: default_history_windows(),
            history_fetch_limit: default_history_fetch_limit(),
            max_message_chars: default_max_message_chars(),
            max_code_chars: default_max_code_chars(),
        }
    }
}

// ── Retriever ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrieverConfig {
    /// Random and fallback picks come from this many leading problems
    #[serde(default = "default_random_pool_limit")]
    pub random_pool_limit: usize,

    /// Keyword matching scans this many leading problems
    #[serde(default = "default_keyword_scan_limit")]
    pub keyword_scan_limit: usize,
}

fn default_random_pool_limit() -> usize {
    100
}
fn default_keyword_scan_limit() -> usize {
    300
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            random_pool_limit: default_random_pool_limit(),
            keyword_scan_limit: default_keyword_scan_limit(),
        }
    }
}

// ── Store / corpus ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database file; defaults to `~/.zerotohire/zerotohire.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// JSON problem set; defaults to `~/.zerotohire/problems.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// ── Session ───────────────────────────────────────────────────────────────

/// What a turn does when another turn already holds the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockPolicy {
    /// Queue behind the running turn.
    #[default]
    Wait,
    /// Fail immediately with a busy error.
    Reject,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub lock_policy: LockPolicy,
}

impl AppConfig {
    /// Load configuration from the default path (~/.zerotohire/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `ZEROTOHIRE_API_KEY`, falling back to `OPENAI_API_KEY`
    /// - `ZEROTOHIRE_PROVIDER`, `ZEROTOHIRE_BASE_URL`, `ZEROTOHIRE_MODEL`
    /// - `ZEROTOHIRE_DB`, `ZEROTOHIRE_CORPUS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.inference.api_key.is_none() {
            self.inference.api_key = std::env::var("ZEROTOHIRE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }
        if let Ok(provider) = std::env::var("ZEROTOHIRE_PROVIDER") {
            self.inference.provider = provider;
        }
        if let Ok(url) = std::env::var("ZEROTOHIRE_BASE_URL") {
            self.inference.base_url = Some(url);
        }
        if let Ok(model) = std::env::var("ZEROTOHIRE_MODEL") {
            self.inference.model = model;
        }
        if let Ok(db) = std::env::var("ZEROTOHIRE_DB") {
            self.store.path = Some(PathBuf::from(db));
        }
        if let Ok(corpus) = std::env::var("ZEROTOHIRE_CORPUS") {
            self.corpus.path = Some(PathBuf::from(corpus));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".zerotohire")
    }

    /// Resolved SQLite database path.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("zerotohire.db"))
    }

    /// Resolved corpus path.
    pub fn corpus_path(&self) -> PathBuf {
        self.corpus
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("problems.json"))
    }

    /// Tokens reserved for the model's reply.
    pub fn reserved_output_tokens(&self) -> usize {
        self.budget.reserved_output_tokens.unwrap_or_else(|| {
            self.inference
                .max_tokens
                .max(self.inference.evaluation_max_tokens) as usize
        })
    }

    /// Tokens available for the assembled prompt.
    pub fn prompt_budget_tokens(&self) -> usize {
        self.budget
            .model_context_tokens
            .saturating_sub(self.reserved_output_tokens())
            .saturating_sub(self.budget.safety_margin)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let inference = &self.inference;
        if !(0.0..=2.0).contains(&inference.temperature) {
            return Err(ConfigError::ValidationError(
                "inference.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(inference.top_p > 0.0 && inference.top_p <= 1.0) {
            return Err(ConfigError::ValidationError(
                "inference.top_p must be in (0.0, 1.0]".into(),
            ));
        }

        if inference.max_tokens == 0 || inference.evaluation_max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "inference token limits must be > 0".into(),
            ));
        }

        if self.prompt_budget_tokens() == 0 {
            return Err(ConfigError::ValidationError(format!(
                "budget.model_context_tokens ({}) leaves no room for the prompt after reserving {} output tokens and a {} token margin",
                self.budget.model_context_tokens,
                self.reserved_output_tokens(),
                self.budget.safety_margin,
            )));
        }

        if self.context.history_windows.is_empty() {
            return Err(ConfigError::ValidationError(
                "context.history_windows must not be empty".into(),
            ));
        }

        let name = self.context.tutor_name.trim();
        if name.is_empty() || name.contains(':') || name.contains('\n') {
            return Err(ConfigError::ValidationError(
                "context.tutor_name must be a non-empty single-line name without ':'".into(),
            ));
        }

        if self.retriever.random_pool_limit == 0 || self.retriever.keyword_scan_limit == 0 {
            return Err(ConfigError::ValidationError(
                "retriever limits must be > 0".into(),
            ));
        }

        if !matches!(self.store.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "store.backend must be \"sqlite\" or \"memory\", got \"{}\"",
                self.store.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.inference.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
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
