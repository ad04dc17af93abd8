//! Configuration loading, validation, and management for switchyard.
//!
//! Loads configuration from `~/.switchyard/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use switchyard_core::PersonaSettings;

/// The root configuration structure.
///
/// Maps directly to `~/.switchyard/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub handlers: HandlersConfig,

    /// Persona records seeded into the persona store at startup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub personas: Vec<PersonaSettings>,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub allow_public_bind: bool,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Chunks buffered per stream before the router waits on the client
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
}

fn default_port() -> u16 {
    42720
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}
fn default_stream_buffer() -> usize {
    64
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            allow_public_bind: false,
            max_body_bytes: default_max_body_bytes(),
            stream_buffer: default_stream_buffer(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" | "in-memory" => Ok(Self::Memory),
            other => Err(ConfigError::ValidationError(format!(
                "unknown store backend: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite database file
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    AppConfig::config_dir()
        .join("conversations.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Conversational handler used for ties, low confidence and failures
    #[serde(default = "default_handler")]
    pub default_handler: String,

    /// Messages of history sent with each envelope
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Classifier results below this confidence fall back
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    #[serde(default = "default_classifier_timeout_ms")]
    pub classifier_timeout_ms: u64,

    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,

    /// Resume suspended handlers as soon as an operation is resolved
    #[serde(default = "default_true")]
    pub resume_on_resolution: bool,

    /// Cached results attached to an envelope
    #[serde(default = "default_intelligence_limit")]
    pub intelligence_limit: usize,

    /// Routing decisions kept per conversation
    #[serde(default = "default_routing_log_limit")]
    pub routing_log_limit: usize,
}

fn default_handler() -> String {
    "chat".into()
}
fn default_history_limit() -> usize {
    20
}
fn default_min_confidence() -> f64 {
    0.5
}
fn default_classifier_timeout_ms() -> u64 {
    5_000
}
fn default_handler_timeout_ms() -> u64 {
    60_000
}
fn default_intelligence_limit() -> usize {
    8
}
fn default_routing_log_limit() -> usize {
    50
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_handler: default_handler(),
            history_limit: default_history_limit(),
            min_confidence: default_min_confidence(),
            classifier_timeout_ms: default_classifier_timeout_ms(),
            handler_timeout_ms: default_handler_timeout_ms(),
            resume_on_resolution: true,
            intelligence_limit: default_intelligence_limit(),
            routing_log_limit: default_routing_log_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    #[default]
    Keyword,
    Llm,
    /// LLM first, keyword rules when it fails
    Chain,
}

impl std::str::FromStr for ClassifierBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "llm" => Ok(Self::Llm),
            "chain" => Ok(Self::Chain),
            other => Err(ConfigError::ValidationError(format!(
                "unknown classifier backend: {other}"
            ))),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub backend: ClassifierBackend,

    /// OpenAI-compatible base URL (e.g. https://api.openai.com/v1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_classifier_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    /// Handler name → trigger keywords or phrases
    #[serde(default = "default_rules")]
    pub rules: BTreeMap<String, Vec<String>>,
}

fn default_classifier_model() -> String {
    "gpt-4o-mini".into()
}

fn default_rules() -> BTreeMap<String, Vec<String>> {
    let rule = |words: &[&str]| words.iter().map(|w| w.to_string()).collect::<Vec<_>>();
    BTreeMap::from([
        (
            "weather_agent".to_string(),
            rule(&[
                "weather", "forecast", "temperature", "rain", "snow", "sunny", "humidity",
                "wind",
            ]),
        ),
        (
            "web_search_agent".to_string(),
            rule(&["search", "web", "look up", "lookup", "google", "latest", "news", "online"]),
        ),
        (
            "wargaming_agent".to_string(),
            rule(&["wargame", "wargaming", "war game", "simulate", "simulation", "campaign"]),
        ),
        (
            "document_writer".to_string(),
            rule(&["write", "draft", "document", "essay", "save to file"]),
        ),
    ])
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: ClassifierBackend::default(),
            api_url: None,
            api_key: None,
            model: default_classifier_model(),
            temperature: 0.0,
            rules: default_rules(),
        }
    }
}

impl std::fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("backend", &self.backend)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("rules", &self.rules)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlersConfig {
    /// Directory `document_writer` saves into
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,

    /// Built-in handlers to register; empty registers all
    #[serde(default)]
    pub enabled: Vec<String>,
}

fn default_workspace_dir() -> String {
    AppConfig::workspace_dir().to_string_lossy().into_owned()
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
            enabled: Vec::new(),
        }
    }
}

impl HandlersConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.is_empty() || self.enabled.iter().any(|n| n == name)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.switchyard/config.toml)
    /// and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides and re-validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
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

    /// Apply `SWITCHYARD_*` overrides from `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("SWITCHYARD_HOST") {
            self.gateway.host = host;
        }
        if let Some(port) = lookup("SWITCHYARD_PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("SWITCHYARD_PORT is not a port: {port}"))
            })?;
        }
        if let Some(backend) = lookup("SWITCHYARD_STORE_BACKEND") {
            self.store.backend = backend.parse()?;
        }
        if let Some(path) = lookup("SWITCHYARD_STORE_PATH") {
            self.store.path = path;
        }
        if let Some(handler) = lookup("SWITCHYARD_DEFAULT_HANDLER") {
            self.router.default_handler = handler;
        }
        if let Some(backend) = lookup("SWITCHYARD_CLASSIFIER_BACKEND") {
            self.classifier.backend = backend.parse()?;
        }
        if let Some(url) = lookup("SWITCHYARD_CLASSIFIER_URL") {
            self.classifier.api_url = Some(url);
        }
        if let Some(model) = lookup("SWITCHYARD_CLASSIFIER_MODEL") {
            self.classifier.model = model;
        }
        if self.classifier.api_key.is_none() {
            self.classifier.api_key =
                lookup("SWITCHYARD_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".switchyard")
    }

    /// Get the workspace directory path.
    pub fn workspace_dir() -> PathBuf {
        Self::config_dir().join("workspace")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.router.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "router.history_limit must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.router.min_confidence) {
            return Err(ConfigError::ValidationError(
                "router.min_confidence must be between 0.0 and 1.0".into(),
            ));
        }

        if self.router.classifier_timeout_ms == 0 || self.router.handler_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "router timeouts must be > 0".into(),
            ));
        }

        if self.router.default_handler.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "router.default_handler must not be empty".into(),
            ));
        }

        if self.classifier.backend != ClassifierBackend::Keyword
            && self.classifier.api_url.is_none()
        {
            return Err(ConfigError::ValidationError(
                "classifier.api_url is required for the llm and chain backends".into(),
            ));
        }

        if self.gateway.host == "0.0.0.0" && !self.gateway.allow_public_bind {
            return Err(ConfigError::ValidationError(
                "gateway bound to 0.0.0.0 without allow_public_bind = true".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
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
