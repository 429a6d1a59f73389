//! Configuration loading, validation, and API-key discovery for ironloop.
//!
//! Loads configuration from `~/.ironloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Access level names accepted in config and on the command line.
pub const ACCESS_LEVELS: [&str; 3] = ["sandbox", "project", "system"];

/// The root configuration structure.
///
/// Maps directly to `~/.ironloop/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model endpoint and request shaping
    #[serde(default)]
    pub provider: ProviderSettings,

    /// ReAct loop limits
    #[serde(default)]
    pub agent: AgentSettings,

    /// Filesystem and shell scope
    #[serde(default)]
    pub security: SecuritySettings,

    /// Key rotation, stream retry and circuit breaking
    #[serde(default)]
    pub resilience: ResilienceSettings,

    /// Transcript persistence
    #[serde(default)]
    pub memory: MemorySettings,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Provider name used in logs and circuit state
    #[serde(default = "default_provider_name")]
    pub name: String,

    /// OpenAI-compatible base URL (`/chat/completions` is appended)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-attempt connection deadline
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Prefix for `{PREFIX}_API_KEY_n` environment variables
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,

    /// Keys from the file, used only when the environment has none
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_keys: Vec<String>,
}

fn default_provider_name() -> String {
    "openrouter".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_env_prefix() -> String {
    "OPENROUTER".into()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout_secs(),
            env_prefix: default_env_prefix(),
            api_keys: Vec::new(),
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("env_prefix", &self.env_prefix)
            .field("api_keys", &format_args!("[REDACTED; {}]", self.api_keys.len()))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Bound of the event channels between parser, controller and caller
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_max_iterations() -> u32 {
    8
}
fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_channel_capacity() -> usize {
    64
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tool_timeout_secs: default_tool_timeout_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    /// One of `sandbox`, `project`, `system`
    #[serde(default = "default_access_level")]
    pub access_level: String,

    /// Root for sandbox-level file access
    #[serde(default = "default_sandbox_root")]
    pub sandbox_root: PathBuf,

    /// Added to the built-in deny-list
    #[serde(default)]
    pub extra_forbidden_paths: Vec<String>,

    /// Programs the shell tool may run; empty allows any
    #[serde(default)]
    pub allowed_commands: Vec<String>,
}

fn default_access_level() -> String {
    "sandbox".into()
}
fn default_sandbox_root() -> PathBuf {
    AppConfig::config_dir().join("sandbox")
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            access_level: default_access_level(),
            sandbox_root: default_sandbox_root(),
            extra_forbidden_paths: vec![],
            allowed_commands: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceSettings {
    /// Failures inside the window that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Reissues allowed per stream, on top of the key pool bound
    #[serde(default = "default_max_stream_retries")]
    pub max_stream_retries: u32,
}

fn default_failure_threshold() -> usize {
    5
}
fn default_window_secs() -> u64 {
    60
}
fn default_max_stream_retries() -> u32 {
    3
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window_secs: default_window_secs(),
            max_stream_retries: default_max_stream_retries(),
        }
    }
}

/// Where transcripts go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptBackend {
    Memory,
    File,
    /// Persistence disabled
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySettings {
    #[serde(default = "default_transcript_backend")]
    pub transcript: TranscriptBackend,

    #[serde(default = "default_transcript_path")]
    pub transcript_path: PathBuf,
}

fn default_transcript_backend() -> TranscriptBackend {
    TranscriptBackend::File
}
fn default_transcript_path() -> PathBuf {
    AppConfig::config_dir().join("transcripts.jsonl")
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            transcript: default_transcript_backend(),
            transcript_path: default_transcript_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ironloop/config.toml).
    ///
    /// Environment overrides applied afterwards:
    /// - `IRONLOOP_MODEL`
    /// - `IRONLOOP_BASE_URL`
    /// - `IRONLOOP_ACCESS_LEVEL`
    /// - `IRONLOOP_MAX_ITERATIONS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|name| std::env::var(name).ok())?;
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

    /// Apply `IRONLOOP_*` overrides from `lookup`, then re-validate.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("IRONLOOP_MODEL") {
            self.provider.model = model;
        }
        if let Some(url) = lookup("IRONLOOP_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Some(level) = lookup("IRONLOOP_ACCESS_LEVEL") {
            self.security.access_level = level.trim().to_lowercase();
        }
        if let Some(raw) = lookup("IRONLOOP_MAX_ITERATIONS") {
            self.agent.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "IRONLOOP_MAX_ITERATIONS must be a positive integer, got '{raw}'"
                ))
            })?;
        }
        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ironloop")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.provider.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider.request_timeout_secs must be > 0".into(),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }
        if self.agent.tool_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent.tool_timeout_secs must be > 0".into(),
            ));
        }
        if self.agent.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "agent.channel_capacity must be > 0".into(),
            ));
        }
        if !ACCESS_LEVELS.contains(&self.security.access_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "security.access_level must be one of {}, got '{}'",
                ACCESS_LEVELS.join(", "),
                self.security.access_level
            )));
        }
        if self.resilience.failure_threshold == 0 || self.resilience.window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "resilience.failure_threshold and resilience.window_secs must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// API keys for the configured provider: environment first, then the file.
    pub fn api_keys<F>(&self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let keys = discover_api_keys(&self.provider.env_prefix, lookup);
        if !keys.is_empty() {
            return keys;
        }
        self.provider
            .api_keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Scan `{PREFIX}_API_KEY_1`, `{PREFIX}_API_KEY_2`, ... stopping at the first gap.
///
/// Falls back to `{PREFIX}_API_KEY` when no numbered variable exists. Empty
/// and whitespace-only values are discarded; a blank numbered variable still
/// counts as present for the gap rule.
pub fn discover_api_keys<F>(prefix: &str, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = prefix.trim_end_matches('_').to_uppercase();
    let mut keys = Vec::new();
    let mut found_numbered = false;

    for n in 1.. {
        let Some(value) = lookup(&format!("{prefix}_API_KEY_{n}")) else {
            break;
        };
        found_numbered = true;
        let value = value.trim();
        if !value.is_empty() {
            keys.push(value.to_string());
        }
    }

    if !found_numbered
        && let Some(value) = lookup(&format!("{prefix}_API_KEY"))
    {
        let value = value.trim();
        if !value.is_empty() {
            keys.push(value.to_string());
        }
    }

    keys
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
