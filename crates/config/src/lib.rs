//! Configuration loading, validation, and management for Parlor.
//!
//! Two layers:
//! - [`AppConfig`]: engine tunables loaded from `~/.parlor/config.toml` with
//!   environment variable overrides, validated at startup.
//! - [`ApiSettings`]: the user-editable endpoint/key/model record persisted in
//!   the key-value store and carried in backups.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Platform directive sent as the first system message of every request.
pub const DEFAULT_DIRECTIVE: &str = "\
Fully inhabit the character described below and talk with the user in that character's voice and way of thinking.
This is an online chat.
Reply with a few sentences at a time and leave a blank line between every two sentences. Answer freely.
Stay in the moment; there is no need for a <think> phase.
Do not output timestamps.";

/// The root configuration structure.
///
/// Maps directly to `~/.parlor/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default endpoint settings, used until the user saves their own
    #[serde(default)]
    pub api: ApiSettings,

    /// Context assembly
    #[serde(default)]
    pub context: ContextConfig,

    /// Knowledge scanning
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Windowing and reveal pacing
    #[serde(default)]
    pub display: DisplayConfig,

    /// Persistent store
    #[serde(default)]
    pub storage: StorageConfig,
}

/// The persisted endpoint record.
///
/// Field names follow the stored settings object; keys this crate does not
/// know (theme, wallpaper, avatars) are kept in `extra` so a load/save cycle
/// never drops them.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ApiSettings {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Remote backup endpoint (custom server mode)
    #[serde(default)]
    pub backup_url: String,

    /// Remote backup secret
    #[serde(default, alias = "GIST_TOKEN")]
    pub backup_token: String,

    /// Saved endpoint presets
    #[serde(default)]
    pub api_presets: Vec<ApiPreset>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ApiSettings {
    /// Stored field names that hold credentials. Backups obfuscate these.
    pub const CREDENTIAL_FIELDS: [&'static str; 3] = ["API_KEY", "BACKUP_TOKEN", "GIST_TOKEN"];

    /// Check that a request can be attempted: endpoint, key and model are set.
    pub fn validate_for_send(&self) -> Result<(), ConfigError> {
        let missing: Vec<&str> = [
            ("endpoint", &self.api_url),
            ("API key", &self.api_key),
            ("model", &self.model),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Incomplete(missing.join(", ")))
        }
    }

    /// Save the current endpoint as a preset, replacing one with the same name.
    pub fn save_preset(&mut self, name: impl Into<String>) {
        let preset = ApiPreset {
            name: name.into(),
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
        };
        match self.api_presets.iter_mut().find(|p| p.name == preset.name) {
            Some(existing) => *existing = preset,
            None => self.api_presets.push(preset),
        }
    }

    /// Make the preset at `index` the active endpoint. Returns false if absent.
    pub fn apply_preset(&mut self, index: usize) -> bool {
        let Some(preset) = self.api_presets.get(index).cloned() else {
            return false;
        };
        self.api_url = preset.api_url;
        self.api_key = preset.api_key;
        self.model = preset.model;
        true
    }

    pub fn delete_preset(&mut self, index: usize) -> Option<ApiPreset> {
        (index < self.api_presets.len()).then(|| self.api_presets.remove(index))
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            backup_url: String::new(),
            backup_token: String::new(),
            api_presets: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

/// A named endpoint the user can switch to.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiPreset {
    pub name: String,
    #[serde(default, alias = "API_URL")]
    pub api_url: String,
    #[serde(default, alias = "API_KEY")]
    pub api_key: String,
    #[serde(default, alias = "MODEL")]
    pub model: String,
}

fn default_api_url() -> String {
    "https://api.siliconflow.cn/v1/chat/completions".into()
}
fn default_model() -> String {
    "zai-org/GLM-4.6".into()
}
fn default_temperature() -> f64 {
    1.1
}
fn default_max_tokens() -> u32 {
    60000
}

/// Redact a secret string for Debug output.
fn redact(s: &str) -> &'static str {
    if s.is_empty() { "None" } else { "[REDACTED]" }
}

impl std::fmt::Debug for ApiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiSettings")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("backup_url", &self.backup_url)
            .field("backup_token", &redact(&self.backup_token))
            .field("api_presets", &self.api_presets)
            .finish_non_exhaustive()
    }
}

impl std::fmt::Debug for ApiPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiPreset")
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Platform directive (first system message)
    #[serde(default = "default_directive")]
    pub directive: String,

    /// Heading placed above the persona text
    #[serde(default = "default_persona_heading")]
    pub persona_heading: String,

    /// Heading placed above injected knowledge
    #[serde(default = "default_knowledge_heading")]
    pub knowledge_heading: String,

    /// Most recent non-system turns forwarded to the model
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

fn default_directive() -> String {
    DEFAULT_DIRECTIVE.into()
}
fn default_persona_heading() -> String {
    "=== Character Persona ===".into()
}
fn default_knowledge_heading() -> String {
    "=== World Knowledge / Setting ===".into()
}
fn default_history_turns() -> usize {
    30
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            directive: default_directive(),
            persona_heading: default_persona_heading(),
            knowledge_heading: default_knowledge_heading(),
            history_turns: default_history_turns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Trailing history turns scanned for keys, besides the user's text
    #[serde(default = "default_scan_turns")]
    pub scan_turns: usize,

    /// Substituted for `{{user}}`
    #[serde(default = "default_user_label")]
    pub user_label: String,

    /// Substituted for `{{char}}` when the character has no name
    #[serde(default = "default_character_label")]
    pub character_label: String,
}

fn default_scan_turns() -> usize {
    2
}
fn default_user_label() -> String {
    "User".into()
}
fn default_character_label() -> String {
    "Character".into()
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            scan_turns: default_scan_turns(),
            user_label: default_user_label(),
            character_label: default_character_label(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Messages added to the visible window per "load more"
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Pause between revealed paragraphs, in milliseconds
    #[serde(default = "default_reveal_delay_ms")]
    pub reveal_delay_ms: u64,
}

fn default_page_size() -> usize {
    15
}
fn default_reveal_delay_ms() -> u64 {
    400
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            reveal_delay_ms: default_reveal_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data file; defaults to `~/.parlor/data.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Byte limit for the whole store; unlimited when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_bytes: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: None,
            quota_bytes: None,
        }
    }
}

impl StorageConfig {
    /// The configured data path, or the default one.
    pub fn data_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("data.json"))
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.parlor/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `PARLOR_API_URL`
    /// - `PARLOR_API_KEY`
    /// - `PARLOR_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(url) = std::env::var("PARLOR_API_URL") {
            config.api.api_url = url;
        }
        if let Ok(key) = std::env::var("PARLOR_API_KEY") {
            config.api.api_key = key;
        }
        if let Ok(model) = std::env::var("PARLOR_MODEL") {
            config.api.model = model;
        }

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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parlor")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.api.temperature) {
            return Err(ConfigError::ValidationError(
                "api.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.display.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "display.page_size must be at least 1".into(),
            ));
        }

        if self.context.history_turns == 0 {
            return Err(ConfigError::ValidationError(
                "context.history_turns must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
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

    /// Endpoint, key or model not set; nothing is sent.
    #[error("Configure the {0} before sending")]
    Incomplete(String),
}
