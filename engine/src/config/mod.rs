//! Configuration management
//!
//! This module handles loading, validation, and management of the kiosk configuration.
//! Configuration is stored in TOML format at ~/.kiosk/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **providers**: STT, chat and inner-task provider endpoints
//! - **store**: Memory TTLs and housekeeping schedule
//! - **host**: Tick interval and event channel size
//!
//! Provider time budgets are not configurable: STT and chat get 12 seconds,
//! inner tasks 4 seconds, and nothing is retried.
//!
//! # Examples
//!
//! ```no_run
//! use kiosk_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load configuration from default location
//! let config = Config::load_or_create()?;
//!
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Chat provider: {}", config.providers.chat.kind);
//! # Ok(())
//! # }
//! ```

use kiosk_sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Provider endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Memory store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Host loop settings
    #[serde(default)]
    pub host: HostConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    /// Speech-to-text provider
    #[serde(default)]
    pub stt: SttConfig,

    /// Conversation provider
    #[serde(default)]
    pub chat: LlmEndpointConfig,

    /// Background decision provider (consent decisions)
    #[serde(default)]
    pub inner_task: LlmEndpointConfig,
}

/// Speech-to-text provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// Provider kind (whisper, stub)
    #[serde(default = "default_stt_kind")]
    pub kind: String,

    /// Base URL of the whisper.cpp compatible server
    #[serde(default = "default_whisper_base_url")]
    pub base_url: String,

    /// Transcription language hint
    #[serde(default = "default_language")]
    pub language: String,
}

/// LLM endpoint configuration, shared by the chat and inner-task providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEndpointConfig {
    /// Provider kind (ollama, stub)
    #[serde(default = "default_llm_kind")]
    pub kind: String,

    /// Base URL for the Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// Memory store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Hours a pending memory waits for staff review
    #[serde(default = "default_ttl_hours")]
    pub pending_ttl_hours: u64,

    /// Hours a rejected memory is kept before physical deletion
    #[serde(default = "default_ttl_hours")]
    pub rejected_ttl_hours: u64,

    /// Hours a deleted memory is kept before physical deletion
    #[serde(default = "default_ttl_hours")]
    pub deleted_ttl_hours: u64,

    /// Seconds between housekeeping sweeps
    #[serde(default = "default_housekeeping_interval")]
    pub housekeeping_interval_secs: u64,
}

/// Host loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Milliseconds between TICK events
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Capacity of the bounded event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.kiosk")
}

fn default_stt_kind() -> String {
    "whisper".to_string()
}

fn default_whisper_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_language() -> String {
    "ja".to_string()
}

fn default_llm_kind() -> String {
    "ollama".to_string()
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_ttl_hours() -> u64 {
    24
}

fn default_housekeeping_interval() -> u64 {
    600
}

fn default_tick_interval() -> u64 {
    1_000
}

fn default_event_buffer() -> usize {
    100
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            kind: default_stt_kind(),
            base_url: default_whisper_base_url(),
            language: default_language(),
        }
    }
}

impl Default for LlmEndpointConfig {
    fn default() -> Self {
        Self {
            kind: default_llm_kind(),
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pending_ttl_hours: default_ttl_hours(),
            rejected_ttl_hours: default_ttl_hours(),
            deleted_ttl_hours: default_ttl_hours(),
            housekeeping_interval_secs: default_housekeeping_interval(),
        }
    }
}

impl StoreConfig {
    pub fn pending_ttl_ms(&self) -> i64 {
        hours_to_ms(self.pending_ttl_hours)
    }

    pub fn rejected_ttl_ms(&self) -> i64 {
        hours_to_ms(self.rejected_ttl_hours)
    }

    pub fn deleted_ttl_ms(&self) -> i64 {
        hours_to_ms(self.deleted_ttl_hours)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_secs)
    }
}

fn hours_to_ms(hours: u64) -> i64 {
    (hours as i64).saturating_mul(60 * 60 * 1_000)
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl HostConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Config {
    /// Load configuration from the default location (~/.kiosk/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        // Serialize before processing so the file keeps the portable ~ path
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        config.validate_and_process()?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.kiosk/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".kiosk").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            providers: ProvidersConfig::default(),
            store: StoreConfig::default(),
            host: HostConfig::default(),
        }
    }

    /// Path of the SQLite memory store
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("kiosk.db")
    }

    /// Validate and process configuration
    ///
    /// Checks enumerated values and intervals, expands ~ in the data
    /// directory and creates it if needed.
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_stt = ["whisper", "stub"];
        if !valid_stt.contains(&self.providers.stt.kind.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid stt provider '{}'. Must be one of: {}",
                self.providers.stt.kind,
                valid_stt.join(", ")
            )));
        }

        let valid_llm = ["ollama", "stub"];
        for (section, endpoint) in [
            ("chat", &self.providers.chat),
            ("inner_task", &self.providers.inner_task),
        ] {
            if !valid_llm.contains(&endpoint.kind.as_str()) {
                return Err(EngineError::Config(format!(
                    "Invalid {} provider '{}'. Must be one of: {}",
                    section,
                    endpoint.kind,
                    valid_llm.join(", ")
                )));
            }
        }

        if self.store.pending_ttl_hours == 0
            || self.store.rejected_ttl_hours == 0
            || self.store.deleted_ttl_hours == 0
        {
            return Err(EngineError::Config(
                "memory TTLs must be at least one hour".to_string(),
            ));
        }

        if self.store.housekeeping_interval_secs == 0 {
            return Err(EngineError::Config(
                "housekeeping_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.host.tick_interval_ms == 0 {
            return Err(EngineError::Config(
                "tick_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.host.event_buffer == 0 {
            return Err(EngineError::Config(
                "event_buffer must be greater than 0".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
