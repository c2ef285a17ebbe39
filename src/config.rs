//! Configuration loading and management
//!
//! Values come from built-in defaults, then an optional JSON file in the
//! data directory, then `VOICE_STEWARD_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

/// Words that count as a "yes" when heard in a confirmation step
pub const DEFAULT_AFFIRMATIVE: &[&str] = &[
    "yes", "yeah", "yep", "sure", "go ahead", "correct", "confirm", "okay",
];

/// Words that count as a "no" when heard in a confirmation step
pub const DEFAULT_NEGATIVE: &[&str] = &["no", "nope", "cancel", "wrong", "stop", "don't"];

/// Errors raised by [`Config::validate`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("settle interval must be a finite, non-negative number of seconds (got {0})")]
    SettleInterval(f64),

    #[error("listen timeout must be a positive number of seconds (got {0})")]
    ListenTimeout(f64),

    #[error("semantic classifier timeout must be a positive number of seconds (got {0})")]
    SemanticTimeout(f64),

    #[error("{0} keyword set is empty")]
    EmptyKeywords(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Unix socket of the remote capability server
    pub socket_path: PathBuf,

    /// Directory for runtime data and the optional `config.json`
    pub data_dir: PathBuf,

    /// Bearer token passed with every remote capability call
    pub auth_token: String,

    /// Camera snapshot used to identify the speaker
    pub snapshot_path: Option<PathBuf>,

    /// Minimum quiet time between releasing and re-claiming the audio device
    pub settle_interval_secs: f64,

    /// How long a single listen step waits for speech
    pub listen_timeout_secs: f64,

    /// Re-prompts allowed per confirmation step before cancelling
    pub retry_limit: u32,

    pub affirmative: Vec<String>,
    pub negative: Vec<String>,

    /// Whether unmatched transcripts are handed to the semantic classifier
    pub semantic_fallback: bool,
    pub semantic_timeout_secs: f64,
}

/// On-disk overlay; every field is optional
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    socket_path: Option<PathBuf>,
    auth_token: Option<String>,
    snapshot_path: Option<PathBuf>,
    settle_interval_secs: Option<f64>,
    listen_timeout_secs: Option<f64>,
    retry_limit: Option<u32>,
    affirmative: Option<Vec<String>>,
    negative: Option<Vec<String>>,
    semantic_fallback: Option<bool>,
    semantic_timeout_secs: Option<f64>,
}

impl Config {
    /// Build the default configuration rooted at `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            socket_path: data_dir.join("capability.sock"),
            data_dir,
            auth_token: String::new(),
            snapshot_path: None,
            settle_interval_secs: 0.5,
            listen_timeout_secs: 5.0,
            retry_limit: 2,
            affirmative: DEFAULT_AFFIRMATIVE.iter().map(|s| s.to_string()).collect(),
            negative: DEFAULT_NEGATIVE.iter().map(|s| s.to_string()).collect(),
            semantic_fallback: false,
            semantic_timeout_secs: 2.0,
        }
    }

    /// Load configuration from defaults, the data directory and environment
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("voice-steward");

        let mut config = Self::with_data_dir(data_dir);

        let file = config.data_dir.join("config.json");
        if file.exists() {
            config.merge_file(&file)?;
        }

        config.apply_env(|var| std::env::var(var).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Overlay values from a JSON config file
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: FileConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        debug!(path = %path.display(), "merging config file");

        if let Some(v) = file.socket_path {
            self.socket_path = v;
        }
        if let Some(v) = file.auth_token {
            self.auth_token = v;
        }
        if let Some(v) = file.snapshot_path {
            self.snapshot_path = Some(v);
        }
        if let Some(v) = file.settle_interval_secs {
            self.settle_interval_secs = v;
        }
        if let Some(v) = file.listen_timeout_secs {
            self.listen_timeout_secs = v;
        }
        if let Some(v) = file.retry_limit {
            self.retry_limit = v;
        }
        if let Some(v) = file.affirmative {
            self.affirmative = v;
        }
        if let Some(v) = file.negative {
            self.negative = v;
        }
        if let Some(v) = file.semantic_fallback {
            self.semantic_fallback = v;
        }
        if let Some(v) = file.semantic_timeout_secs {
            self.semantic_timeout_secs = v;
        }

        Ok(())
    }

    /// Overlay values from the environment, using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VOICE_STEWARD_SOCKET") {
            self.socket_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("VOICE_STEWARD_TOKEN") {
            self.auth_token = v;
        }
        if let Some(v) = lookup("VOICE_STEWARD_SNAPSHOT") {
            self.snapshot_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("VOICE_STEWARD_SETTLE_SECS") {
            self.settle_interval_secs = parse_env("VOICE_STEWARD_SETTLE_SECS", v)?;
        }
        if let Some(v) = lookup("VOICE_STEWARD_LISTEN_TIMEOUT_SECS") {
            self.listen_timeout_secs = parse_env("VOICE_STEWARD_LISTEN_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("VOICE_STEWARD_RETRY_LIMIT") {
            self.retry_limit = parse_env("VOICE_STEWARD_RETRY_LIMIT", v)?;
        }
        if let Some(v) = lookup("VOICE_STEWARD_SEMANTIC_FALLBACK") {
            self.semantic_fallback = match v.trim() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "VOICE_STEWARD_SEMANTIC_FALLBACK",
                        value: v,
                    })
                }
            };
        }
        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if to_duration(self.settle_interval_secs).is_none() {
            return Err(ConfigError::SettleInterval(self.settle_interval_secs));
        }
        if !to_duration(self.listen_timeout_secs).is_some_and(|d| !d.is_zero()) {
            return Err(ConfigError::ListenTimeout(self.listen_timeout_secs));
        }
        if !to_duration(self.semantic_timeout_secs).is_some_and(|d| !d.is_zero()) {
            return Err(ConfigError::SemanticTimeout(self.semantic_timeout_secs));
        }
        if self.affirmative.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::EmptyKeywords("affirmative"));
        }
        if self.negative.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::EmptyKeywords("negative"));
        }
        Ok(())
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Values that `validate` would reject read as zero
    pub fn settle_interval(&self) -> Duration {
        to_duration(self.settle_interval_secs).unwrap_or_default()
    }

    pub fn listen_timeout(&self) -> Duration {
        to_duration(self.listen_timeout_secs).unwrap_or_default()
    }

    pub fn semantic_timeout(&self) -> Duration {
        to_duration(self.semantic_timeout_secs).unwrap_or_default()
    }
}

/// Seconds to a `Duration`; `None` for negative, non-finite or overflowing values
fn to_duration(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds).ok()
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
