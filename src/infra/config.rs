//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::error::DetectionError;
use crate::domain::request::{DetectionRequest, DEFAULT_MIN_COINCIDENCES, DEFAULT_WINDOW_SECONDS};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,
    #[serde(default = "default_min_coincidences")]
    pub min_coincidences: i64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            min_coincidences: default_min_coincidences(),
        }
    }
}

fn default_window_seconds() -> i64 {
    DEFAULT_WINDOW_SECONDS
}

fn default_min_coincidences() -> i64 {
    DEFAULT_MIN_COINCIDENCES
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Reads accepted per run before the request is rejected
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    /// Reads allowed inside any single co-travel window
    #[serde(default = "default_max_events_per_window")]
    pub max_events_per_window: usize,
    /// Wall-clock budget for one detection run
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Interval for periodic metrics summaries (seconds, 0 to disable)
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
            max_events_per_window: default_max_events_per_window(),
            timeout_secs: default_timeout_secs(),
            metrics_interval_secs: default_metrics_interval_secs(),
        }
    }
}

fn default_max_events() -> usize {
    1_000_000
}

fn default_max_events_per_window() -> usize {
    5_000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_metrics_interval_secs() -> u64 {
    0
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct InputConfig {
    /// JSONL file of ALPR reads
    #[serde(default)]
    pub reads: Option<String>,
    /// JSON array of reader metadata
    #[serde(default)]
    pub readers: Option<String>,
    /// Restrict reads to one case
    #[serde(default)]
    pub case_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OutputConfig {
    /// Report file (stdout when unset)
    #[serde(default)]
    pub file: Option<String>,
    /// Pretty-print the JSON report
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    window_seconds: i64,
    min_coincidences: i64,
    max_events: usize,
    max_events_per_window: usize,
    timeout_secs: u64,
    metrics_interval_secs: u64,
    reads_file: Option<String>,
    readers_file: Option<String>,
    case_id: Option<i64>,
    output_file: Option<String>,
    pretty: bool,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            window_seconds: toml_config.detection.window_seconds,
            min_coincidences: toml_config.detection.min_coincidences,
            max_events: toml_config.limits.max_events,
            max_events_per_window: toml_config.limits.max_events_per_window,
            timeout_secs: toml_config.limits.timeout_secs,
            metrics_interval_secs: toml_config.limits.metrics_interval_secs,
            reads_file: toml_config.input.reads,
            readers_file: toml_config.input.readers,
            case_id: toml_config.input.case_id,
            output_file: toml_config.output.file,
            pretty: toml_config.output.pretty,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        // Check for --config argument
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        // Check CONFIG_FILE environment variable
        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        // Default to dev.toml
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(config_file = %path, error = %format!("{e:#}"), "config_fallback_to_defaults");
                Self::default()
            }
        }
    }

    /// Reject limits that would make every run fail or never finish
    pub fn validate(&self) -> Result<(), DetectionError> {
        if self.max_events == 0 {
            return Err(DetectionError::Configuration("limits.max_events must be positive".into()));
        }
        if self.max_events_per_window == 0 {
            return Err(DetectionError::Configuration(
                "limits.max_events_per_window must be positive".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(DetectionError::Configuration(
                "limits.timeout_secs must be positive".into(),
            ));
        }
        // Window and threshold share the request's validation
        self.detection_request().validate().map(|_| ())
    }

    /// Request seeded with the configured detection defaults
    pub fn detection_request(&self) -> DetectionRequest {
        DetectionRequest {
            window_seconds: self.window_seconds,
            min_coincidences: self.min_coincidences,
            ..DetectionRequest::default()
        }
    }

    // Getters for all config fields
    pub fn window_seconds(&self) -> i64 {
        self.window_seconds
    }

    pub fn min_coincidences(&self) -> i64 {
        self.min_coincidences
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    pub fn max_events_per_window(&self) -> usize {
        self.max_events_per_window
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn reads_file(&self) -> Option<&str> {
        self.reads_file.as_deref()
    }

    pub fn readers_file(&self) -> Option<&str> {
        self.readers_file.as_deref()
    }

    pub fn case_id(&self) -> Option<i64> {
        self.case_id
    }

    pub fn output_file(&self) -> Option<&str> {
        self.output_file.as_deref()
    }

    pub fn pretty(&self) -> bool {
        self.pretty
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the wall-clock budget
    #[cfg(test)]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}
