//! Configuration file handling.
//!
//! This module handles loading and merging application settings from
//! `.tiersnap.toml` files. Domain definitions live in their own TOML files,
//! see [`tiersnap::domain::DomainConfig`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::{Args, OutputFormat};
use tiersnap::presets::{Domain, DEFAULT_CASH_THRESHOLD};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".tiersnap.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Where records come from.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Which domains to run.
    #[serde(default)]
    pub domains: DomainsConfig,
}

/// General application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default)]
    pub format: OutputFormat,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Wrap JSON output in `{ success, data, timestamp }`.
    #[serde(default)]
    pub envelope: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            format: OutputFormat::default(),
            verbose: false,
            envelope: false,
        }
    }
}

fn default_output() -> String {
    "tiersnap_report.md".to_string()
}

/// Record source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Directory holding `<domain>.json` record files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Domain selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainsConfig {
    /// Built-in presets to run when no domain is given on the command line.
    #[serde(default = "default_presets")]
    pub presets: Vec<Domain>,

    /// Directory of domain TOML files, used instead of `presets` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<String>,

    /// Reporting threshold for the payments preset.
    #[serde(default = "default_cash_threshold")]
    pub cash_threshold: f64,
}

impl Default for DomainsConfig {
    fn default() -> Self {
        Self {
            presets: default_presets(),
            config_dir: None,
            cash_threshold: default_cash_threshold(),
        }
    }
}

fn default_presets() -> Vec<Domain> {
    Domain::ALL.to_vec()
}

fn default_cash_threshold() -> f64 {
    DEFAULT_CASH_THRESHOLD
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if let Some(format) = args.format {
            self.general.format = format;
        }
        if args.envelope {
            self.general.envelope = true;
        }
        if args.verbose {
            self.general.verbose = true;
        }

        if let Some(ref dir) = args.data_dir {
            self.sources.data_dir = dir.display().to_string();
        }
        if let Some(timeout) = args.timeout {
            self.sources.timeout_seconds = timeout;
        }

        if let Some(ref dir) = args.config_dir {
            self.domains.config_dir = Some(dir.display().to_string());
        }
        if !args.preset.is_empty() {
            self.domains.presets = args.preset.clone();
        }
        if let Some(threshold) = args.cash_threshold {
            self.domains.cash_threshold = threshold;
        }
    }

    /// Log level from the merged settings. `quiet` wins over `verbose`.
    pub fn log_level(&self, quiet: bool) -> tracing::Level {
        if quiet {
            tracing::Level::ERROR
        } else if self.general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.general.output)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
