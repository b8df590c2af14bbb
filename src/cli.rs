//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use tiersnap::presets::Domain;

/// Tiersnap - tiered metric snapshots for BI dashboards
///
/// Classify records into severity tiers, aggregate them and emit
/// prioritized recommendations. Markdown/JSON output.
///
/// Examples:
///   tiersnap --preset expiry --input lots.json
///   tiersnap --preset payments --cash-threshold 15000 --url https://erp.local/api/payments
///   tiersnap --config-dir domains/ --data-dir exports/ --format json --envelope
///   tiersnap --init-domain returns > returns.toml
///   tiersnap --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Built-in domain(s) to run (comma-separated)
    ///
    /// Values: expiry, pricing, payments, scheduling, customers, inventory, returns.
    #[arg(long, value_name = "DOMAIN", value_delimiter = ',', env = "TIERSNAP_PRESET")]
    pub preset: Vec<Domain>,

    /// Domain configuration file(s) in TOML
    #[arg(long, value_name = "FILE")]
    pub domain_config: Vec<PathBuf>,

    /// Directory of domain configuration files (*.toml)
    #[arg(long, value_name = "DIR", env = "TIERSNAP_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    /// Directory holding one `<domain>.json` record file per domain
    #[arg(long, value_name = "DIR", env = "TIERSNAP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// JSON record file (single domain only)
    #[arg(short, long, value_name = "FILE", conflicts_with = "url")]
    pub input: Option<PathBuf>,

    /// URL returning JSON records (single domain only)
    #[arg(long, value_name = "URL", env = "TIERSNAP_URL")]
    pub url: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Output format (markdown, json)
    #[arg(long, value_name = "FORMAT", env = "TIERSNAP_FORMAT")]
    pub format: Option<OutputFormat>,

    /// Output file path ("-" for stdout)
    #[arg(short, long, value_name = "FILE", env = "TIERSNAP_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Wrap JSON output in { success, data, timestamp }
    #[arg(long)]
    pub envelope: bool,

    /// Reporting threshold for the payments preset
    #[arg(long, value_name = "AMOUNT", env = "TIERSNAP_CASH_THRESHOLD")]
    pub cash_threshold: Option<f64>,

    /// Override the average unit value used for savings estimates
    #[arg(long, value_name = "AMOUNT")]
    pub average_unit_value: Option<f64>,

    /// Override the number of breakdown groups kept
    #[arg(long, value_name = "N")]
    pub top_n: Option<usize>,

    /// Fail if a recommendation at or above this priority fires
    ///
    /// Useful for CI pipelines and cron jobs. Exit code 2 when it trips.
    /// The closing default recommendation never counts.
    #[arg(long, value_name = "PRIORITY")]
    pub fail_on: Option<u32>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .tiersnap.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .tiersnap.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Print a built-in domain as editable TOML and exit
    #[arg(long, value_name = "DOMAIN")]
    pub init_domain: Option<Domain>,
}

/// Output format for the report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Number of domains named on the command line.
    pub fn explicit_domain_count(&self) -> usize {
        self.preset.len() + self.domain_config.len()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for the generators
        if self.init_config || self.init_domain.is_some() {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if (self.input.is_some() || self.url.is_some()) && self.explicit_domain_count() != 1 {
            return Err(
                "--input and --url need exactly one --preset or --domain-config".to_string(),
            );
        }

        if let Some(ref url) = self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(threshold) = self.cash_threshold {
            if !threshold.is_finite() || threshold <= 0.0 {
                return Err("Cash threshold must be a positive number".to_string());
            }
        }

        if let Some(value) = self.average_unit_value {
            if !value.is_finite() || value < 0.0 {
                return Err("Average unit value must be zero or positive".to_string());
            }
        }

        if self.top_n == Some(0) {
            return Err("Top N must be at least 1".to_string());
        }

        if self.fail_on == Some(0) {
            return Err("Fail-on priority must be at least 1".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let Some(ref input) = self.input {
            if !input.is_file() {
                return Err(format!("Input file does not exist: {}", input.display()));
            }
        }

        if let Some(ref dir) = self.config_dir {
            if !dir.is_dir() {
                return Err(format!(
                    "Domain config directory does not exist: {}",
                    dir.display()
                ));
            }
        }

        Ok(())
    }

}
