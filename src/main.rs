//! Tiersnap - tiered metric snapshots for BI dashboards
//!
//! A CLI tool that classifies raw business records into severity tiers,
//! aggregates them and emits prioritized recommendations.
//!
//! Exit codes:
//!   0 - Success (no recommendation at or above --fail-on, or no --fail-on set)
//!   1 - Runtime error (config, data source, output, etc.)
//!   2 - A recommendation at or above the --fail-on priority fired

mod cli;
mod config;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use std::path::{Path, PathBuf};
use tiersnap::domain::DomainConfig;
use tiersnap::models::{severity_emoji, MetricsSnapshot};
use tiersnap::presets::PresetOptions;
use tiersnap::provider::{DataProvider, HttpProvider, JsonFileProvider};
use tiersnap::report::{self, ApiEnvelope};
use tiersnap::service::{run_all, DomainService};
use tiersnap::snapshot::SnapshotAssembler;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Generators run before logging is set up
    if args.init_config {
        return handle_init_config();
    }
    if let Some(domain) = args.init_domain {
        let options = PresetOptions {
            cash_threshold: args
                .cash_threshold
                .unwrap_or(tiersnap::presets::DEFAULT_CASH_THRESHOLD),
        };
        print!("{}", domain.config_with(&options).to_toml()?);
        return Ok(());
    }

    // Settings from the config file can raise verbosity, so load it first
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(config.log_level(args.quiet));

    info!("Tiersnap v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Config: {:?}", config);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Snapshot failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .tiersnap.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to choose domains, data sources and output.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run every selected domain and write the report. Returns exit code (0 or 2).
async fn run(args: Args, config: Config) -> Result<i32> {
    let mut domains = resolve_domains(&args, &config)?;
    if domains.is_empty() {
        anyhow::bail!("No domains selected");
    }
    apply_overrides(&mut domains, &args);

    let mut services = Vec::with_capacity(domains.len());
    for domain in &domains {
        let assembler = SnapshotAssembler::new(domain)
            .with_context(|| format!("Invalid domain config '{}'", domain.name))?;
        let provider = build_provider(&args, &config, &domain.name)?;
        info!("Domain '{}' reading from {}", domain.name, provider.name());
        services.push(DomainService::new(assembler, provider));
    }

    let computed_at = Utc::now();
    let mut snapshots = Vec::with_capacity(services.len());
    let mut failed = 0;
    for (service, result) in services.iter().zip(run_all(&services, computed_at).await) {
        match result {
            Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => {
                eprintln!("❌ {}: {}", service.domain(), e);
                failed += 1;
            }
        }
    }
    if failed > 0 {
        anyhow::bail!("{} of {} domains failed", failed, services.len());
    }

    let output = render(&snapshots, &config, computed_at)?;
    let to_stdout = config.general.output == "-";
    if to_stdout {
        println!("{}", output);
    } else {
        let path = config.output_path();
        std::fs::write(&path, &output)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    if !args.quiet {
        print_summary(&snapshots, to_stdout);
        if !to_stdout {
            println!("\n✅ Snapshot complete! Report saved to: {}", config.general.output);
        }
    }

    // Check --fail-on threshold
    if let Some(priority) = args.fail_on {
        if tripped(&snapshots, priority) {
            eprintln!(
                "\n⛔ Recommendations at or above priority {} fired. Failing (exit code 2).",
                priority
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems go straight to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load {}: {:#}. Using defaults.", CONFIG_FILE, e);
            Ok(Config::default())
        }
    }
}

/// Domains named on the command line win; otherwise the config's
/// directory, then its preset list.
fn resolve_domains(args: &Args, config: &Config) -> Result<Vec<DomainConfig>> {
    let options = PresetOptions {
        cash_threshold: config.domains.cash_threshold,
    };

    if args.explicit_domain_count() > 0 {
        let mut domains: Vec<DomainConfig> =
            args.preset.iter().map(|d| d.config_with(&options)).collect();
        for path in &args.domain_config {
            domains.push(DomainConfig::load(path)?);
        }
        return Ok(domains);
    }

    if let Some(ref dir) = config.domains.config_dir {
        return DomainConfig::load_dir(Path::new(dir));
    }

    Ok(config
        .domains
        .presets
        .iter()
        .map(|d| d.config_with(&options))
        .collect())
}

fn apply_overrides(domains: &mut [DomainConfig], args: &Args) {
    for domain in domains {
        if let Some(value) = args.average_unit_value {
            domain.savings.average_unit_value = value;
        }
        if let (Some(top_n), Some(breakdown)) = (args.top_n, domain.breakdown.as_mut()) {
            breakdown.top_n = top_n;
        }
    }
}

fn build_provider(args: &Args, config: &Config, domain: &str) -> Result<Box<dyn DataProvider>> {
    if let Some(ref input) = args.input {
        return Ok(Box::new(JsonFileProvider::new(input)));
    }
    if let Some(ref url) = args.url {
        let provider = HttpProvider::new(url, config.sources.timeout_seconds)
            .context("Failed to create HTTP client")?;
        return Ok(Box::new(provider));
    }

    let path = PathBuf::from(&config.sources.data_dir).join(format!("{}.json", domain));
    Ok(Box::new(JsonFileProvider::new(path)))
}

fn render(
    snapshots: &[MetricsSnapshot],
    config: &Config,
    computed_at: chrono::DateTime<Utc>,
) -> Result<String> {
    match config.general.format {
        OutputFormat::Markdown => Ok(report::generate_markdown_report(snapshots, computed_at)),
        OutputFormat::Json => match (snapshots, config.general.envelope) {
            ([single], true) => report::generate_json_report(&ApiEnvelope::ok(single, computed_at)),
            ([single], false) => report::generate_json_report(single),
            (many, true) => report::generate_json_report(&ApiEnvelope::ok(many, computed_at)),
            (many, false) => report::generate_json_report(many),
        },
    }
}

fn print_summary(snapshots: &[MetricsSnapshot], to_stderr: bool) {
    let mut lines = vec!["\n📊 Snapshot Summary:".to_string()];
    for snapshot in snapshots {
        let tiers = snapshot
            .aggregates
            .iter()
            .map(|a| {
                format!(
                    "{} {}: {}",
                    severity_emoji(a.severity_rank, snapshot.aggregates.len()),
                    a.tier_label,
                    a.count
                )
            })
            .collect::<Vec<_>>()
            .join(" | ");
        lines.push(format!(
            "   {} ({} records, {} unclassifiable)",
            snapshot.domain, snapshot.summary.total_records, snapshot.unclassifiable_count
        ));
        lines.push(format!("   - {}", tiers));
        if let Some(top) = snapshot.recommendations.first() {
            lines.push(format!("   - [P{}] {}", top.priority, top.message));
        }
    }

    for line in lines {
        if to_stderr {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }
}

/// Whether any non-default recommendation has priority `<= priority`.
fn tripped(snapshots: &[MetricsSnapshot], priority: u32) -> bool {
    snapshots.iter().any(|s| {
        let rules = s.recommendations.len().saturating_sub(1);
        s.recommendations[..rules]
            .iter()
            .any(|r| r.priority <= priority)
    })
}
