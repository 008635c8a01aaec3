//! SocFeed - security alert aggregation engine
//!
//! A CLI tool that pulls alerts from five security providers concurrently,
//! normalizes them onto one severity scale and emits the dashboard object.
//!
//! Exit codes:
//!   0 - Success (provider failures only empty their own slot)
//!   1 - Runtime error (invalid arguments, unreadable config, output failure)

mod aggregation;
mod cli;
mod config;
mod models;
mod providers;
mod report;
mod severity;

use aggregation::eligibility::{self, Eligibility};
use aggregation::Aggregator;
use anyhow::{Context, Result};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, ConfigGateway, FileConfigGateway};
use models::{ProviderCategory, ReportMetadata, SeveritySummary};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
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

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config(&args.config_path());
    }

    init_logging(&args)?;

    info!("SocFeed v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(args).await {
        error!("SocFeed failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default configuration file.
fn handle_init_config(path: &Path) -> Result<()> {
    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            path.display()
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("✅ Created {} with default settings.", path.display());
    println!("   Enable providers and fill in their credentials to start aggregating.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
///
/// Logs go to stderr; stdout is reserved for the cycle output.
fn init_logging(args: &Args) -> Result<()> {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Run a single cycle, or keep cycling in watch mode.
async fn run(args: Args) -> Result<()> {
    let config_path = args.config_path();

    let mut config = load_config(&config_path)?;
    config.merge_with_args(&args);

    let gateway = FileConfigGateway::new(&config_path);

    if args.check_config {
        return handle_check_config(&gateway).await;
    }

    let aggregator = Aggregator::new(
        Arc::new(gateway),
        providers::default_adapters(&config.http),
        config.http.adapter_timeout(),
    );

    if !args.watch {
        return run_cycle(&aggregator, &config, &args).await;
    }

    let interval = Duration::from_secs(config.general.poll_interval_seconds.max(1));
    info!(
        "Watching providers every {}s (Ctrl-C to stop)",
        interval.as_secs()
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let cycles = watch(interval, shutdown, || run_cycle(&aggregator, &config, &args)).await;
    debug!("Watch loop finished after {} cycles", cycles);

    Ok(())
}

/// Run `cycle` every `period` until `shutdown` resolves.
///
/// Shutdown is observed while waiting for the next tick and while a cycle is
/// in flight; an interrupted cycle is dropped. Returns the completed cycles.
async fn watch<F, Fut>(period: Duration, shutdown: impl Future<Output = ()>, mut cycle: F) -> usize
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut completed = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, stopping watch loop");
                break;
            }
            outcome = async {
                ticker.tick().await;
                cycle().await
            } => {
                completed += 1;
                if let Err(e) = outcome {
                    warn!("Cycle output failed: {:#}", e);
                }
            }
        }
    }

    completed
}

/// Run one aggregation cycle and emit its output.
async fn run_cycle(aggregator: &Aggregator, config: &Config, args: &Args) -> Result<()> {
    let start_time = Instant::now();
    let limit = config.general.limit_per_provider;

    let result = aggregator.run_cycle(limit).await;

    let metadata = ReportMetadata {
        generated_at: Utc::now(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
        limit_per_provider: limit,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&result)?,
        OutputFormat::Markdown => report::generate_markdown_report(&result, &metadata),
    };

    match args.output {
        Some(ref path) => {
            report::write_report(&output, path)?;
            info!("Snapshot written to {}", path.display());
        }
        None => println!("{}", output),
    }

    let summary = SeveritySummary::from_items(result.iter().flat_map(|(_, items)| items));
    info!(
        "{} alerts: 🔴 {} | 🟠 {} | 🟡 {} | 🟢 {} | 🔵 {} ({:.1}s)",
        summary.total,
        summary.critical,
        summary.high,
        summary.medium,
        summary.low,
        summary.info,
        metadata.duration_seconds
    );

    Ok(())
}

/// Handle --check-config: report provider readiness without contacting any.
async fn handle_check_config(gateway: &FileConfigGateway) -> Result<()> {
    let active = gateway.active_config().await?;

    println!("🔎 Provider configuration ({}):\n", gateway.path().display());

    let mut ready = 0;
    for category in ProviderCategory::ALL {
        let outcome = eligibility::evaluate(category, &active);
        if outcome.is_eligible() {
            ready += 1;
        }

        let status = match outcome {
            Eligibility::Eligible => "✅ ready".to_string(),
            Eligibility::Inactive => "⏸️  disabled".to_string(),
            Eligibility::Missing(fields) => format!("⚠️  missing {}", fields.join(", ")),
        };
        println!("   {:<10} {}", category.source().to_string(), status);
    }

    println!(
        "\n   {} of {} providers will be contacted.",
        ready,
        ProviderCategory::ALL.len()
    );
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        info!("Loading config from: {}", path.display());
        return Config::load(path);
    }

    warn!(
        "No config file at {}, using defaults (no providers active)",
        path.display()
    );
    Ok(Config::default())
}
