//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::DEFAULT_CONFIG_FILE;
use clap::Parser;
use std::path::PathBuf;

/// SocFeed - security alert aggregation for SOC dashboards
///
/// Pulls alerts from a SIEM, an EDR, a threat-intel platform, a
/// vulnerability scanner and security news feeds, normalizes them onto one
/// severity scale and prints the combined dashboard object.
///
/// Examples:
///   socfeed
///   socfeed --config /etc/socfeed.toml --limit 25
///   socfeed --format markdown --output snapshot.md
///   socfeed --watch --interval 60
///   socfeed --check-config
///   socfeed --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .socfeed.toml in the current directory
    #[arg(short, long, value_name = "FILE", env = "SOCFEED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Maximum alerts per provider per cycle
    ///
    /// Overrides `general.limit_per_provider` (default 10).
    #[arg(short, long, value_name = "COUNT")]
    pub limit: Option<usize>,

    /// Output format (json, markdown)
    #[arg(long, default_value = "json", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Write output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Re-run the aggregation cycle until interrupted
    #[arg(short, long)]
    pub watch: bool,

    /// Seconds between cycles in watch mode
    ///
    /// Overrides `general.poll_interval_seconds` (default 30).
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Upper bound on a single provider fetch, in seconds
    ///
    /// A provider exceeding it contributes nothing to the cycle.
    #[arg(long, value_name = "SECS")]
    pub adapter_timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .socfeed.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Report which providers are active and eligible, then exit
    ///
    /// No provider is contacted.
    #[arg(long)]
    pub check_config: bool,
}

/// Output format for the cycle result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Dashboard wire object (default)
    #[default]
    Json,
    /// Markdown dashboard snapshot
    Markdown,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Configuration file to read: `--config`, else `.socfeed.toml`.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.watch && self.check_config {
            return Err("Cannot use both --watch and --check-config".to_string());
        }

        if let Some(interval) = self.interval {
            if interval == 0 {
                return Err("Interval must be at least 1 second".to_string());
            }
        }

        if let Some(timeout) = self.adapter_timeout {
            if timeout == 0 {
                return Err("Adapter timeout must be at least 1 second".to_string());
            }
        }

        // Validate output directory if provided
        if let Some(ref output) = self.output {
            if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                if !parent.is_dir() {
                    return Err(format!(
                        "Output directory does not exist: {}",
                        parent.display()
                    ));
                }
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
