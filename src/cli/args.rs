//! Command line arguments for fabric-preflight.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Command to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Subcommand)]
pub enum Command {
    /// Run the pre-upgrade checks (default)
    #[default]
    Run,
    /// List all available checks
    List,
}

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable terminal output
    #[default]
    Text,
    /// Machine-readable JSON
    Json,
}

/// Parsed command line arguments
#[derive(Debug, Clone, Parser)]
#[command(name = "fabric-preflight")]
#[command(about = "Pre-upgrade health checks for a network fabric", version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Current controller version; queried from the fabric when omitted
    #[arg(long, global = true)]
    pub cversion: Option<String>,

    /// Version the fabric is being upgraded to
    #[arg(long, global = true)]
    pub tversion: Option<String>,

    /// Global timeout for all checks, in seconds
    #[arg(long, global = true, default_value_t = 1200)]
    pub timeout: u64,

    /// Run only checks that need nothing beyond the management API
    #[arg(long, global = true, default_value_t = false)]
    pub api_only: bool,

    /// Comma-separated check ids to run instead of the full list
    #[arg(long, global = true)]
    pub debug_function: Option<String>,

    /// Directory receiving the log, metadata and per-check records
    #[arg(long, global = true, default_value = "preupgrade_validator_logs")]
    pub output_dir: PathBuf,

    /// Base URL of the local API proxy
    #[arg(long, global = true, env = "FABRIC_PREFLIGHT_PROXY", default_value = "http://127.0.0.1:7777")]
    pub proxy_url: String,

    /// Login for terminal sessions
    #[arg(long, global = true, env = "FABRIC_PREFLIGHT_USER", default_value = "admin")]
    pub username: String,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true, default_value_t = false)]
    pub no_color: bool,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.unwrap_or_default()
    }

    /// `--no-color`, or any value of the `NO_COLOR` environment variable.
    pub fn color_disabled(&self) -> bool {
        self.no_color || std::env::var_os("NO_COLOR").is_some()
    }
}
