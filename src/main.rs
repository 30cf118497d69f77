//! fabric-preflight CLI entry point
//!
//! Pre-upgrade health checks for a network-fabric controller cluster.

use clap::Parser;
use fabric_preflight::checks::{builtin_checks, collect_common_data};
use fabric_preflight::cli::args::{Args, Command, OutputFormat};
use fabric_preflight::cli::output::get_formatter;
use fabric_preflight::engine::threads::on_worker_thread;
use fabric_preflight::platform::api::ProxyApiClient;
use fabric_preflight::version::get_build_info;
use fabric_preflight::{run_preflight_with_progress, Credentials, PreflightConfig, PreflightError, RunContext};

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const API_TIMEOUT: Duration = Duration::from_secs(30);
const PASSWORD_ENV: &str = "FABRIC_PREFLIGHT_PASSWORD";

fn main() -> ExitCode {
    let args = Args::parse();

    match args.command() {
        Command::List => {
            print_check_list();
            ExitCode::SUCCESS
        }
        Command::Run => match run_checks(&args) {
            Ok(code) => code,
            Err(e) => {
                error!(error = %e, "run aborted");
                eprintln!("Error running checks: {}", e);
                ExitCode::from(3)
            }
        },
    }
}

fn print_check_list() {
    println!("Available checks:");
    println!();
    for check in builtin_checks() {
        println!("  {:<28} {:<4} {}", check.id, check.data_source, check.title);
    }
}

/// Route all tracing output to the run's log file.
///
/// Panics on the threads named in `check_ids` go to the log only; the
/// wrapper records them as check errors.
fn init_logging(ctx: &RunContext, check_ids: HashSet<String>) -> Result<(), PreflightError> {
    let path = ctx.log_path();
    let file = File::create(&path).map_err(|source| PreflightError::Io {
        context: "create log file".to_string(),
        path: path.clone(),
        source,
    })?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fabric_preflight=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .init();

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!(panic = %panic_info, "panic");
        if !on_worker_thread(&check_ids) {
            default_hook(panic_info);
        }
    }));
    Ok(())
}

fn run_checks(args: &Args) -> Result<ExitCode, PreflightError> {
    let config = PreflightConfig::from_args(args);
    let ctx = Arc::new(RunContext::new(&config.output_dir));

    fs::create_dir_all(ctx.output_dir()).map_err(|source| PreflightError::Io {
        context: "create output directory".to_string(),
        path: ctx.output_dir().to_path_buf(),
        source,
    })?;
    let checks = builtin_checks();
    init_logging(&ctx, checks.iter().map(|c| c.id.clone()).collect())?;
    info!(build = %get_build_info().version, bundle = %ctx.bundle_name(), "starting pre-upgrade checks");

    let api = ProxyApiClient::new(&args.proxy_url, API_TIMEOUT).map_err(|e| PreflightError::Setup {
        context: "api client".to_string(),
        message: e.to_string(),
    })?;
    let credentials = Credentials {
        username: args.username.clone(),
        password: std::env::var(PASSWORD_ENV).unwrap_or_default(),
    };
    let inputs = collect_common_data(
        Arc::new(api),
        args.cversion.as_deref(),
        args.tversion.as_deref(),
        credentials,
    )?;
    if inputs.sessions.is_none() && !config.api_only {
        info!("no terminal session transport, switch session checks report N/A");
    }

    // JSON output stays clean for piping.
    let show_progress = args.format == OutputFormat::Text;
    let progress: Box<dyn FnMut(usize, usize) + Send> = Box::new(move |done, total| {
        if show_progress {
            eprint!("\rProgress: {}/{} checks completed", done, total);
            if done == total {
                eprintln!();
            }
            let _ = io::stderr().flush();
        }
    });

    let report = run_preflight_with_progress(ctx, &config, inputs, checks, Some(progress))?;

    let formatter = get_formatter(args.format, args.color_disabled());
    println!("{}", formatter.format(&report));

    info!(
        passed = report.summary.passed(),
        failed = report.summary.failed(),
        total = report.summary.total,
        "run complete"
    );
    if report.summary.failed() > 0 {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
