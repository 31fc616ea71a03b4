//! `satfolio`
//!
//! Runs a portfolio of SAT solvers on one input, relays the first decisive
//! answer on stdout and exits with its status (10 SAT, 20 UNSAT, 0 none).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use satfolio_runner::runner::{RunOptions, run_portfolio};

#[derive(Parser, Debug)]
#[command(name = "satfolio")]
#[command(version, about = "satfolio - parallel SAT solver portfolio")]
struct Args {
    /// Benchmark file handed to every solver
    input: PathBuf,

    /// Number of cores to use (0 = all available; must resolve to 1, 2, 4 or 8)
    #[arg(short = 'c', long = "nbcore", default_value_t = 0, env = "SATFOLIO_NBCORE")]
    nbcore: usize,

    /// Settings file layered over the global one
    #[arg(long, env = "SATFOLIO_CONFIG")]
    config: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn"). Logs go to stderr.
    #[arg(long, default_value = "warn", env = "SATFOLIO_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON.
    #[arg(long, env = "SATFOLIO_LOG_JSON")]
    log_json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let log_filter = format!(
        "satfolio_runner={level},satfolio_core={level}",
        level = args.log_level
    );
    satfolio_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let settings = satfolio_core::config::load_settings(args.config.as_deref())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        input = %args.input.display(),
        nbcore = args.nbcore,
        scratch_dir = %settings.scratch_dir.display(),
        "Starting satfolio"
    );

    let options = RunOptions {
        input: args.input,
        core_budget: args.nbcore,
    };
    let (report, _) =
        run_portfolio(&settings, &options, std::io::stdout().lock(), shutdown_signal()).await?;

    Ok(ExitCode::from(report.exit_code))
}

/// Completes on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
    #[cfg(unix)]
    let sigterm_future = async {
        match sigterm.as_mut() {
            Some(s) => {
                s.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
        () = sigterm_future => info!("Received SIGTERM"),
    }
}
