// # rotord - DNS rotation daemon
//
// Thin integration layer over rotor-core. No rotation logic lives here:
// this binary parses the command line, wires up the Cloudflare provider
// and HTTP agent factories, and dispatches to one of two modes sharing
// the same engine and the same state-file discipline:
//
// - `rotord tick`: one evaluation pass, for an external scheduler
//   (cron/systemd timer) invoking it every minute
// - `rotord run`:  long-lived process with an internal ticker
//
// ## Exit codes
//
// - 0: tick/run completed (individual jobs may have failed; see logs)
// - 1: unexpected runtime error
// - 2: fatal configuration error
// - 3: fatal state-file error
// - 4: provider credentials invalid

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use rotor_agent_http::HttpAgentFactory;
use rotor_core::{EngineOptions, Error, FileStateStore, RotationEngine, SystemClock};
use rotor_provider_cloudflare::CloudflareFactory;

#[derive(Parser)]
#[command(name = "rotord", version, about = "DNS record rotation daemon")]
struct Cli {
    /// Path to the configuration document
    #[arg(long, default_value = "/etc/rotor/config.json")]
    config: PathBuf,

    /// Path to the rotation-state file
    #[arg(long, default_value = "/var/lib/rotor/state.json")]
    state: PathBuf,

    /// Seconds between ticks in run mode
    #[arg(long, default_value_t = 60)]
    tick_secs: u64,

    /// Log level: trace, debug, info, warn, error
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one evaluation pass and exit
    Tick,
    /// Run as a long-lived daemon with an internal ticker
    Run,
}

fn init_tracing(level: &str) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => bail!("invalid log level: {}", other),
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level) {
        eprintln!("startup error: {:#}", e);
        return ExitCode::from(2);
    }

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to create tokio runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    ExitCode::from(rt.block_on(run_app(cli)))
}

async fn run_app(cli: Cli) -> u8 {
    // Startup config parse is fatal; mid-run reload failures only abort
    // the affected tick.
    if let Err(e) = rotor_core::Config::load(&cli.config).await {
        error!("{}", e);
        return e.exit_code();
    }

    let store = match FileStateStore::open(&cli.state).await {
        Ok(store) => store,
        Err(e) => {
            error!("{}", e);
            return e.exit_code();
        }
    };

    let options = EngineOptions {
        tick_period: Duration::from_secs(cli.tick_secs),
        ..EngineOptions::default()
    };
    let engine = RotationEngine::new(
        &cli.config,
        Arc::new(store),
        Box::new(CloudflareFactory),
        Box::new(HttpAgentFactory),
        Arc::new(SystemClock),
        options,
    );

    // Token verification: bad credentials abort; a transiently
    // unreachable provider does not keep the engine from starting.
    match engine.verify_accounts().await {
        Ok(()) => info!("provider tokens verified"),
        Err(e @ Error::Auth(_)) => {
            error!("{}", e);
            return e.exit_code();
        }
        Err(e @ Error::Config(_)) => {
            error!("{}", e);
            return e.exit_code();
        }
        Err(e) => warn!("token verification inconclusive, continuing: {}", e),
    }

    let result = match cli.command {
        Command::Tick => engine.timed_tick().await.map(|report| {
            info!(
                fired = report.fired.len(),
                failed = report.failed.len(),
                "tick finished"
            );
        }),
        Command::Run => {
            info!(tick_secs = cli.tick_secs, "starting rotation loop");
            engine.run().await
        }
    };

    match result {
        Ok(_) => 0,
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    }
}
