//! drove-daemon - worker pool supervisor
//!
//! Runs one worker pool from a configuration file and keeps it converged.
//!
//! # Control loop
//!
//! A single control thread owns the pool. It runs a convergence pass every
//! `check_delay` and maps signals sent to the daemon onto pool commands:
//!
//! - `SIGHUP` reloads workers (`reload`)
//! - `SIGTTIN` / `SIGTTOU` add or remove one worker (`ttin` / `ttou`)
//! - `SIGTERM` / `SIGINT` stop every worker and exit
//!
//! Pool operations block the control thread (warmup delays, waiting for a
//! worker to exit). The runtime is current-thread and nothing else runs on
//! it, so blocking there only delays the next tick or signal.
//!
//! A fatal pool error stops the pool and exits with a non-zero status.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use drove_core::{Config, Dispatcher, PoolError, ProcessSpawner, WorkerFactory, WorkerPool};
use nix::libc;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// drove daemon - keeps a pool of worker processes running
#[derive(Parser, Debug)]
#[command(name = "drove-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "drove.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Override the interval between convergence passes (e.g. "500ms")
    #[arg(long, value_parser = humantime::parse_duration)]
    check_delay: Option<Duration>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let settings = config
        .pool
        .to_settings()
        .context("invalid pool configuration")?;
    let check_delay = args.check_delay.unwrap_or(config.daemon.check_delay);

    info!(
        pool = %settings.name,
        num_flies = settings.num_flies,
        ?check_delay,
        "starting drove daemon"
    );

    let pool = WorkerPool::new(settings, ProcessSpawner::new(config.daemon.stop_timeout));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create Tokio runtime")?;
    runtime.block_on(run(pool, check_delay))
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .context("failed to open log file")?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

fn register(kind: SignalKind, name: &str) -> Result<Signal> {
    signal(kind).with_context(|| format!("failed to register {name} handler"))
}

/// Run a dispatcher command on behalf of a signal and log its reply.
fn relay<F: WorkerFactory>(
    dispatcher: &Dispatcher<F>,
    pool: &mut WorkerPool<F>,
    command: &str,
) -> Result<String, PoolError> {
    let reply = dispatcher.dispatch(pool, command, &[])?;
    if reply.starts_with("error: ") {
        warn!(command, %reply, "signal command failed");
    } else {
        info!(command, %reply, "signal command handled");
    }
    Ok(reply)
}

async fn run(mut pool: WorkerPool<ProcessSpawner>, check_delay: Duration) -> Result<()> {
    let dispatcher = Dispatcher::new();

    let mut sigterm = register(SignalKind::terminate(), "SIGTERM")?;
    let mut sigint = register(SignalKind::interrupt(), "SIGINT")?;
    let mut sighup = register(SignalKind::hangup(), "SIGHUP")?;
    let mut sigttin = register(SignalKind::from_raw(libc::SIGTTIN), "SIGTTIN")?;
    let mut sigttou = register(SignalKind::from_raw(libc::SIGTTOU), "SIGTTOU")?;

    let mut interval = tokio::time::interval(check_delay);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let outcome = tokio::select! {
            _ = interval.tick() => pool.reap_and_manage(),
            _ = sighup.recv() => relay(&dispatcher, &mut pool, "reload").map(drop),
            _ = sigttin.recv() => relay(&dispatcher, &mut pool, "ttin").map(drop),
            _ = sigttou.recv() => relay(&dispatcher, &mut pool, "ttou").map(drop),
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                break;
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
                break;
            }
        };

        if let Err(e) = outcome {
            error!(pool = %pool.name(), error = %e, "fatal pool error, shutting down");
            // Not `stop`: it is a no-op if the failure came from inside it.
            for (worker_id, stop_err) in pool.shutdown() {
                error!(worker_id, error = %stop_err, "failed to stop worker after fatal error");
            }
            return Err(e).context("pool convergence failed");
        }
    }

    let failures = pool.shutdown();
    for (worker_id, stop_err) in &failures {
        error!(worker_id, error = %stop_err, "failed to stop worker");
    }
    if !failures.is_empty() {
        anyhow::bail!("{} worker(s) failed to stop", failures.len());
    }
    info!(pool = %pool.name(), "drove daemon exiting");
    Ok(())
}
