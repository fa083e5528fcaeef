//! CLI entrypoint for agent-planner
//!
//! This is the main binary that wires together all layers using
//! dependency injection, then runs the fixed-tick control loop.

mod args;
mod simulation;

use anyhow::{Context, Result, bail};
use args::Cli;
use clap::Parser;
use planner_application::{
    AgentEventObserver, PlanningHub, PlanningNotification, PlanningServices, PlanningTransport,
    WorkerPool,
};
use planner_domain::PlanningResult;
use planner_infrastructure::{
    ConfigLoader, FileConfig, JsonlEventLog, LoopbackTransport, TransportKind, build_transport,
};
use simulation::Simulation;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const CLEANUP_EVERY_TICKS: u64 = 200;
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut file_config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_deref()).context("Failed to load configuration")?
    };
    if cli.offline {
        file_config.transport.kind = TransportKind::Loopback;
    }
    if let Some(policy) = &cli.busy_policy {
        file_config.coordinator.busy_policy = policy.clone();
    }

    if cli.show_config {
        show_config(&cli, &file_config)?;
        return Ok(());
    }

    let log_file = cli
        .log_file
        .clone()
        .or_else(|| file_config.logging.log_file.as_ref().map(Into::into));
    let _log_guard = init_logging(cli.verbose, log_file.as_deref())?;

    if cli.goals.is_empty() {
        bail!("At least one goal is required. See --help.");
    }

    let planner_config = file_config
        .to_planner_config()
        .context("Invalid configuration")?;

    info!("Starting agent-planner");

    // === Dependency Injection ===
    let (transport, loopback): (Arc<dyn PlanningTransport>, Option<Arc<LoopbackTransport>>) =
        match file_config.transport.kind {
            TransportKind::Loopback => {
                let loopback = Arc::new(LoopbackTransport::new(Duration::from_millis(
                    file_config.transport.loopback_latency_ms,
                )));
                (loopback.clone(), Some(loopback))
            }
            TransportKind::Http => (build_transport(&file_config.transport)?, None),
        };

    let pool = Arc::new(WorkerPool::dedicated(
        planner_config.coordinator.worker_threads,
        planner_config.coordinator.max_concurrent_requests,
    )?);

    let event_log = cli
        .event_log
        .clone()
        .or_else(|| file_config.logging.event_log.as_ref().map(Into::into))
        .and_then(JsonlEventLog::new)
        .map(Arc::new);

    let mut services = PlanningServices::new(transport, planner_config, pool.clone());
    if let Some(log) = &event_log {
        services = services.with_observer(log.clone() as Arc<dyn AgentEventObserver>);
    }
    let hub = Arc::new(PlanningHub::new(Arc::new(services)));

    let mut simulation = Simulation::new(hub.clone(), cli.agents, &cli.goals, cli.exec_ticks);
    println!(
        "Planning {} goal(s) for {} agent(s)",
        cli.goals.len(),
        simulation.agents().len()
    );

    // === Control loop ===
    let period = Duration::from_millis(cli.tick_ms.max(1));
    let started = Instant::now();
    let mut tick: u64 = 0;
    while tick < cli.max_ticks {
        let tick_start = Instant::now();

        if let (Some(loopback), Some(outage)) = (&loopback, cli.outage_ticks) {
            loopback.set_outage(tick < outage);
        }

        for notification in simulation.step() {
            print_notification(tick, &notification);
        }

        if tick > 0 && tick % CLEANUP_EVERY_TICKS == 0 {
            let removed = hub.cleanup_caches();
            if removed > 0 {
                info!(removed, "Cache cleanup");
            }
        }

        if simulation.is_done() {
            break;
        }
        tick += 1;
        if let Some(rest) = period.checked_sub(tick_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    if simulation.is_done() {
        info!(ticks = tick, elapsed = ?started.elapsed(), "All goals planned");
    } else {
        warn!(ticks = tick, "Stopped at --max-ticks with work outstanding");
    }

    let metrics = hub.metrics();
    hub.shutdown();
    pool.shutdown_blocking(SHUTDOWN_TIMEOUT);

    if let Some(log) = &event_log {
        log.record_metrics(&metrics);
    }
    if cli.metrics {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    }

    Ok(())
}

/// Set up stderr diagnostics, plus a plain-text file when `log_file` is set.
///
/// The returned guard must live until exit so buffered file output is flushed.
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"), // -vvv or more
    };

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Could not create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

fn show_config(cli: &Cli, config: &FileConfig) -> Result<()> {
    println!("Configuration sources (in priority order):");
    if cli.no_config {
        println!("  (configuration files disabled by --no-config)");
    } else {
        for source in ConfigLoader::config_sources(cli.config.as_deref()) {
            println!("  {}", source);
        }
    }
    println!();
    println!("Effective configuration:");
    println!("{}", config.to_toml_string()?);
    if let Err(e) = config.to_planner_config() {
        println!("WARNING: {}", e);
    }
    Ok(())
}

fn print_notification(tick: u64, notification: &PlanningNotification) {
    match notification {
        PlanningNotification::Completed { agent_id, result } => {
            println!("[tick {:>4}] {} <- {}", tick, agent_id, describe(result));
        }
        PlanningNotification::Cancelled {
            agent_id,
            request_id,
        } => {
            println!("[tick {:>4}] {} cancelled request {}", tick, agent_id, request_id);
        }
        PlanningNotification::Superseded { agent_id, goal } => {
            println!("[tick {:>4}] {} dropped queued goal '{}'", tick, agent_id, goal);
        }
    }
}

fn describe(result: &PlanningResult) -> String {
    let kinds: Vec<&str> = result.tasks.iter().map(|t| t.kind.as_str()).collect();
    let origin = match result.fallback_reason {
        Some(reason) => format!("fallback ({})", reason),
        None if result.served_from_cache.is_cached() => {
            format!("{} cache", result.served_from_cache)
        }
        None => format!("remote, {} attempt(s)", result.attempts),
    };
    format!(
        "{} [{}] in {}ms",
        kinds.join(" > "),
        origin,
        result.latency.as_millis()
    )
}
