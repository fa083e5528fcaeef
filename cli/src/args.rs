//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for agent-planner
#[derive(Parser, Debug)]
#[command(name = "agent-planner")]
#[command(author, version, about = "Resilient LLM planning for autonomous agents")]
#[command(long_about = r#"
Runs a fixed-tick control loop that turns natural-language goals into task
plans for one or more agents. Planning requests go through a rate limiter,
a circuit breaker, an exact response cache and a semantic plan cache; when
the remote service is slow or down, agents receive a keyword-based fallback
plan instead of stalling.

Goals are handed out round-robin to the agents. Each agent "executes" its
plan for a few ticks, then takes the next goal.

Configuration files are loaded from (in priority order):
1. PLANNER_<SECTION>__<KEY>   Environment variables
2. --config <path>            Explicit config file
3. ./planner.toml             Project-level config
4. ~/.config/agent-planner/config.toml   Global config

Example:
  agent-planner --offline "mine 8 stone then craft a furnace" "build a small shelter"
  agent-planner --offline --outage-ticks 50 --metrics "gather wood" "gather some wood"
  agent-planner --agents 3 --busy-policy queue "follow the player" "build a bridge"
"#)]
pub struct Cli {
    /// Goals to plan, assigned round-robin to agents
    pub goals: Vec<String>,

    /// Number of simulated agents
    #[arg(short, long, default_value_t = 1, value_name = "N")]
    pub agents: usize,

    /// Use the in-process loopback transport instead of HTTP
    #[arg(long)]
    pub offline: bool,

    /// Simulate a remote outage for the first N ticks (loopback only)
    #[arg(long, value_name = "N", requires = "offline")]
    pub outage_ticks: Option<u64>,

    /// Override the busy policy: reject, queue or preempt
    #[arg(long, value_name = "POLICY")]
    pub busy_policy: Option<String>,

    /// Control loop period in milliseconds
    #[arg(long, default_value_t = 50, value_name = "MS")]
    pub tick_ms: u64,

    /// Ticks an agent spends executing a plan
    #[arg(long, default_value_t = 4, value_name = "N")]
    pub exec_ticks: u32,

    /// Stop after this many ticks even if goals remain
    #[arg(long, default_value_t = 2000, value_name = "N")]
    pub max_ticks: u64,

    /// Write agent events as JSONL to this file
    #[arg(long, value_name = "PATH")]
    pub event_log: Option<PathBuf>,

    /// Also write diagnostics to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Print a metrics snapshot as JSON when done
    #[arg(long)]
    pub metrics: bool,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Show configuration sources and the effective configuration, then exit
    #[arg(long)]
    pub show_config: bool,
}
