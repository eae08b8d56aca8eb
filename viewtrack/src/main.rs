//! viewtrack - CLI for the page-view tracker
//!
//! This tool provides commands for:
//! - Checking the tracker configuration
//! - Replaying a navigation log through a tracker against the collection endpoint
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/viewtrack/config.toml (~/.config/viewtrack/config.toml)
//! - Logs: $XDG_STATE_HOME/viewtrack/viewtrack.log (~/.local/state/viewtrack/viewtrack.log)

mod replay;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use viewtrack_core::Config;

#[derive(Parser)]
#[command(name = "viewtrack")]
#[command(about = "Record page views and deliver them to a collection endpoint")]
#[command(version)]
struct Args {
    /// Verbose output (enables file logging)
    #[arg(short, long)]
    verbose: bool,

    /// Config file (default: $XDG_CONFIG_HOME/viewtrack/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Public key, overriding the config file
    #[arg(long)]
    public_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show tracker configuration and status
    Status,

    /// Replay a navigation log (JSON lines of {"route", "asPath"})
    Replay(replay::ReplayArgs),
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path).context("failed to load configuration")?,
        None => Config::load().context("failed to load configuration")?,
    };
    if let Some(public_key) = args.public_key {
        config.tracker.public_key = public_key;
    }

    let _log_guard = if args.verbose {
        Some(viewtrack_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config),
        Command::Replay(replay_args) => replay::run(&config, &replay_args),
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    let tracker = &config.tracker;

    println!("Tracker Configuration");
    println!("=====================");
    println!();
    println!(
        "Public Key:      {}",
        if tracker.is_ready() { "<set>" } else { "<not set>" }
    );
    println!("API Route:       {}", tracker.api_route);
    println!("Hostname:        {}", tracker.hostname);
    println!(
        "Skip Hostnames:  {}",
        if tracker.skip_hostnames.is_empty() {
            "<none>".to_string()
        } else {
            tracker.skip_hostnames.join(", ")
        }
    );
    println!("Delay:           {}ms", tracker.delay_ms);
    println!("Beacon:          {}", tracker.beacon);
    println!("Timeout:         {}s", tracker.timeout_secs);

    println!();
    match tracker.validate() {
        Ok(()) => println!("Status: Ready to track"),
        Err(e) => {
            println!("Status: Not ready ({})", e);
            println!();
            println!("Set a public key in config.toml:");
            println!();
            println!("  [tracker]");
            println!("  public_key = \"pk_live_xxxxxxxxxxxx\"");
        }
    }

    Ok(())
}
