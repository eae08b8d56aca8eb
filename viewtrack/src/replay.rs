//! `viewtrack replay`: drive a tracker over a recorded navigation log

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use viewtrack_core::transport::BeaconSummary;
use viewtrack_core::{
    Beacon, ChannelBeacon, Config, DeliveryStats, Fetcher, HostEnvironment, HttpFetcher,
    Navigation, NavigationOutcome, Tracker,
};

#[derive(Args)]
pub struct ReplayArgs {
    /// Navigation log, one JSON object per line
    file: PathBuf,

    /// Referrer of the simulated page load
    #[arg(long)]
    referrer: Option<String>,

    /// Pause between navigations in milliseconds
    #[arg(long, default_value = "0")]
    interval_ms: u64,

    /// Pretend no beacon is available (deliver each view over fetch)
    #[arg(long)]
    no_beacon: bool,

    /// Print request bodies instead of sending them
    #[arg(long)]
    dry_run: bool,
}

/// Writes every delivery to stdout instead of the network
struct PrintTransport;

impl Beacon for PrintTransport {
    fn send(&self, url: &str, body: String) -> bool {
        println!("beacon {} {}", url, body);
        true
    }
}

#[async_trait]
impl Fetcher for PrintTransport {
    async fn post(&self, url: &str, body: String) -> viewtrack_core::Result<()> {
        println!("fetch {} {}", url, body);
        Ok(())
    }
}

pub fn run(config: &Config, args: &ReplayArgs) -> Result<()> {
    let navigations = read_navigations(&args.file)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;

    let (stats, summary) = runtime.block_on(replay(config, args, navigations))?;

    println!();
    println!("Stats:");
    println!("  Queued:        {}", stats.views_queued);
    println!("  Delivered:     {}", stats.views_delivered);
    println!("  Skipped:       {}", stats.views_skipped);
    println!("  Duplicates:    {}", stats.duplicates);
    println!("  Beacon Calls:  {}", stats.beacon_calls);
    println!("  Fetch Calls:   {}", stats.fetch_calls);
    println!("  Failures:      {}", stats.failures);
    if let Some(summary) = summary {
        println!("  Beacon Sent:   {}", summary.sent);
        println!("  Beacon Failed: {}", summary.failed);
    }

    Ok(())
}

async fn replay(
    config: &Config,
    args: &ReplayArgs,
    navigations: Vec<Navigation>,
) -> Result<(DeliveryStats, Option<BeaconSummary>)> {
    let tracker_config = config.tracker.clone();
    let use_beacon = tracker_config.beacon && !args.no_beacon;

    let mut env = HostEnvironment::new(&tracker_config);
    if let Some(referrer) = &args.referrer {
        env = env.with_referrer(referrer.clone());
    }

    let mut channel = None;
    let fetcher: Arc<dyn Fetcher> = if args.dry_run {
        if use_beacon {
            env = env.with_beacon(Arc::new(PrintTransport));
        }
        Arc::new(PrintTransport)
    } else {
        if use_beacon {
            let (beacon, worker) =
                ChannelBeacon::spawn(&tracker_config.hostname, tracker_config.timeout())
                    .context("failed to start beacon worker")?;
            env = env.with_beacon(beacon.clone());
            channel = Some((beacon, worker));
        }
        Arc::new(
            HttpFetcher::new(&tracker_config.hostname, tracker_config.timeout())
                .context("failed to create HTTP client")?,
        )
    };

    let tracker = Tracker::new(tracker_config, Arc::new(env), fetcher)
        .context("failed to create tracker")?;

    tracing::info!(navigations = navigations.len(), beacon = use_beacon, "Replaying navigations");

    for nav in &navigations {
        let outcome = tracker.navigate(nav).await;
        println!("{:<32} {}", nav.as_path, describe(outcome));
        if args.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
    }

    tracker.unload();
    let stats = tracker.stats();

    let summary = match channel {
        Some((beacon, worker)) => {
            beacon.close();
            Some(worker.join().await)
        }
        None => None,
    };

    Ok((stats, summary))
}

fn describe(outcome: NavigationOutcome) -> String {
    match outcome {
        NavigationOutcome::NotInteractive => "not interactive".to_string(),
        NavigationOutcome::Inactive => "inactive".to_string(),
        NavigationOutcome::Duplicate => "duplicate".to_string(),
        NavigationOutcome::Skipped(reason) => format!("skipped ({})", reason),
        NavigationOutcome::Queued { pending } => format!("queued ({} pending)", pending),
        NavigationOutcome::Delivered => "delivered".to_string(),
    }
}

fn read_navigations(path: &Path) -> Result<Vec<Navigation>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open navigation log {}", path.display()))?;

    let mut navigations = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.context("failed to read navigation log")?;
        if line.trim().is_empty() {
            continue;
        }
        let nav: Navigation = serde_json::from_str(&line)
            .with_context(|| format!("invalid navigation on line {}", idx + 1))?;
        navigations.push(nav);
    }
    Ok(navigations)
}
