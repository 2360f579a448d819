//! Dry-run driver: runs a campaign against an in-process simulated protocol.
//! No network traffic is generated.

use anyhow::{Context, Result};
use async_trait::async_trait;
use campaign_core::{
    setup_logger, setup_logger_with_file, Campaign, CampaignConfig, CampaignRunner,
    DeduplicationSet, FarmProtocol, NetworkError, Progress, ProgressObserver, WorkItem,
};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use dotenv::dotenv;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML campaign config; defaults are used when omitted
    #[arg(short, long)]
    config: Option<String>,
    /// Override the configured target
    #[arg(short, long)]
    target: Option<u64>,
    /// Probability (0.0-1.0) that a simulated call fails
    #[arg(long, default_value = "0.1")]
    failure_rate: f64,
    /// Simulated per-call latency in milliseconds
    #[arg(long, default_value = "40")]
    latency_ms: u64,
    /// JSON file of keys from a previous run; rewritten on exit
    #[arg(long)]
    dedup_file: Option<String>,
    #[arg(short, long)]
    export_report: Option<String>,
    /// Log to this file only instead of logs/ + console
    #[arg(long)]
    log_file: Option<String>,
}

struct SimulatedProtocol {
    anchor: NaiveDate,
    failure_rate: f64,
    latency: Duration,
    sessions: AtomicU64,
}

impl SimulatedProtocol {
    async fn call(&self, endpoint: &str) -> Result<()> {
        tokio::time::sleep(self.latency).await;
        let roll: f64 = rand::thread_rng().gen();
        if roll < self.failure_rate {
            let status_code = if roll < self.failure_rate / 2.0 { 429 } else { 503 };
            return Err(NetworkError::HttpError {
                status_code,
                endpoint: endpoint.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl FarmProtocol for SimulatedProtocol {
    type Baseline = NaiveDate;
    type Handle = u64;
    type Ack = i64;

    async fn fetch_baseline(&self) -> Result<NaiveDate> {
        self.call("baseline").await?;
        Ok(self.anchor)
    }

    fn anchor(&self, baseline: &NaiveDate) -> Option<NaiveDate> {
        Some(*baseline)
    }

    async fn acquire(&self, _item: &WorkItem) -> Result<u64> {
        self.call("acquire").await?;
        Ok(self.sessions.fetch_add(1, Ordering::SeqCst))
    }

    async fn finalize(&self, _handle: &u64, item: &WorkItem) -> Result<i64> {
        self.call("finalize").await?;
        Ok(item.start_timestamp())
    }
}

struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_progress(&self, progress: &Progress) {
        tracing::debug!(
            "processed {}/{} gained {}",
            progress.processed,
            progress.target,
            progress.gained
        );
    }
}

fn load_dedup(path: &str) -> Result<DeduplicationSet> {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).context("Failed to parse dedup file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DeduplicationSet::new()),
        Err(e) => Err(e).context(format!("Failed to read {}", path)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    let _log_guard = match &args.log_file {
        Some(path) => Some(setup_logger_with_file(path)?),
        None => setup_logger(),
    };

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from: {}", path);
            CampaignConfig::from_path(path)?
        }
        None => CampaignConfig::default(),
    };
    if let Some(target) = args.target {
        config.target = target;
    }
    config.validate()?;

    let seen = match &args.dedup_file {
        Some(path) => load_dedup(path)?,
        None => DeduplicationSet::new(),
    };
    info!("Loaded {} previously used keys", seen.len());

    let protocol = SimulatedProtocol {
        anchor: Utc::now().date_naive(),
        failure_rate: args.failure_rate.clamp(0.0, 1.0),
        latency: Duration::from_millis(args.latency_ms),
        sessions: AtomicU64::new(0),
    };

    let mut campaign = Campaign::new(config, protocol, seen).with_observer(Arc::new(LogObserver));
    let report = CampaignRunner::run_until_ctrl_c(&mut campaign).await;

    if let Some(path) = &args.export_report {
        if let Err(e) = report.export_to_file(path).await {
            error!("Failed to export report to {}: {}", path, e);
        }
    }

    if let Some(path) = &args.dedup_file {
        let json = serde_json::to_string_pretty(campaign.dedup_set())?;
        tokio::fs::write(path, json)
            .await
            .context(format!("Failed to write {}", path))?;
    }

    println!("{}", report.to_compact_json());
    Ok(())
}
