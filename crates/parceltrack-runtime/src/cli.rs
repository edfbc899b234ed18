//! CLI definition using clap derive.

use std::time::Duration;

use clap::{Parser, Subcommand};
use parceltrack_core::TrackingNumber;
use parceltrack_runtime::SyncConfig;
use parceltrack_runtime::config::{DEFAULT_API_URL, DEFAULT_CHANNEL_URL};

#[derive(Parser)]
#[command(name = "parceltrack", about = "Real-time shipment tracking client")]
pub struct Cli {
    /// Shipment Query Service base URL
    #[arg(long, global = true, env = "PARCELTRACK_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Push channel URL (ws:// or wss://)
    #[arg(long, global = true, env = "PARCELTRACK_CHANNEL_URL", default_value = DEFAULT_CHANNEL_URL)]
    pub channel_url: String,

    /// Color output: auto, always, never
    #[arg(long, global = true, default_value = "auto")]
    pub color: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Follow shipments live until Ctrl-C
    Watch(WatchOpts),
    /// One-shot snapshot with route progress
    Show(ShowOpts),
    /// Status history, oldest first
    History(ShowOpts),
    /// Check whether a tracking number exists
    Validate(ShowOpts),
}

#[derive(clap::Args)]
pub struct WatchOpts {
    /// Tracking numbers to follow
    #[arg(required = true, value_parser = parse_tracking_number)]
    pub tracking_numbers: Vec<TrackingNumber>,

    /// Fallback poll interval in seconds
    #[arg(long, default_value = "30")]
    pub poll_interval: u64,

    /// Give up on the push channel after this many consecutive failures
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

#[derive(clap::Args)]
pub struct ShowOpts {
    #[arg(value_parser = parse_tracking_number)]
    pub tracking_number: TrackingNumber,
}

fn parse_tracking_number(raw: &str) -> Result<TrackingNumber, String> {
    TrackingNumber::parse(raw).map_err(|e| e.to_string())
}

impl Cli {
    pub fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::with_urls(&self.api_url, &self.channel_url);
        if let Command::Watch(opts) = &self.command {
            config.poll_interval = Duration::from_secs(opts.poll_interval.max(1));
            config.backoff.max_attempts = opts.max_attempts;
        }
        config
    }
}
