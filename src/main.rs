//! GPS tracker simulator CLI
//!
//! Opens one TCP session per simulated tracker and streams location reports
//! until interrupted.
//!
//! ```bash
//! gps-tracker-sim --server 10.0.0.5:5027 -n 50 --interval-ms 1000
//! gps-tracker-sim --config fleet.json --seed 42
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use gps_tracker_simulator::{config::SimulatorConfig, gps_simulator::fleet::Fleet, logger};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gps-tracker-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server address (host:port)
    #[arg(short, long)]
    server: Option<String>,

    /// Number of simulated devices
    #[arg(short = 'n', long)]
    devices: Option<usize>,

    /// Delay between a record ACK and the next report, in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Uniform +/- jitter added to the report interval, in milliseconds
    #[arg(long)]
    jitter_ms: Option<u64>,

    /// Delay before reconnecting after a failed session, in milliseconds
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,

    /// Timeout for connect, read and write. Unset means no timeout.
    #[arg(long)]
    io_timeout_ms: Option<u64>,

    /// Seed for identities and positions
    #[arg(long)]
    seed: Option<u64>,

    /// Append log lines to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Do not log to stdout
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn apply(self, config: &mut SimulatorConfig) {
        if let Some(server) = self.server {
            config.server_address = server;
        }
        if let Some(devices) = self.devices {
            config.devices = devices;
        }
        if let Some(interval) = self.interval_ms {
            config.report_interval_ms = interval;
        }
        if let Some(jitter) = self.jitter_ms {
            config.report_jitter_ms = jitter;
        }
        if let Some(delay) = self.reconnect_delay_ms {
            config.reconnect_delay_ms = delay;
        }
        if self.io_timeout_ms.is_some() {
            config.io_timeout_ms = self.io_timeout_ms;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.log_file.is_some() {
            config.log_file = self.log_file;
        }
        if self.quiet {
            config.log_stdout = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimulatorConfig::from_file(path)?,
        None => SimulatorConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    logger::init(config.log_file.as_deref(), config.log_stdout, &config.log_filter)?;

    // the fleet also stops if every sender is dropped, so main keeps one
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let handler_tx = Arc::clone(&shutdown_tx);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = handler_tx.send(true);
    }) {
        warn!(error = %e, "failed to install ctrl-c handler, stop the process externally");
    }

    let fleet = Fleet::from_config(&config)?;
    info!(
        server = %config.server_address,
        devices = config.devices,
        interval_ms = config.report_interval_ms,
        "simulating trackers"
    );

    let stats = fleet.run(shutdown_rx).await;
    let reports: u64 = stats.iter().map(|s| s.reports_sent).sum();
    info!(devices = stats.len(), reports, "simulation stopped");
    drop(shutdown_tx);
    Ok(())
}
