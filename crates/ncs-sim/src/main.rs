//! NCS Simulator - Main Entry Point

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use ncs_sim::{init_logging, run, SimConfig};
use sensor_protocol::SensorKind;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ncs-sim", version, about = "Run the NCS sensor core against a simulated hub")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds to run; 0 runs until Ctrl-C
    #[arg(short, long)]
    duration: Option<u64>,

    /// Sensor kinds the hub should not expose (gyro, accel, gravity, mag, ...)
    #[arg(long, value_delimiter = ',')]
    absent: Vec<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;

    info!("=== NCS Simulator v{} ===", env!("CARGO_PKG_VERSION"));

    let mut config = SimConfig::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(duration) = args.duration {
        config.duration_secs = duration;
    }
    let absent = args
        .absent
        .iter()
        .map(|name| {
            SensorKind::from_datatype(name).with_context(|| format!("unknown sensor kind {}", name))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let reports = run(config, &absent).await?;
    for report in &reports {
        info!(
            "{} @ {} Hz: {} sync reads ({} failed), {} async completed ({} failed), newest sample {:?}",
            report.kind,
            report.rate_hz,
            report.sync_reads,
            report.sync_errors,
            report.async_completed,
            report.async_failed,
            report.last_timestamp
        );
    }
    info!("Metrics at shutdown:\n{}", metrics.render());
    Ok(())
}
