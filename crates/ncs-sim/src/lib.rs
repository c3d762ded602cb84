//! NCS Simulator
//!
//! Drives the sensor service with a simulated hub: registers the configured
//! consumers, lets them read synchronously and asynchronously while the
//! hub streams, and reports what each consumer observed.

mod config;

pub use config::{ConsumerConfig, SimConfig};

use anyhow::Context;
use ncs_service::{NcsService, SensorClient};
use sensor_protocol::{
    Sample, SensorConfig, SensorKind, SimulatedHub, TransportFactory, TIMER_FREQUENCY_HZ,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging; `RUST_LOG` wins over `default_filter`
pub fn init_logging(default_filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("setting tracing subscriber")
}

/// What one consumer saw during the run
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerReport {
    pub kind: SensorKind,
    pub rate_hz: f32,
    pub sync_reads: u64,
    pub sync_errors: u64,
    pub async_completed: u64,
    pub async_failed: u64,
    /// Newest timestamp returned by a synchronous read
    pub last_timestamp: Option<u64>,
}

impl ConsumerReport {
    fn new(kind: SensorKind, rate_hz: f32) -> Self {
        Self {
            kind,
            rate_hz,
            sync_reads: 0,
            sync_errors: 0,
            async_completed: 0,
            async_failed: 0,
            last_timestamp: None,
        }
    }
}

async fn run_consumer(
    client: SensorClient,
    hub: SimulatedHub,
    consumer: ConsumerConfig,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> ConsumerReport {
    let mut report = ConsumerReport::new(client.kind(), consumer.rate_hz);
    let window_ticks = consumer.window_ms * TIMER_FREQUENCY_HZ / 1000;
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        match client
            .get_last_n_samples(consumer.window_samples())
            .and_then(|window| window.samples())
        {
            Ok(samples) => {
                report.sync_reads += 1;
                if let Some(newest) = samples.last().map(Sample::timestamp) {
                    report.last_timestamp = Some(newest);
                }
            }
            Err(e) => {
                report.sync_errors += 1;
                debug!("{} client {} read failed: {}", client.kind(), client.id(), e);
            }
        }

        let start = hub.now_ticks();
        let waiter = match client.read_async(start, start + window_ticks) {
            Ok(waiter) => waiter,
            Err(e) => {
                report.async_failed += 1;
                debug!("{} client {} async read rejected: {}", client.kind(), client.id(), e);
                continue;
            }
        };
        let deadline = consumer.window() + interval;
        match tokio::time::timeout(deadline, waiter.wait()).await {
            Ok(Ok(())) => report.async_completed += 1,
            Ok(Err(e)) => {
                report.async_failed += 1;
                debug!("{} client {} async read failed: {}", client.kind(), client.id(), e);
            }
            Err(_) => {
                report.async_failed += 1;
                warn!("{} client {} async read not completed within {:?}", client.kind(), client.id(), deadline);
            }
        }
    }

    match tokio::task::spawn_blocking(move || client.unregister()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Unregistering consumer failed: {}", e),
        Err(e) => warn!("Unregister task failed: {}", e),
    }
    report
}

async fn wait_for_end(duration: Option<Duration>) -> anyhow::Result<()> {
    match duration {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => info!("Run time of {:?} elapsed", duration),
                signal = tokio::signal::ctrl_c() => {
                    signal.context("waiting for Ctrl-C")?;
                    info!("Interrupted");
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            info!("Interrupted");
        }
    }
    Ok(())
}

/// Run the service against a fresh simulated hub
pub async fn run(config: SimConfig, absent: &[SensorKind]) -> anyhow::Result<Vec<ConsumerReport>> {
    let hub = SimulatedHub::new();
    for kind in absent {
        hub.set_absent(*kind, true);
    }

    let factory: Arc<dyn TransportFactory> = Arc::new(hub.clone());
    let service_config = config.service.clone();
    let service = Arc::new(
        tokio::task::spawn_blocking(move || NcsService::initialize(factory, service_config))
            .await?
            .context("initializing sensor service")?,
    );
    let stream = hub.start_streaming(config.stream_tick());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();
    for consumer in &config.consumers {
        let request = SensorConfig {
            need_exact_rate: consumer.need_exact_rate,
            ..SensorConfig::new(consumer.sensor, consumer.rate_hz)
        };
        let client = match service.register_service(&request) {
            Ok(client) => client,
            Err(e) => {
                warn!("Skipping {} consumer at {} Hz: {}", consumer.sensor, consumer.rate_hz, e);
                continue;
            }
        };
        info!(
            "{} consumer {} reading {} samples every {:?}",
            consumer.sensor,
            client.id(),
            consumer.window_samples(),
            config.read_interval()
        );
        tasks.push(tokio::spawn(run_consumer(
            client,
            hub.clone(),
            consumer.clone(),
            config.read_interval(),
            shutdown_rx.clone(),
        )));
    }

    wait_for_end(config.duration()).await?;

    for info in service.interface().connections() {
        info!(
            "Connection {}: {} at {} Hz, {} clients, {}/{} buffered, {:?}",
            info.slot, info.kind, info.sampling_rate, info.clients, info.buffered, info.capacity, info.state
        );
    }

    shutdown_tx.send(true).context("signalling consumers")?;
    let mut reports = Vec::with_capacity(tasks.len());
    for task in tasks {
        reports.push(task.await?);
    }

    tokio::task::spawn_blocking(move || {
        stream.stop();
        service.stop();
    })
    .await?;
    Ok(reports)
}
