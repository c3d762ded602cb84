//! Simulator configuration
//!
//! Read from an optional TOML file, then `NCS__` environment overrides
//! (`NCS__DURATION_SECS=10`, `NCS__SERVICE__MAX_CLIENTS=4`).

use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, Environment, File, FileFormat};
use ncs_service::ServiceConfig;
use sensor_protocol::SensorKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One simulated consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub sensor: SensorKind,
    pub rate_hz: f32,
    /// Span of each read (ms)
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default)]
    pub need_exact_rate: bool,
}

fn default_window_ms() -> u64 {
    200
}

impl ConsumerConfig {
    pub fn new(sensor: SensorKind, rate_hz: f32) -> Self {
        Self {
            sensor,
            rate_hz,
            window_ms: default_window_ms(),
            need_exact_rate: false,
        }
    }

    /// Samples a window spans at the requested rate
    pub fn window_samples(&self) -> usize {
        ((self.rate_hz as f64 * self.window_ms as f64 / 1000.0).ceil() as usize).max(1)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub service: ServiceConfig,
    pub consumers: Vec<ConsumerConfig>,
    /// Run time; 0 runs until interrupted
    pub duration_secs: u64,
    /// Generator period of the simulated hub (ms)
    pub stream_tick_ms: u64,
    /// Consumer read period (ms)
    pub read_interval_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            consumers: vec![
                ConsumerConfig::new(SensorKind::Gyro, 10.0),
                ConsumerConfig::new(SensorKind::Gyro, 20.0),
                ConsumerConfig::new(SensorKind::Accelerometer, 50.0),
            ],
            duration_secs: 5,
            stream_tick_ms: 5,
            read_interval_ms: 250,
        }
    }
}

impl SimConfig {
    /// Load from `path` (if any) plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        Self::build(builder)
    }

    /// Load from TOML text plus environment overrides
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Self::build(Config::builder().add_source(File::from_str(text, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder
            .add_source(Environment::with_prefix("NCS").prefix_separator("__").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn stream_tick(&self) -> Duration {
        Duration::from_millis(self.stream_tick_ms)
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms)
    }

    pub fn duration(&self) -> Option<Duration> {
        (self.duration_secs > 0).then(|| Duration::from_secs(self.duration_secs))
    }
}
