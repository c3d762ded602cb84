//! Sensor interface configuration

use sensor_protocol::{KindSet, TIMER_FREQUENCY_HZ};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables of the sensor interface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceConfig {
    /// Bounded wait for each discovery or attribute reply (ms)
    pub probe_timeout_ms: u64,
    /// Silence after which a monitored connection is reset (ms)
    pub callbacks_timeout_ms: u64,
    /// Seconds of samples each ring holds
    pub buffered_window_secs: u32,
    /// Connection table size
    pub max_connections: usize,
    /// Pending async requests allowed per connection
    pub async_queue_capacity: usize,
    /// Sample accessors allowed outstanding at once
    pub accessor_pool_len: usize,
    /// Hub timer frequency used for tick periods
    pub timer_frequency_hz: u64,
    /// Kinds whose connections take part in health monitoring
    pub monitored: KindSet,
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 3000,
            callbacks_timeout_ms: 300,
            buffered_window_secs: ring_buffer::DEFAULT_WINDOW_SECS,
            max_connections: 8,
            async_queue_capacity: 30,
            accessor_pool_len: 10,
            timer_frequency_hz: TIMER_FREQUENCY_HZ,
            monitored: KindSet::streaming(),
        }
    }
}

impl InterfaceConfig {
    /// Short timeouts for tests and simulation
    pub fn fast_test() -> Self {
        Self {
            probe_timeout_ms: 100,
            callbacks_timeout_ms: 50,
            ..Default::default()
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn callbacks_timeout(&self) -> Duration {
        Duration::from_millis(self.callbacks_timeout_ms)
    }
}
