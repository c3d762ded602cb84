//! Service configuration

use sensor_interface::InterfaceConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the sensor service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Sensor interface tunables
    pub interface: InterfaceConfig,
    /// Maximum registered clients (default: 16)
    pub max_clients: usize,
    /// Wait for the poll thread to acknowledge a flush (ms)
    pub flush_timeout_ms: u64,
    /// Poll thread wait; expiry resets every monitored connection (ms)
    pub poll_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let interface = InterfaceConfig::default();
        Self {
            poll_timeout_ms: interface.callbacks_timeout_ms,
            interface,
            max_clients: 16,
            flush_timeout_ms: 1000,
        }
    }
}

impl ServiceConfig {
    /// Shortened timeouts for tests and simulation
    pub fn fast_test() -> Self {
        let interface = InterfaceConfig::fast_test();
        Self {
            poll_timeout_ms: interface.callbacks_timeout_ms,
            interface,
            max_clients: 16,
            flush_timeout_ms: 200,
        }
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
