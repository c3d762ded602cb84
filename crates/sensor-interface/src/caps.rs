//! Sensor capabilities reported by the hub

use sensor_protocol::{Attribute, SensorKind};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Maximum entries kept per attribute list
pub const MAX_CAPS_ENTRIES: usize = 20;

/// Rates, resolutions and ranges of one sensor kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorCaps {
    pub rates: Vec<f32>,
    pub resolutions: Vec<f32>,
    pub ranges: Vec<(f32, f32)>,
}

impl SensorCaps {
    pub(crate) fn from_attributes(kind: SensorKind, attributes: &[Attribute]) -> Self {
        let mut caps = SensorCaps::default();
        for attribute in attributes {
            match attribute {
                Attribute::Rates(rates) => caps.rates = capped(kind, "rates", rates),
                Attribute::Resolutions(res) => caps.resolutions = capped(kind, "resolutions", res),
                Attribute::Ranges(ranges) => caps.ranges = capped(kind, "ranges", ranges),
            }
        }
        caps
    }

    /// Highest advertised rate
    pub fn max_rate(&self) -> Option<f32> {
        self.rates.iter().copied().reduce(f32::max)
    }
}

fn capped<T: Clone>(kind: SensorKind, what: &str, values: &[T]) -> Vec<T> {
    if values.len() > MAX_CAPS_ENTRIES {
        warn!(
            "{} reported {} {}, keeping first {}",
            kind,
            values.len(),
            what,
            MAX_CAPS_ENTRIES
        );
    }
    values.iter().take(MAX_CAPS_ENTRIES).cloned().collect()
}
