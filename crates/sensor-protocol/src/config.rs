//! Per-client sensor configuration

use crate::error::{NcsError, NcsResult};
use crate::kind::SensorKind;
use serde::{Deserialize, Serialize};

/// Hub operating mode requested for a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMode {
    /// Periodic streaming at the sampling rate
    #[default]
    Streaming,
    /// Samples batched by the hub and delivered every report period
    Batched,
}

/// Configuration a consumer asks for when registering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Sensor kind to stream
    pub sensor_type: SensorKind,
    /// Operating mode
    #[serde(default)]
    pub operation_mode: OperationMode,
    /// Sampling rate in Hz
    pub sampling_rate: f32,
    /// Report period in microseconds (0 = report every sample)
    #[serde(default)]
    pub report_rate_us: u32,
    /// Consumer cannot tolerate a higher negotiated rate
    #[serde(default)]
    pub need_exact_rate: bool,
}

impl SensorConfig {
    /// Streaming config at the given rate
    pub fn new(sensor_type: SensorKind, sampling_rate: f32) -> Self {
        Self {
            sensor_type,
            operation_mode: OperationMode::Streaming,
            sampling_rate,
            report_rate_us: 0,
            need_exact_rate: false,
        }
    }

    /// Set the batching report period
    pub fn with_report_rate(mut self, report_rate_us: u32) -> Self {
        self.report_rate_us = report_rate_us;
        self.operation_mode = OperationMode::Batched;
        self
    }

    /// Reject configs that can never produce a stream
    pub fn validate(&self) -> NcsResult<()> {
        if !self.sampling_rate.is_finite() || self.sampling_rate <= 0.0 {
            return Err(NcsError::InvalidArgument(format!(
                "sampling rate {} for {}",
                self.sampling_rate, self.sensor_type
            )));
        }
        if self.sensor_type.is_calibration_source() {
            return Err(NcsError::InvalidArgument(format!(
                "{} is a calibration source",
                self.sensor_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(SensorConfig::new(SensorKind::Gyro, 100.0).validate().is_ok());
        assert!(SensorConfig::new(SensorKind::Gyro, 0.0).validate().is_err());
        assert!(SensorConfig::new(SensorKind::Gyro, f32::NAN).validate().is_err());
        assert!(SensorConfig::new(SensorKind::MagCal, 10.0).validate().is_err());
    }

    #[test]
    fn test_batched_builder() {
        let config = SensorConfig::new(SensorKind::Accelerometer, 50.0).with_report_rate(20_000);
        assert_eq!(config.operation_mode, OperationMode::Batched);
        assert_eq!(config.report_rate_us, 20_000);
    }
}
