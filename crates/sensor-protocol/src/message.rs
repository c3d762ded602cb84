//! Sensor Hub Wire Messages
//!
//! Requests flow from the core to the hub, events flow back through the
//! transport callback. Both directions are postcard-encoded byte messages.

use crate::error::{NcsError, NcsResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest request the hub accepts
pub const MAX_REQUEST_LEN: usize = 1000;

/// Unique identifier of a hub sensor source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorUid {
    pub high: u64,
    pub low: u64,
}

impl SensorUid {
    pub const fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }
}

impl fmt::Display for SensorUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.high, self.low)
    }
}

/// Requests sent to the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Discover sources for a datatype
    Lookup { datatype: String },
    /// Ask for rate/resolution/range attributes
    Attributes { suid: SensorUid },
    /// Start or re-rate a stream
    Config {
        suid: SensorUid,
        sample_rate: f32,
        report_period_us: u32,
    },
    /// Subscribe to on-change calibration events
    Calibration { suid: SensorUid },
    /// Stop a stream
    Disable { suid: SensorUid },
}

impl Request {
    /// Encode for the transport, enforcing [`MAX_REQUEST_LEN`]
    pub fn encode(&self) -> NcsResult<Vec<u8>> {
        let bytes = postcard::to_allocvec(self)?;
        if bytes.len() > MAX_REQUEST_LEN {
            return Err(NcsError::Codec(format!(
                "request of {} bytes exceeds {}",
                bytes.len(),
                MAX_REQUEST_LEN
            )));
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> NcsResult<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

/// Accuracy status attached to samples and calibration events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleStatus {
    Unreliable,
    AccuracyLow,
    AccuracyMedium,
    #[default]
    AccuracyHigh,
}

/// One attribute reported by a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attribute {
    /// Supported sample rates, Hz
    Rates(Vec<f32>),
    /// Supported resolutions
    Resolutions(Vec<f32>),
    /// Supported (min, max) ranges
    Ranges(Vec<(f32, f32)>),
}

/// Single event inside an [`EventMessage`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    LookupResult {
        datatype: String,
        suids: Vec<SensorUid>,
    },
    Error {
        code: i32,
    },
    /// Effective configuration after a config request
    PhysicalConfig {
        sample_rate: f32,
    },
    Sample {
        timestamp: u64,
        data: Vec<f32>,
        status: SampleStatus,
    },
    Attributes(Vec<Attribute>),
    Calibration {
        bias: [f32; 3],
        status: SampleStatus,
    },
    Flush,
}

/// Payload delivered through the transport callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Source the events originate from
    pub suid: SensorUid,
    pub events: Vec<Event>,
}

impl EventMessage {
    pub fn new(suid: SensorUid, events: Vec<Event>) -> Self {
        Self { suid, events }
    }

    pub fn encode(&self) -> NcsResult<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> NcsResult<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_size_limit() {
        let huge = Request::Lookup {
            datatype: "x".repeat(MAX_REQUEST_LEN + 1),
        };
        assert!(matches!(huge.encode(), Err(NcsError::Codec(_))));
    }

    #[test]
    fn test_event_message_decode() {
        let message = EventMessage::new(
            SensorUid::new(1, 2),
            vec![
                Event::PhysicalConfig { sample_rate: 100.0 },
                Event::Sample {
                    timestamp: 42,
                    data: vec![0.1, 0.2, 0.3],
                    status: SampleStatus::AccuracyHigh,
                },
            ],
        );
        let bytes = message.encode().unwrap();
        assert_eq!(EventMessage::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn test_garbage_is_codec_error() {
        assert!(matches!(EventMessage::decode(&[0xff]), Err(NcsError::Codec(_))));
    }

    #[test]
    fn test_uid_display() {
        assert_eq!(SensorUid::new(0xab, 1).to_string(), "00000000000000ab0000000000000001");
    }
}
