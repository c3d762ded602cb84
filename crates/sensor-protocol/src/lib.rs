//! NCS Sensor Protocol
//!
//! Shared vocabulary of the sensor distribution core: sensor kinds, the
//! fixed-stride sample codecs, client configuration, the hub wire messages
//! and the transport traits the core talks through.

mod config;
mod error;
mod kind;
mod message;
mod sample;
pub mod sim;
mod transport;

pub use config::{OperationMode, SensorConfig};
pub use error::{NcsError, NcsResult};
pub use kind::{KindSet, SensorKind};
pub use message::{
    Attribute, Event, EventMessage, Request, SampleStatus, SensorUid, MAX_REQUEST_LEN,
};
pub use sample::{codec, GravitySample, Sample, SampleCodec, VectorSample};
pub use sim::SimulatedHub;
pub use transport::{EventHandler, Transport, TransportFactory};

/// Hub timer frequency; timestamps are ticks of this clock (19.2 MHz)
pub const TIMER_FREQUENCY_HZ: u64 = 19_200_000;
