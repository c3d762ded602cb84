//! NCS Sensor Service
//!
//! Front door of the sensor core: registers clients against the shared
//! sensor interface and runs the poll thread that resets stalled
//! connections.

mod client;
mod config;
mod poll;
mod service;

pub use client::SensorClient;
pub use config::ServiceConfig;
pub use service::NcsService;
