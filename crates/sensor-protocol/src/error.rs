//! NCS Error Types

use thiserror::Error;

/// Errors reported by the sensor distribution core
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NcsError {
    /// Malformed caller input; no state was mutated
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Allocation of a slot, buffer, request record or transport failed
    #[error("Out of resources: {0}")]
    NoMemory(String),

    /// Sensor kind was not probed present at startup
    #[error("Sensor {0} not supported")]
    Unsupported(String),

    /// Fewer samples buffered than requested
    #[error("Not enough data: requested {requested}, available {available}")]
    NotEnoughData { requested: usize, available: usize },

    /// No buffered sample satisfies the requested window
    #[error("No data at or before timestamp {0}")]
    NoMoreData(u64),

    /// Bounded wait exceeded its budget
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Operation attempted in the wrong lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Ingestion hit a locked ring region; the sample was dropped
    #[error("Ring buffer locked, sample dropped")]
    ReadOnly,

    /// Request completed by a forced drain (disable, reconfigure, release)
    #[error("Request disabled")]
    Disabled,

    /// Lookup of an item that does not exist for this sensor kind
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport open or send failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Wire message could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<postcard::Error> for NcsError {
    fn from(err: postcard::Error) -> Self {
        NcsError::Codec(err.to_string())
    }
}

/// Result alias used across the NCS crates
pub type NcsResult<T> = Result<T, NcsError>;
