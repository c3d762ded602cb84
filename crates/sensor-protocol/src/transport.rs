//! Transport Abstraction
//!
//! The core only sees a byte-message channel to the sensor hub. Opening a
//! channel registers an [`EventHandler`]; dropping the returned [`Transport`]
//! closes it. `send` may invoke the handler synchronously before returning,
//! so callers must not hold locks the handler needs.

use crate::error::NcsResult;
use std::sync::Arc;

/// Receives payloads arriving on a transport
pub trait EventHandler: Send + Sync {
    /// Called once per payload, possibly from inside [`Transport::send`]
    fn on_event(&self, payload: &[u8]);
}

/// Open channel to the hub; closed on drop
pub trait Transport: Send + Sync {
    /// Send one encoded request
    fn send(&self, request: &[u8]) -> NcsResult<()>;
}

/// Creates transports
pub trait TransportFactory: Send + Sync {
    /// Open a channel delivering events to `handler`
    fn open(&self, handler: Arc<dyn EventHandler>) -> NcsResult<Box<dyn Transport>>;
}
