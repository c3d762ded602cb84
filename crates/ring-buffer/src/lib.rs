//! Sample Ring Buffer
//!
//! Fixed-capacity circular store of fixed-stride sensor samples, one per
//! hub connection. A lock count lets readers hold an index span while the
//! producer keeps running: writes are refused instead of overwriting.

mod buffer;
mod span;

pub use buffer::{RingView, SampleRing};
pub use span::SampleSpan;

/// Seconds of history a ring holds at its configured rate
pub const DEFAULT_WINDOW_SECS: u32 = 3;
