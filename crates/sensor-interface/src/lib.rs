//! NCS Sensor Interface
//!
//! Shares one hub stream per sensor kind among any number of clients,
//! buffers the samples in per-connection rings, and serves reads either
//! synchronously through [`SampleAccessor`] windows or asynchronously
//! through caller fences.

mod accessor;
mod caps;
mod config;
mod connection;
mod fence;
mod interface;
mod jobs;

pub use accessor::SampleAccessor;
pub use caps::{SensorCaps, MAX_CAPS_ENTRIES};
pub use config::InterfaceConfig;
pub use connection::ConnectionState;
pub use fence::{ChannelFence, CompletionStatus, Fence, FenceWaiter};
pub use interface::{ConnectionInfo, SensorInterface};
pub use jobs::{FlushAck, Job, JobQueue, PollOutcome, ResetTarget};
