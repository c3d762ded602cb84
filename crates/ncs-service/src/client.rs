//! Client handle returned by registration

use crate::service::ServiceInner;
use sensor_interface::{ChannelFence, Fence, FenceWaiter, SampleAccessor, SensorCaps};
use sensor_protocol::{NcsResult, SensorKind};
use std::sync::Arc;
use tracing::debug;

/// A registered consumer of one sensor kind.
///
/// Dropping the handle unregisters it.
pub struct SensorClient {
    service: Arc<ServiceInner>,
    id: usize,
    connection: usize,
    kind: SensorKind,
    registered: bool,
}

impl SensorClient {
    pub(crate) fn new(service: Arc<ServiceInner>, id: usize, connection: usize, kind: SensorKind) -> Self {
        Self {
            service,
            id,
            connection,
            kind,
            registered: true,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Connection slot shared with other clients of the same kind
    pub fn connection(&self) -> usize {
        self.connection
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Samples covering `[t_start, t_end]`
    pub fn get_data_sync(&self, t_start: u64, t_end: u64) -> NcsResult<SampleAccessor> {
        self.service
            .interface()
            .get_data_sync(self.connection, t_start, t_end)
    }

    pub fn get_last_n_samples(&self, n: usize) -> NcsResult<SampleAccessor> {
        self.service
            .interface()
            .get_last_n_samples(self.connection, n)
    }

    /// Queue an asynchronous read completed through `fence`
    pub fn get_data_async(&self, t_start: u64, t_end: u64, fence: Arc<dyn Fence>) -> NcsResult<()> {
        self.service
            .interface()
            .get_data_async(self.connection, t_start, t_end, fence)
    }

    /// [`SensorClient::get_data_async`] with a fresh channel fence
    pub fn read_async(&self, t_start: u64, t_end: u64) -> NcsResult<FenceWaiter> {
        let (fence, waiter) = ChannelFence::new();
        self.get_data_async(t_start, t_end, fence)?;
        Ok(waiter)
    }

    pub fn capabilities(&self) -> NcsResult<SensorCaps> {
        self.service.interface().fill_caps(self.kind)
    }

    /// Unregister now, reporting any failure
    pub fn unregister(mut self) -> NcsResult<()> {
        self.registered = false;
        self.service.unregister(self.id)
    }
}

impl Drop for SensorClient {
    fn drop(&mut self) {
        if self.registered {
            if let Err(e) = self.service.unregister(self.id) {
                debug!("{} client {} already gone: {}", self.kind, self.id, e);
            }
        }
    }
}
