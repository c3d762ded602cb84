//! Sensor Service Implementation

use crate::client::SensorClient;
use crate::config::ServiceConfig;
use crate::poll;
use parking_lot::Mutex;
use sensor_interface::{Job, JobQueue, SensorCaps, SensorInterface};
use sensor_protocol::{NcsError, NcsResult, SensorConfig, SensorKind, TransportFactory};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Registered client
#[derive(Debug, Clone, Copy)]
struct ClientEntry {
    connection: usize,
    kind: SensorKind,
}

struct ClientTable {
    slots: Vec<Option<ClientEntry>>,
    poll: Option<JoinHandle<()>>,
}

impl ClientTable {
    fn active(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

pub(crate) struct ServiceInner {
    interface: Arc<SensorInterface>,
    jobs: Arc<JobQueue>,
    config: ServiceConfig,
    clients: Mutex<ClientTable>,
}

impl ServiceInner {
    pub(crate) fn interface(&self) -> &SensorInterface {
        &self.interface
    }

    /// Post a flush and wait for the poll thread to acknowledge it
    fn flush(&self) -> NcsResult<()> {
        let (job, ack) = Job::flush();
        self.jobs.enqueue(job)?;
        ack.recv_timeout(self.config.flush_timeout())
            .map_err(|_| NcsError::Timeout(self.config.flush_timeout_ms))
    }

    fn start_poll(&self) -> NcsResult<JoinHandle<()>> {
        self.jobs.start();
        poll::spawn(self.jobs.clone(), self.interface.clone(), self.config.poll_timeout()).map_err(|e| {
            self.jobs.stop();
            e
        })
    }

    /// Flush, stop and join; teardown proceeds even when the flush times out
    fn stop_poll(&self, handle: Option<JoinHandle<()>>) -> NcsResult<()> {
        let Some(handle) = handle else {
            return Ok(());
        };
        let flushed = self.flush();
        if let Err(e) = &flushed {
            warn!("Poll thread did not acknowledge flush: {}", e);
        }
        let leaked = self.jobs.stop();
        if !leaked.is_empty() {
            warn!("Discarding {} unprocessed jobs", leaked.len());
            for job in &leaked {
                debug!("Unprocessed job: {:?}", job);
            }
        }
        if handle.join().is_err() {
            error!("Poll thread panicked");
        }
        flushed
    }

    pub(crate) fn unregister(&self, id: usize) -> NcsResult<()> {
        let mut table = self.clients.lock();
        let entry = table
            .slots
            .get_mut(id)
            .and_then(Option::take)
            .ok_or_else(|| NcsError::InvalidArgument(format!("client {} not registered", id)))?;

        let result = self.interface.release(entry.connection);
        info!("Unregistered {} client {}", entry.kind, id);
        if table.active() == 0 {
            let handle = table.poll.take();
            let _ = self.stop_poll(handle);
        }
        result
    }
}

/// Sensor distribution service
///
/// Owns the sensor interface and the poll thread. The poll thread runs only
/// while at least one client is registered.
pub struct NcsService {
    inner: Arc<ServiceInner>,
}

impl NcsService {
    /// Create the interface over `factory`, probe the hub and fetch capabilities
    pub fn initialize(factory: Arc<dyn TransportFactory>, config: ServiceConfig) -> NcsResult<Self> {
        if config.max_clients == 0 {
            return Err(NcsError::InvalidArgument("max_clients is 0".to_string()));
        }

        let jobs = Arc::new(JobQueue::new());
        let interface = Arc::new(SensorInterface::new(
            factory,
            jobs.clone(),
            config.interface.clone(),
        )?);

        let found = interface.probe();
        if found == 0 {
            warn!("No sensors found on the hub");
        }
        interface.query_capabilities();

        info!("Sensor service ready with {} client slots", config.max_clients);
        Ok(Self {
            inner: Arc::new(ServiceInner {
                interface,
                jobs,
                clients: Mutex::new(ClientTable {
                    slots: vec![None; config.max_clients],
                    poll: None,
                }),
                config,
            }),
        })
    }

    /// Register a client for `config.sensor_type`.
    ///
    /// Starts the poll thread for the first client. On failure nothing stays
    /// registered and a poll thread started for this call is stopped again.
    pub fn register_service(&self, config: &SensorConfig) -> NcsResult<SensorClient> {
        let mut table = self.inner.clients.lock();
        let id = table
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                NcsError::NoMemory(format!(
                    "all {} client slots in use",
                    self.inner.config.max_clients
                ))
            })?;

        let started_poll = if table.poll.is_none() {
            table.poll = Some(self.inner.start_poll()?);
            true
        } else {
            false
        };

        match self.inner.interface.create_client_session(config) {
            Ok(connection) => {
                let kind = config.sensor_type;
                table.slots[id] = Some(ClientEntry { connection, kind });
                info!(
                    "Registered {} client {} on connection {} ({} Hz requested)",
                    kind, id, connection, config.sampling_rate
                );
                Ok(SensorClient::new(self.inner.clone(), id, connection, kind))
            }
            Err(e) => {
                warn!("Registering {} client failed: {}", config.sensor_type, e);
                if started_poll {
                    let handle = table.poll.take();
                    let _ = self.inner.stop_poll(handle);
                }
                Err(e)
            }
        }
    }

    /// Release a client by id
    pub fn unregister_service(&self, id: usize) -> NcsResult<()> {
        self.inner.unregister(id)
    }

    /// Drain the poll thread: flush, wait for its acknowledgement and join it.
    ///
    /// A fresh poll thread is started when clients are still registered, so
    /// health monitoring stays on across the flush.
    pub fn flush_service(&self) -> NcsResult<()> {
        let mut table = self.inner.clients.lock();
        let Some(handle) = table.poll.take() else {
            return Ok(());
        };
        let flushed = self.inner.stop_poll(Some(handle));
        if table.active() > 0 {
            table.poll = Some(self.inner.start_poll()?);
            debug!("Poll thread restarted after flush");
        }
        flushed
    }

    /// Capabilities of a probed sensor kind
    pub fn query_capabilities(&self, kind: SensorKind) -> NcsResult<SensorCaps> {
        self.inner.interface.fill_caps(kind)
    }

    pub fn is_present(&self, kind: SensorKind) -> bool {
        self.inner.interface.is_present(kind)
    }

    pub fn interface(&self) -> &SensorInterface {
        &self.inner.interface
    }

    pub fn client_count(&self) -> usize {
        self.inner.clients.lock().active()
    }

    /// Whether the poll thread is running
    pub fn is_polling(&self) -> bool {
        self.inner.clients.lock().poll.is_some()
    }

    /// Release every client, stop the poll thread and close the interface
    pub fn stop(&self) {
        let mut table = self.inner.clients.lock();
        let active = table.active();
        if active > 0 {
            warn!("Stopping sensor service with {} clients registered", active);
        }
        for entry in table.slots.iter_mut().filter_map(Option::take) {
            if let Err(e) = self.inner.interface.release(entry.connection) {
                debug!("Releasing connection {} at stop: {}", entry.connection, e);
            }
        }
        let handle = table.poll.take();
        let _ = self.inner.stop_poll(handle);
        drop(table);

        self.inner.interface.shutdown();
        info!("Sensor service stopped");
    }
}

impl Drop for NcsService {
    fn drop(&mut self) {
        self.stop();
    }
}
