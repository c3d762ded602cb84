//! Sensor Interface
//!
//! Owns the connection table and everything that touches it: probing the
//! hub, creating, sharing and tearing down connections, writing incoming
//! samples into ring buffers, completing asynchronous reads and repairing
//! silent connections.
//!
//! Locking: `state` guards all table and ring metadata and is released
//! around every transport call, since a transport may deliver events
//! synchronously from inside `send`. `session` serializes the control
//! operations (create, reconfigure, release, reset, probe) so that a slot
//! cannot be claimed twice while `state` is released.

use crate::accessor::{AccessorLease, AccessorPool, SampleAccessor};
use crate::caps::SensorCaps;
use crate::config::InterfaceConfig;
use crate::connection::{Calibration, Completions, ConnectionState, PendingRequest, SensorConnection};
use crate::fence::{CompletionStatus, Fence};
use crate::jobs::{Job, JobQueue, ResetTarget};
use parking_lot::{Condvar, Mutex, MutexGuard};
use ring_buffer::{SampleRing, SampleSpan};
use sensor_protocol::{
    codec, Attribute, Event, EventHandler, EventMessage, KindSet, NcsError, NcsResult, Request,
    Sample, SampleStatus, SensorConfig, SensorKind, SensorUid, Transport, TransportFactory,
};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, error, info, warn};

type StateGuard<'a> = MutexGuard<'a, InterfaceState>;

/// Snapshot of one connection slot
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub slot: usize,
    pub kind: SensorKind,
    pub state: ConnectionState,
    /// Negotiated sampling rate (Hz)
    pub sampling_rate: f32,
    pub clients: usize,
    /// Valid samples in the ring
    pub buffered: usize,
    /// Ring capacity in samples
    pub capacity: usize,
    /// Queued asynchronous reads
    pub pending: usize,
    pub has_transport: bool,
    /// A reliable calibration bias is being applied
    pub calibrated: bool,
}

struct InterfaceState {
    running: bool,
    probe_link: Option<Arc<dyn Transport>>,
    present: KindSet,
    suids: [Option<SensorUid>; SensorKind::COUNT],
    caps: [Option<SensorCaps>; SensorKind::COUNT],
    connections: Vec<SensorConnection>,
    accessors: AccessorPool,
}

impl InterfaceState {
    fn connection(&self, slot: usize) -> NcsResult<&SensorConnection> {
        self.connections
            .get(slot)
            .ok_or_else(|| NcsError::InvalidArgument(format!("connection index {}", slot)))
    }

    fn connection_mut(&mut self, slot: usize) -> NcsResult<&mut SensorConnection> {
        self.connections
            .get_mut(slot)
            .ok_or_else(|| NcsError::InvalidArgument(format!("connection index {}", slot)))
    }

    /// Slot currently receiving from `suid`
    fn slot_by_suid(&self, suid: SensorUid) -> Option<usize> {
        self.connections
            .iter()
            .position(|c| !c.is_free() && c.suid == suid && c.transport.is_some())
    }

    fn kind_by_suid(&self, suid: SensorUid) -> Option<SensorKind> {
        SensorKind::ALL
            .into_iter()
            .find(|kind| self.suids[kind.index()] == Some(suid))
    }

    fn active_connections(&self) -> usize {
        self.connections.iter().filter(|c| c.state.is_active()).count()
    }

    fn fill_calibration(&mut self, suid: SensorUid, bias: [f32; 3], status: SampleStatus) {
        for (slot, conn) in self
            .connections
            .iter_mut()
            .enumerate()
            .filter(|(_, c)| c.calib_suid == Some(suid))
        {
            if status == SampleStatus::Unreliable {
                debug!("Calibration for connection {} unreliable, using raw samples", slot);
                conn.calibration.valid = false;
            } else {
                debug!("Calibration bias for connection {}: {:?}", slot, bias);
                conn.calibration = Calibration { bias, valid: true };
            }
        }
    }
}

fn readable_ring(conn: &SensorConnection, slot: usize) -> NcsResult<&SampleRing> {
    if !conn.state.is_active() {
        return Err(NcsError::InvalidState(format!("connection {} not running", slot)));
    }
    conn.ring
        .as_ref()
        .ok_or_else(|| NcsError::InvalidState(format!("connection {} has no buffer", slot)))
}

pub(crate) struct Shared {
    state: Mutex<InterfaceState>,
    link_update: Condvar,
    session: Mutex<()>,
    factory: Arc<dyn TransportFactory>,
    jobs: Arc<JobQueue>,
    config: InterfaceConfig,
    weak_self: Weak<Shared>,
}

/// Transport callback routed back into the interface
struct LinkHandler {
    shared: Weak<Shared>,
    slot: Option<usize>,
}

impl EventHandler for LinkHandler {
    fn on_event(&self, payload: &[u8]) {
        if let Some(shared) = self.shared.upgrade() {
            shared.dispatch(payload, self.slot);
        }
    }
}

impl Shared {
    fn handler(&self, slot: Option<usize>) -> Arc<dyn EventHandler> {
        Arc::new(LinkHandler {
            shared: self.weak_self.clone(),
            slot,
        })
    }

    fn open_transport(&self, state: &mut StateGuard<'_>, slot: usize) -> NcsResult<Arc<dyn Transport>> {
        let handler = self.handler(Some(slot));
        let factory = self.factory.clone();
        let transport = MutexGuard::unlocked(state, move || factory.open(handler))?;
        Ok(Arc::from(transport))
    }

    /// Send with the state lock released
    fn send(
        &self,
        state: &mut StateGuard<'_>,
        transport: Arc<dyn Transport>,
        request: &Request,
    ) -> NcsResult<()> {
        let bytes = request.encode()?;
        MutexGuard::unlocked(state, move || {
            let result = transport.send(&bytes);
            drop(transport);
            result
        })
    }

    fn send_to_slot(&self, state: &mut StateGuard<'_>, slot: usize, request: &Request) -> NcsResult<()> {
        let transport = state.connections[slot]
            .transport
            .clone()
            .ok_or_else(|| NcsError::InvalidState(format!("connection {} has no transport", slot)))?;
        self.send(state, transport, request)
    }

    /// Send over the probe link and wait until `ready` holds
    fn request_and_wait(
        &self,
        state: &mut StateGuard<'_>,
        request: Request,
        ready: impl Fn(&InterfaceState) -> bool,
    ) -> NcsResult<()> {
        let transport = state
            .probe_link
            .clone()
            .ok_or_else(|| NcsError::InvalidState("probe link closed".to_string()))?;
        self.send(state, transport, &request)?;

        let deadline = Instant::now() + self.config.probe_timeout();
        while !ready(&**state) {
            if self.link_update.wait_until(state, deadline).timed_out() {
                if ready(&**state) {
                    break;
                }
                return Err(NcsError::Timeout(self.config.probe_timeout_ms));
            }
        }
        Ok(())
    }

    fn dispatch(&self, payload: &[u8], slot_hint: Option<usize>) {
        let message = match EventMessage::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable payload of {} bytes: {}", payload.len(), e);
                return;
            }
        };

        let mut done = Completions::default();
        let mut state = self.state.lock();
        if !state.running {
            debug!("Interface stopped, ignoring events from {}", message.suid);
            return;
        }

        let suid = message.suid;
        for event in message.events {
            match event {
                Event::LookupResult { datatype, suids } => {
                    self.setup_sensor_link(&mut state, &datatype, &suids)
                }
                Event::Error { code } => {
                    error!("Hub error {} from {} (connection {:?})", code, suid, slot_hint)
                }
                Event::PhysicalConfig { sample_rate } => {
                    self.apply_physical_config(&mut state, suid, sample_rate)
                }
                Event::Sample {
                    timestamp, data, ..
                } => {
                    if let Err(e) = self.fill_locked(&mut state, suid, timestamp, &data, &mut done) {
                        debug!("Sample {} from {} not stored: {}", timestamp, suid, e);
                    }
                }
                Event::Attributes(attributes) => self.fill_attributes(&mut state, suid, &attributes),
                Event::Calibration { bias, status } => state.fill_calibration(suid, bias, status),
                Event::Flush => debug!("Flush complete for {}", suid),
            }
        }
    }

    fn setup_sensor_link(&self, state: &mut InterfaceState, datatype: &str, suids: &[SensorUid]) {
        let Some(kind) = SensorKind::from_datatype(datatype) else {
            warn!("Lookup result for unknown datatype {}", datatype);
            return;
        };
        if let Some(first) = suids.first() {
            if suids.len() > 1 {
                debug!("{} sources report {}, using {}", suids.len(), kind, first);
            }
            state.suids[kind.index()] = Some(*first);
            state.present.insert(kind);
            info!("Found {} sensor {}", kind, first);
        }
        self.link_update.notify_all();
    }

    fn fill_attributes(&self, state: &mut InterfaceState, suid: SensorUid, attributes: &[Attribute]) {
        let Some(kind) = state.kind_by_suid(suid) else {
            warn!("Attributes from unknown source {}", suid);
            return;
        };
        let caps = SensorCaps::from_attributes(kind, attributes);
        debug!("{} caps: {:?}", kind, caps);
        state.caps[kind.index()] = Some(caps);
        self.link_update.notify_all();
    }

    fn apply_physical_config(&self, state: &mut InterfaceState, suid: SensorUid, sample_rate: f32) {
        if sample_rate <= 0.0 {
            return;
        }
        let Some(slot) = state.slot_by_suid(suid) else {
            return;
        };
        if let Some(ring) = state.connections[slot].ring.as_mut() {
            let ticks = (self.config.timer_frequency_hz as f64 / sample_rate as f64) as u64;
            ring.set_tick_period(ticks);
            debug!("Connection {} runs at {} Hz, tick period {}", slot, sample_rate, ticks);
        }
    }

    /// Store one sample for the connection receiving from `suid`
    fn fill_locked(
        &self,
        state: &mut InterfaceState,
        suid: SensorUid,
        timestamp: u64,
        data: &[f32],
        done: &mut Completions,
    ) -> NcsResult<usize> {
        let slot = state
            .slot_by_suid(suid)
            .ok_or_else(|| NcsError::InvalidArgument(format!("no connection for source {}", suid)))?;
        if data.is_empty() {
            return Err(NcsError::NotFound(format!("empty payload from {}", suid)));
        }

        self.check_and_set_last_seen(state, slot);
        self.jobs.heartbeat();

        let conn = &mut state.connections[slot];
        let kind = conn
            .kind
            .ok_or_else(|| NcsError::InvalidState(format!("connection {} is free", slot)))?;
        let calibration = conn.calibration;
        let ring = conn
            .ring
            .as_mut()
            .ok_or_else(|| NcsError::NoMemory(format!("{} connection {} has no buffer", kind, slot)))?;
        if ring.lock_count() > 0 {
            metrics::counter!("ncs_samples_dropped_total", "sensor" => kind.datatype()).increment(1);
            return Err(NcsError::ReadOnly);
        }

        let mut sample = Sample::from_values(kind, data, timestamp)?;
        if calibration.valid && kind.calibration_source().is_some() {
            sample.apply_bias(calibration.bias);
        }
        let index = ring.write(&sample)?;
        metrics::counter!("ncs_samples_written_total", "sensor" => kind.datatype()).increment(1);

        conn.trigger_fences(Ok(()), timestamp, done);
        Ok(index)
    }

    /// Refresh the active slot and schedule resets for silent ones
    fn check_and_set_last_seen(&self, state: &mut InterfaceState, active: usize) {
        let now = Instant::now();
        let timeout = self.config.callbacks_timeout();

        for (slot, conn) in state.connections.iter_mut().enumerate() {
            if !conn.monitored || !conn.state.is_active() {
                continue;
            }
            if slot == active {
                conn.last_seen = Some(now);
                if conn.state == ConnectionState::TimedOut {
                    info!("Connection {} delivering again", slot);
                    conn.state = ConnectionState::Running;
                }
                continue;
            }

            let silent = conn
                .last_seen
                .map_or(true, |seen| now.duration_since(seen) > timeout);
            if silent {
                warn!(
                    "{:?} connection {} silent for over {:?}, scheduling reset",
                    conn.kind, slot, timeout
                );
                // one reset per timeout window
                conn.last_seen = Some(now);
                conn.state = ConnectionState::TimedOut;
                if let Err(e) = self.jobs.enqueue(Job::ResetConnection(ResetTarget::Slot(slot))) {
                    debug!("Reset of connection {} not queued: {}", slot, e);
                }
            }
        }
    }

    fn subscribe_calibration(&self, state: &mut StateGuard<'_>, slot: usize, kind: SensorKind) {
        let Some(source) = kind.calibration_source() else {
            return;
        };
        let Some(cal_suid) = state.suids[source.index()] else {
            debug!("No {} source, {} stays uncalibrated", source, kind);
            return;
        };
        state.connections[slot].calib_suid = Some(cal_suid);
        if let Err(e) = self.send_to_slot(state, slot, &Request::Calibration { suid: cal_suid }) {
            warn!("{} calibration subscription failed: {}", kind, e);
        }
    }

    fn create_connection(&self, state: &mut StateGuard<'_>, slot: usize, config: &SensorConfig) -> NcsResult<()> {
        let kind = config.sensor_type;
        let suid = state.suids[kind.index()].ok_or_else(|| NcsError::Unsupported(kind.to_string()))?;
        let ring = SampleRing::new(
            kind,
            config.sampling_rate,
            self.config.buffered_window_secs,
            self.config.timer_frequency_hz,
        )?;

        {
            let conn = &mut state.connections[slot];
            conn.kind = Some(kind);
            conn.suid = suid;
            conn.ring = Some(ring);
            conn.config = Some(config.clone());
            conn.state = ConnectionState::Stopped;
        }

        let transport = match self.open_transport(state, slot) {
            Ok(transport) => transport,
            Err(e) => {
                error!("Failed to open transport for {} connection {}: {}", kind, slot, e);
                state.connections[slot].clear();
                return Err(NcsError::NoMemory(format!("transport for {}: {}", kind, e)));
            }
        };

        {
            let conn = &mut state.connections[slot];
            conn.transport = Some(transport);
            conn.state = ConnectionState::Running;
            conn.last_seen = Some(Instant::now());
            conn.monitored = self.config.monitored.contains(kind);
        }

        let request = Request::Config {
            suid,
            sample_rate: config.sampling_rate,
            report_period_us: config.report_rate_us,
        };
        if let Err(e) = self.send_to_slot(state, slot, &request) {
            error!("Failed to configure {} connection {}: {}", kind, slot, e);
            let transport = state.connections[slot].clear();
            MutexGuard::unlocked(state, move || drop(transport));
            return Err(e);
        }

        self.subscribe_calibration(state, slot, kind);
        info!("Created {} connection {} at {} Hz", kind, slot, config.sampling_rate);
        Ok(())
    }

    fn reconfigure_locked(
        &self,
        state: &mut StateGuard<'_>,
        slot: usize,
        config: SensorConfig,
        recreate: bool,
        done: &mut Completions,
    ) -> NcsResult<()> {
        let (kind, suid, rate_changed) = {
            let conn = state.connection(slot)?;
            if !conn.state.is_active() {
                return Err(NcsError::InvalidState(format!("connection {} not running", slot)));
            }
            let kind = conn
                .kind
                .ok_or_else(|| NcsError::InvalidState(format!("connection {} is free", slot)))?;
            let changed = (conn.sampling_rate() - config.sampling_rate).abs() > f32::EPSILON;
            (kind, conn.suid, changed)
        };
        if config.sensor_type != kind {
            return Err(NcsError::InvalidArgument(format!(
                "{} config for {} connection {}",
                config.sensor_type, kind, slot
            )));
        }

        state.connections[slot].drain_pending(Err(NcsError::Disabled), done);

        if recreate {
            let old = state.connections[slot].transport.take();
            MutexGuard::unlocked(state, move || drop(old));
            match self.open_transport(state, slot) {
                Ok(transport) => state.connections[slot].transport = Some(transport),
                Err(e) => {
                    error!("Failed to reopen transport for {} connection {}: {}", kind, slot, e);
                    return Err(NcsError::NoMemory(format!("transport for {}: {}", kind, e)));
                }
            }
        }

        if let Err(e) = self.send_to_slot(state, slot, &Request::Disable { suid }) {
            warn!("Disable of {} connection {} failed: {}", kind, slot, e);
        }

        let new_ring = if rate_changed {
            Some(SampleRing::new(
                kind,
                config.sampling_rate,
                self.config.buffered_window_secs,
                self.config.timer_frequency_hz,
            )?)
        } else {
            None
        };

        {
            let conn = &mut state.connections[slot];
            if conn.transport.is_none() || !conn.state.is_active() {
                return Err(NcsError::InvalidState(format!(
                    "connection {} torn down during reconfigure",
                    slot
                )));
            }
            conn.state = ConnectionState::Stopped;
            conn.generation += 1;
            if let Some(ring) = new_ring {
                conn.ring = Some(ring);
            } else if let Some(ring) = conn.ring.as_mut() {
                ring.reset();
            }
        }

        let request = Request::Config {
            suid,
            sample_rate: config.sampling_rate,
            report_period_us: config.report_rate_us,
        };
        if let Err(e) = self.send_to_slot(state, slot, &request) {
            error!("Failed to reconfigure {} connection {}: {}", kind, slot, e);
            // stays active so the health check retries it
            state.connections[slot].state = ConnectionState::TimedOut;
            return Err(e);
        }
        if recreate {
            self.subscribe_calibration(state, slot, kind);
        }

        let conn = &mut state.connections[slot];
        if conn.transport.is_none() {
            return Err(NcsError::InvalidState(format!(
                "connection {} lost its transport",
                slot
            )));
        }
        info!(
            "Reconfigured {} connection {} at {} Hz (recreate: {})",
            kind, slot, config.sampling_rate, recreate
        );
        conn.config = Some(config);
        conn.state = ConnectionState::Running;
        conn.last_seen = Some(Instant::now());
        Ok(())
    }

    fn create_or_reuse(&self, config: &SensorConfig) -> NcsResult<usize> {
        config.validate()?;
        let kind = config.sensor_type;

        let mut done = Completions::default();
        let _session = self.session.lock();
        let mut state = self.state.lock();
        if !state.running {
            return Err(NcsError::InvalidState("interface stopped".to_string()));
        }
        if !state.present.contains(kind) || codec(kind).is_none() {
            return Err(NcsError::Unsupported(kind.to_string()));
        }

        let shared = state
            .connections
            .iter()
            .position(|c| c.kind == Some(kind) && c.state.is_active());
        if let Some(slot) = shared {
            let current = state.connections[slot].sampling_rate();
            if config.sampling_rate > current {
                info!(
                    "Raising {} connection {} from {} Hz to {} Hz",
                    kind, slot, current, config.sampling_rate
                );
                self.reconfigure_locked(&mut state, slot, config.clone(), false, &mut done)?;
            } else if config.need_exact_rate && config.sampling_rate < current {
                warn!(
                    "{} client asked for exactly {} Hz, sharing connection at {} Hz",
                    kind, config.sampling_rate, current
                );
            }
            let conn = &mut state.connections[slot];
            conn.clients += 1;
            debug!("{} connection {} now has {} clients", kind, slot, conn.clients);
            return Ok(slot);
        }

        let slot = state
            .connections
            .iter()
            .position(SensorConnection::is_free)
            .ok_or_else(|| {
                NcsError::NoMemory(format!("all {} connections in use", self.config.max_connections))
            })?;
        self.create_connection(&mut state, slot, config)?;
        state.connections[slot].clients = 1;
        metrics::gauge!("ncs_active_connections").set(state.active_connections() as f64);
        Ok(slot)
    }

    fn release(&self, slot: usize) -> NcsResult<()> {
        let mut done = Completions::default();
        let _session = self.session.lock();
        let mut state = self.state.lock();

        let conn = state.connection_mut(slot)?;
        if conn.clients == 0 {
            return Err(NcsError::InvalidState(format!("connection {} has no clients", slot)));
        }
        conn.clients -= 1;
        if conn.clients > 0 {
            debug!("Connection {} still has {} clients", slot, conn.clients);
            return Ok(());
        }

        let kind = conn.kind;
        conn.drain_pending(Err(NcsError::Disabled), &mut done);
        let transport = conn.clear();
        metrics::gauge!("ncs_active_connections").set(state.active_connections() as f64);
        drop(state);
        drop(transport);
        info!("Released {:?} connection {}", kind, slot);
        Ok(())
    }

    fn reset_connection(&self, target: ResetTarget) -> NcsResult<usize> {
        let mut done = Completions::default();
        let _session = self.session.lock();
        let mut state = self.state.lock();

        let slots: Vec<usize> = match target {
            ResetTarget::All => state
                .connections
                .iter()
                .enumerate()
                .filter(|(_, c)| c.monitored && c.state.is_active())
                .map(|(slot, _)| slot)
                .collect(),
            ResetTarget::Slot(slot) => {
                state.connection(slot)?;
                vec![slot]
            }
        };

        let mut reset = 0;
        for slot in slots {
            let conn = &state.connections[slot];
            let (Some(kind), Some(config)) = (conn.kind, conn.config.clone()) else {
                continue;
            };
            if !conn.state.is_active() {
                debug!("Connection {} not running, skipping reset", slot);
                continue;
            }
            warn!("Resetting {} connection {}", kind, slot);
            metrics::counter!("ncs_connection_resets_total", "sensor" => kind.datatype()).increment(1);
            match self.reconfigure_locked(&mut state, slot, config, true, &mut done) {
                Ok(()) => reset += 1,
                Err(e) => error!("Reset of {} connection {} failed: {}", kind, slot, e),
            }
        }
        Ok(reset)
    }

    fn open_accessor(&self, state: &mut InterfaceState, slot: usize, span: SampleSpan) -> NcsResult<SampleAccessor> {
        let InterfaceState {
            connections,
            accessors,
            ..
        } = state;
        let conn = &mut connections[slot];
        let generation = conn.generation;
        let (Some(kind), Some(ring)) = (conn.kind, conn.ring.as_mut()) else {
            return Err(NcsError::InvalidState(format!("connection {} has no buffer", slot)));
        };

        accessors.acquire()?;
        let locked = ring.lock(span.start, span.end);
        Ok(SampleAccessor::new(
            kind,
            span,
            ring.view(),
            AccessorLease {
                shared: self.weak_self.clone(),
                slot,
                generation,
                locked,
            },
        ))
    }

    pub(crate) fn return_accessor(&self, slot: usize, generation: u64, locked: bool) {
        let mut state = self.state.lock();
        state.accessors.release();
        if !locked {
            return;
        }
        if let Some(conn) = state.connections.get_mut(slot) {
            if conn.generation == generation {
                if let Some(ring) = conn.ring.as_mut() {
                    ring.unlock();
                }
            }
        }
    }

    fn shutdown(&self) {
        let mut done = Completions::default();
        let _session = self.session.lock();
        let mut state = self.state.lock();
        if !state.running && state.probe_link.is_none() {
            return;
        }

        state.running = false;
        let mut transports = vec![state.probe_link.take()];
        for conn in state.connections.iter_mut().filter(|c| !c.is_free()) {
            conn.drain_pending(Err(NcsError::Disabled), &mut done);
            transports.push(conn.clear());
        }
        drop(state);
        drop(transports);
        info!("Sensor interface stopped");
    }
}

/// Sensor distribution interface over one hub
pub struct SensorInterface {
    shared: Arc<Shared>,
}

impl SensorInterface {
    /// Build the interface and open its discovery link
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        jobs: Arc<JobQueue>,
        config: InterfaceConfig,
    ) -> NcsResult<Self> {
        if config.max_connections == 0 {
            return Err(NcsError::InvalidArgument("max_connections is 0".to_string()));
        }

        let shared = Arc::new_cyclic(|weak_self| Shared {
            state: Mutex::new(InterfaceState {
                running: false,
                probe_link: None,
                present: KindSet::empty(),
                suids: Default::default(),
                caps: Default::default(),
                connections: (0..config.max_connections)
                    .map(|_| SensorConnection::default())
                    .collect(),
                accessors: AccessorPool::new(config.accessor_pool_len),
            }),
            link_update: Condvar::new(),
            session: Mutex::new(()),
            factory,
            jobs,
            config,
            weak_self: weak_self.clone(),
        });

        let probe_link = shared
            .factory
            .open(shared.handler(None))
            .map_err(|e| NcsError::NoMemory(format!("discovery link: {}", e)))?;
        {
            let mut state = shared.state.lock();
            state.probe_link = Some(Arc::from(probe_link));
            state.running = true;
        }
        info!(
            "Sensor interface created with {} connection slots",
            shared.config.max_connections
        );
        Ok(Self { shared })
    }

    /// Discover which sensor kinds the hub exposes; returns how many were found.
    ///
    /// Each kind gets one bounded wait. Kinds that do not answer are absent
    /// for the lifetime of the interface.
    pub fn probe(&self) -> usize {
        let _session = self.shared.session.lock();
        let mut state = self.shared.state.lock();
        for kind in SensorKind::ALL {
            if state.present.contains(kind) {
                continue;
            }
            let request = Request::Lookup {
                datatype: kind.datatype().to_string(),
            };
            match self
                .shared
                .request_and_wait(&mut state, request, |st| st.present.contains(kind))
            {
                Ok(()) => {}
                Err(NcsError::Timeout(ms)) => warn!("No {} sensor answered within {}ms", kind, ms),
                Err(e) => warn!("Probing {} failed: {}", kind, e),
            }
        }
        let found = state.present.iter().count();
        info!("Probe found {} of {} sensor kinds", found, SensorKind::COUNT);
        found
    }

    /// Fetch rate/resolution/range attributes of every present sample kind
    pub fn query_capabilities(&self) {
        let _session = self.shared.session.lock();
        let mut state = self.shared.state.lock();
        let kinds: Vec<SensorKind> = state
            .present
            .iter()
            .filter(|kind| !kind.is_calibration_source())
            .collect();

        for kind in kinds {
            let Some(suid) = state.suids[kind.index()] else {
                continue;
            };
            match self.shared.request_and_wait(
                &mut state,
                Request::Attributes { suid },
                |st| st.caps[kind.index()].is_some(),
            ) {
                Ok(()) => {}
                Err(e) => {
                    warn!("No capabilities for {}: {}", kind, e);
                    state.caps[kind.index()] = Some(SensorCaps::default());
                }
            }
        }
    }

    /// Whether `kind` was found by [`SensorInterface::probe`]
    pub fn is_present(&self, kind: SensorKind) -> bool {
        self.shared.state.lock().present.contains(kind)
    }

    /// Capabilities of a probed kind
    pub fn fill_caps(&self, kind: SensorKind) -> NcsResult<SensorCaps> {
        let state = self.shared.state.lock();
        if !state.present.contains(kind) {
            return Err(NcsError::Unsupported(kind.to_string()));
        }
        Ok(state.caps[kind.index()].clone().unwrap_or_default())
    }

    /// Bind a client to a connection of its sensor kind, creating or
    /// upgrading one as needed; returns the connection slot.
    pub fn create_client_session(&self, config: &SensorConfig) -> NcsResult<usize> {
        self.shared.create_or_reuse(config)
    }

    /// Re-apply `config` to a running connection, draining pending reads
    pub fn reconfigure(&self, slot: usize, config: SensorConfig, recreate: bool) -> NcsResult<()> {
        let mut done = Completions::default();
        let _session = self.shared.session.lock();
        let mut state = self.shared.state.lock();
        self.shared
            .reconfigure_locked(&mut state, slot, config, recreate, &mut done)
    }

    /// Drop one client reference; the last one tears the connection down
    pub fn release(&self, slot: usize) -> NcsResult<()> {
        self.shared.release(slot)
    }

    /// Ingest one sample from `suid`; returns the ring slot written
    pub fn fill_sensor_data(&self, suid: SensorUid, timestamp: u64, data: &[f32]) -> NcsResult<usize> {
        let mut done = Completions::default();
        let mut state = self.shared.state.lock();
        if !state.running {
            return Err(NcsError::InvalidState("interface stopped".to_string()));
        }
        self.shared
            .fill_locked(&mut state, suid, timestamp, data, &mut done)
    }

    /// Process one raw transport payload
    pub fn dispatch(&self, payload: &[u8]) {
        self.shared.dispatch(payload, None);
    }

    /// Complete the pending reads of `slot` that `timestamp` satisfies, or
    /// all of them when `status` is an error
    pub fn trigger_fences(&self, slot: usize, status: CompletionStatus, timestamp: u64) -> NcsResult<()> {
        let mut done = Completions::default();
        let mut state = self.shared.state.lock();
        state
            .connection_mut(slot)?
            .trigger_fences(status, timestamp, &mut done);
        Ok(())
    }

    /// Window of buffered samples covering `[t_start, t_end]`
    pub fn get_data_sync(&self, slot: usize, t_start: u64, t_end: u64) -> NcsResult<SampleAccessor> {
        if t_start > t_end {
            return Err(NcsError::InvalidArgument(format!(
                "range start {} after end {}",
                t_start, t_end
            )));
        }
        let mut state = self.shared.state.lock();
        let span = readable_ring(state.connection(slot)?, slot)?.select_range(t_start, t_end)?;
        self.shared.open_accessor(&mut state, slot, span)
    }

    /// Window over the newest `n` samples
    pub fn get_last_n_samples(&self, slot: usize, n: usize) -> NcsResult<SampleAccessor> {
        let mut state = self.shared.state.lock();
        let span = readable_ring(state.connection(slot)?, slot)?.select_last_n(n)?;
        self.shared.open_accessor(&mut state, slot, span)
    }

    /// Queue a read of `[t_start, t_end]` completed through `fence`
    pub fn get_data_async(
        &self,
        slot: usize,
        t_start: u64,
        t_end: u64,
        fence: Arc<dyn Fence>,
    ) -> NcsResult<()> {
        if t_start > t_end {
            return Err(NcsError::InvalidArgument(format!(
                "range start {} after end {}",
                t_start, t_end
            )));
        }
        let capacity = self.shared.config.async_queue_capacity;
        let mut state = self.shared.state.lock();
        let conn = state.connection_mut(slot)?;
        let kind = conn
            .kind
            .ok_or_else(|| NcsError::InvalidState(format!("connection {} is free", slot)))?;
        if codec(kind).is_none() {
            return Err(NcsError::Unsupported(kind.to_string()));
        }
        if !conn.state.is_active() {
            return Err(NcsError::InvalidState(format!("connection {} not running", slot)));
        }
        if conn.pending.len() >= capacity {
            return Err(NcsError::NoMemory(format!(
                "{} async requests already queued on connection {}",
                capacity, slot
            )));
        }

        fence.attach()?;
        conn.pending.push_back(PendingRequest::new(t_start, t_end, fence));
        debug!("Queued {} read [{}, {}] on connection {}", kind, t_start, t_end, slot);
        Ok(())
    }

    /// Return an accessor, unlocking its ring window
    pub fn enqueue_accessor(&self, accessor: SampleAccessor) {
        drop(accessor);
    }

    /// Recreate the transport of the targeted connections; returns how many were reset
    pub fn reset_connection(&self, target: ResetTarget) -> NcsResult<usize> {
        self.shared.reset_connection(target)
    }

    /// Snapshot of an occupied slot
    pub fn connection_info(&self, slot: usize) -> Option<ConnectionInfo> {
        let state = self.shared.state.lock();
        let conn = state.connections.get(slot)?;
        let kind = conn.kind?;
        Some(ConnectionInfo {
            slot,
            kind,
            state: conn.state,
            sampling_rate: conn.sampling_rate(),
            clients: conn.clients,
            buffered: conn.ring.as_ref().map_or(0, SampleRing::len),
            capacity: conn.ring.as_ref().map_or(0, SampleRing::capacity),
            pending: conn.pending.len(),
            has_transport: conn.transport.is_some(),
            calibrated: conn.calibration.valid,
        })
    }

    /// Snapshots of every occupied slot
    pub fn connections(&self) -> Vec<ConnectionInfo> {
        let slots = self.shared.config.max_connections;
        (0..slots).filter_map(|slot| self.connection_info(slot)).collect()
    }

    /// Accessors that can still be handed out
    pub fn accessors_available(&self) -> usize {
        self.shared.state.lock().accessors.available()
    }

    pub fn config(&self) -> &InterfaceConfig {
        &self.shared.config
    }

    /// Close every transport and fail all pending reads
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

impl Drop for SensorInterface {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fence::ChannelFence;
    use sensor_protocol::SimulatedHub;
    use std::time::Duration;

    /// Tick period of a 20 Hz stream
    const TICK: u64 = 960_000;

    fn quiet_config() -> InterfaceConfig {
        InterfaceConfig {
            monitored: KindSet::empty(),
            ..InterfaceConfig::fast_test()
        }
    }

    fn setup_with(hub: &SimulatedHub, config: InterfaceConfig) -> SensorInterface {
        let interface =
            SensorInterface::new(Arc::new(hub.clone()), Arc::new(JobQueue::new()), config).unwrap();
        interface.probe();
        interface.query_capabilities();
        interface
    }

    fn setup(hub: &SimulatedHub) -> SensorInterface {
        setup_with(hub, quiet_config())
    }

    fn gyro(rate: f32) -> SensorConfig {
        SensorConfig::new(SensorKind::Gyro, rate)
    }

    fn fill(interface: &SensorInterface, hub: &SimulatedHub, ticks: std::ops::RangeInclusive<u64>) {
        let suid = hub.suid(SensorKind::Gyro).unwrap();
        for k in ticks {
            interface
                .fill_sensor_data(suid, k * TICK, &[k as f32, 0.0, 0.0])
                .unwrap();
        }
    }

    fn timestamps(accessor: &SampleAccessor) -> Vec<u64> {
        accessor
            .samples()
            .unwrap()
            .iter()
            .map(Sample::timestamp)
            .collect()
    }

    #[test]
    fn test_probe_and_caps() {
        let hub = SimulatedHub::new();
        hub.set_absent(SensorKind::Magnetometer, true);
        let interface = setup(&hub);

        assert!(interface.is_present(SensorKind::Gyro));
        assert!(interface.is_present(SensorKind::GyroCal));
        assert!(!interface.is_present(SensorKind::Magnetometer));

        let caps = interface.fill_caps(SensorKind::Gyro).unwrap();
        assert_eq!(caps.max_rate(), Some(400.0));
        assert!(matches!(
            interface.fill_caps(SensorKind::Magnetometer),
            Err(NcsError::Unsupported(_))
        ));
        assert!(matches!(
            interface.create_client_session(&SensorConfig::new(SensorKind::Magnetometer, 10.0)),
            Err(NcsError::Unsupported(_))
        ));
    }

    #[test]
    fn test_clients_share_connection_at_highest_rate() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);

        let first = interface.create_client_session(&gyro(10.0)).unwrap();
        assert_eq!(hub.stream_rate(SensorKind::Gyro), Some(10.0));

        let second = interface.create_client_session(&gyro(20.0)).unwrap();
        assert_eq!(first, second);
        let info = interface.connection_info(first).unwrap();
        assert_eq!(info.clients, 2);
        assert_eq!(info.sampling_rate, 20.0);
        assert_eq!(info.capacity, 60);
        assert_eq!(hub.stream_rate(SensorKind::Gyro), Some(20.0));

        let third = interface.create_client_session(&gyro(5.0)).unwrap();
        assert_eq!(third, first);
        assert_eq!(interface.connection_info(first).unwrap().sampling_rate, 20.0);
        assert_eq!(interface.connections().len(), 1);
        // probe link plus one sensor link
        assert_eq!(hub.open_count(), 2);
    }

    #[test]
    fn test_sync_read_window() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);
        let slot = interface.create_client_session(&gyro(20.0)).unwrap();
        for k in 1..=10u64 {
            assert_eq!(hub.emit_sample(SensorKind::Gyro, k * TICK, vec![k as f32, 0.0, 0.0]), 1);
        }
        assert_eq!(interface.connection_info(slot).unwrap().buffered, 10);

        let accessor = interface.get_data_sync(slot, 3 * TICK, 5 * TICK).unwrap();
        assert_eq!(timestamps(&accessor), vec![3 * TICK, 4 * TICK, 5 * TICK]);
        assert!(!accessor.holds_lock());
        assert_eq!(interface.accessors_available(), 9);
        interface.enqueue_accessor(accessor);
        assert_eq!(interface.accessors_available(), 10);

        let last = interface.get_last_n_samples(slot, 4).unwrap();
        assert_eq!(last.len(), 4);
        assert_eq!(last.get(0).unwrap().timestamp(), 7 * TICK);
        assert_eq!(last.get(3).unwrap().timestamp(), 10 * TICK);
        drop(last);

        assert!(matches!(
            interface.get_data_sync(slot, 0, TICK / 2),
            Err(NcsError::NoMoreData(_))
        ));
        assert!(matches!(
            interface.get_data_sync(slot, 5 * TICK, 3 * TICK),
            Err(NcsError::InvalidArgument(_))
        ));
        assert!(matches!(
            interface.get_last_n_samples(slot, 11),
            Err(NcsError::NotEnoughData {
                requested: 11,
                available: 10
            })
        ));
    }

    #[test]
    fn test_locked_window_rejects_writes() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);
        let slot = interface.create_client_session(&gyro(20.0)).unwrap();
        fill(&interface, &hub, 1..=60);

        let accessor = interface.get_last_n_samples(slot, 60).unwrap();
        assert!(accessor.holds_lock());
        let suid = hub.suid(SensorKind::Gyro).unwrap();
        assert_eq!(
            interface.fill_sensor_data(suid, 61 * TICK, &[0.0, 0.0, 0.0]),
            Err(NcsError::ReadOnly)
        );

        drop(accessor);
        assert_eq!(interface.fill_sensor_data(suid, 61 * TICK, &[0.0, 0.0, 0.0]), Ok(0));
    }

    #[test]
    fn test_stale_accessor_does_not_unlock_new_ring() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);
        let slot = interface.create_client_session(&gyro(20.0)).unwrap();
        fill(&interface, &hub, 1..=60);
        let stale = interface.get_last_n_samples(slot, 60).unwrap();

        interface.reconfigure(slot, gyro(20.0), false).unwrap();
        fill(&interface, &hub, 100..=159);
        let fresh = interface.get_last_n_samples(slot, 60).unwrap();
        assert!(fresh.holds_lock());

        drop(stale);
        let suid = hub.suid(SensorKind::Gyro).unwrap();
        assert_eq!(
            interface.fill_sensor_data(suid, 200 * TICK, &[0.0; 3]),
            Err(NcsError::ReadOnly)
        );
        drop(fresh);
        assert!(interface.fill_sensor_data(suid, 200 * TICK, &[0.0; 3]).is_ok());
    }

    #[test]
    fn test_async_read_completes_when_covered() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);
        let slot = interface.create_client_session(&gyro(20.0)).unwrap();
        let suid = hub.suid(SensorKind::Gyro).unwrap();

        let (fence, mut waiter) = ChannelFence::new();
        interface.get_data_async(slot, 100, 200, fence.clone()).unwrap();
        interface.fill_sensor_data(suid, 150, &[0.0; 3]).unwrap();
        assert_eq!(waiter.try_wait(), None);
        assert_eq!(interface.connection_info(slot).unwrap().pending, 1);

        interface.fill_sensor_data(suid, 250, &[0.0; 3]).unwrap();
        assert_eq!(waiter.try_wait(), Some(Ok(())));
        assert!(fence.is_released());
        assert_eq!(interface.connection_info(slot).unwrap().pending, 0);
    }

    #[test]
    fn test_async_queue_bounded() {
        let hub = SimulatedHub::new();
        let interface = setup_with(
            &hub,
            InterfaceConfig {
                async_queue_capacity: 2,
                ..quiet_config()
            },
        );
        let slot = interface.create_client_session(&gyro(20.0)).unwrap();

        let (fence, _waiter) = ChannelFence::new();
        interface.get_data_async(slot, 0, 10, fence.clone()).unwrap();
        assert!(matches!(
            interface.get_data_async(slot, 0, 10, fence),
            Err(NcsError::InvalidState(_))
        ));

        let (fence, _waiter2) = ChannelFence::new();
        interface.get_data_async(slot, 0, 10, fence).unwrap();
        let (fence, _waiter3) = ChannelFence::new();
        assert!(matches!(
            interface.get_data_async(slot, 0, 10, fence),
            Err(NcsError::NoMemory(_))
        ));
        let (fence, _waiter4) = ChannelFence::new();
        assert!(matches!(
            interface.get_data_async(slot, 10, 0, fence),
            Err(NcsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_explicit_trigger_with_error_drains() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);
        let slot = interface.create_client_session(&gyro(20.0)).unwrap();

        let (fence, mut waiter) = ChannelFence::new();
        interface.get_data_async(slot, 100, 200, fence).unwrap();
        interface.trigger_fences(slot, Ok(()), 150).unwrap();
        assert_eq!(waiter.try_wait(), None);
        interface
            .trigger_fences(slot, Err(NcsError::Timeout(5)), 0)
            .unwrap();
        assert_eq!(waiter.try_wait(), Some(Err(NcsError::Timeout(5))));
    }

    #[test]
    fn test_reconfigure_drains_pending_with_disabled() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);
        let slot = interface.create_client_session(&gyro(20.0)).unwrap();
        fill(&interface, &hub, 1..=5);

        let (first, mut first_waiter) = ChannelFence::new();
        let (second, mut second_waiter) = ChannelFence::new();
        interface.get_data_async(slot, 10 * TICK, 20 * TICK, first).unwrap();
        interface.get_data_async(slot, 30 * TICK, 40 * TICK, second).unwrap();

        interface.reconfigure(slot, gyro(50.0), false).unwrap();
        assert_eq!(first_waiter.try_wait(), Some(Err(NcsError::Disabled)));
        assert_eq!(second_waiter.try_wait(), Some(Err(NcsError::Disabled)));

        let info = interface.connection_info(slot).unwrap();
        assert_eq!(info.state, ConnectionState::Running);
        assert_eq!(info.capacity, 150);
        assert_eq!(info.buffered, 0);
        assert_eq!(info.pending, 0);
        assert_eq!(hub.stream_rate(SensorKind::Gyro), Some(50.0));

        assert!(matches!(
            interface.reconfigure(slot, SensorConfig::new(SensorKind::Accelerometer, 50.0), false),
            Err(NcsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_release_tears_down_last_client() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);
        let slot = interface.create_client_session(&gyro(10.0)).unwrap();
        interface.create_client_session(&gyro(10.0)).unwrap();
        assert_eq!(hub.active_links(), 2);

        let (fence, mut waiter) = ChannelFence::new();
        interface.get_data_async(slot, 0, u64::MAX, fence).unwrap();

        interface.release(slot).unwrap();
        assert_eq!(interface.connection_info(slot).unwrap().clients, 1);
        assert_eq!(waiter.try_wait(), None);

        interface.release(slot).unwrap();
        assert!(interface.connection_info(slot).is_none());
        assert_eq!(waiter.try_wait(), Some(Err(NcsError::Disabled)));
        assert_eq!(hub.active_links(), 1);
        assert_eq!(hub.stream_rate(SensorKind::Gyro), None);

        assert!(matches!(interface.release(slot), Err(NcsError::InvalidState(_))));
        assert!(matches!(interface.release(99), Err(NcsError::InvalidArgument(_))));
    }

    #[test]
    fn test_connection_table_full() {
        let hub = SimulatedHub::new();
        let interface = setup_with(
            &hub,
            InterfaceConfig {
                max_connections: 2,
                ..quiet_config()
            },
        );
        interface.create_client_session(&gyro(10.0)).unwrap();
        interface
            .create_client_session(&SensorConfig::new(SensorKind::Accelerometer, 10.0))
            .unwrap();
        assert!(matches!(
            interface.create_client_session(&SensorConfig::new(SensorKind::Gravity, 10.0)),
            Err(NcsError::NoMemory(_))
        ));
    }

    #[test]
    fn test_transport_open_failure_frees_slot() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);

        hub.set_fail_open(true);
        assert!(matches!(
            interface.create_client_session(&gyro(10.0)),
            Err(NcsError::NoMemory(_))
        ));
        assert!(interface.connections().is_empty());

        hub.set_fail_open(false);
        assert_eq!(interface.create_client_session(&gyro(10.0)), Ok(0));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);
        assert!(matches!(
            interface.create_client_session(&gyro(0.0)),
            Err(NcsError::InvalidArgument(_))
        ));
        assert!(matches!(
            interface.create_client_session(&SensorConfig::new(SensorKind::GyroCal, 10.0)),
            Err(NcsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_calibration_bias_applied() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);
        let slot = interface.create_client_session(&gyro(20.0)).unwrap();

        assert_eq!(
            hub.emit_calibration(SensorKind::GyroCal, [0.25, 0.0, 0.0], SampleStatus::AccuracyHigh),
            1
        );
        assert!(interface.connection_info(slot).unwrap().calibrated);
        hub.emit_sample(SensorKind::Gyro, TICK, vec![1.0, 2.0, 3.0]);
        match interface.get_last_n_samples(slot, 1).unwrap().get(0).unwrap() {
            Sample::Gyro(s) => assert_eq!((s.x, s.y, s.z), (0.75, 2.0, 3.0)),
            other => panic!("unexpected sample {:?}", other),
        }

        hub.emit_calibration(SensorKind::GyroCal, [0.25, 0.0, 0.0], SampleStatus::Unreliable);
        assert!(!interface.connection_info(slot).unwrap().calibrated);
        hub.emit_sample(SensorKind::Gyro, 2 * TICK, vec![1.0, 2.0, 3.0]);
        match interface.get_last_n_samples(slot, 1).unwrap().get(0).unwrap() {
            Sample::Gyro(s) => assert_eq!(s.x, 1.0),
            other => panic!("unexpected sample {:?}", other),
        }
    }

    #[test]
    fn test_reset_recreates_transport() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);
        let slot = interface.create_client_session(&gyro(20.0)).unwrap();
        let (fence, mut waiter) = ChannelFence::new();
        interface.get_data_async(slot, 0, u64::MAX, fence).unwrap();
        let opened = hub.open_count();

        assert_eq!(interface.reset_connection(ResetTarget::Slot(slot)), Ok(1));
        assert_eq!(hub.open_count(), opened + 1);
        assert_eq!(hub.active_links(), 2);
        assert_eq!(hub.stream_rate(SensorKind::Gyro), Some(20.0));
        assert_eq!(waiter.try_wait(), Some(Err(NcsError::Disabled)));

        let info = interface.connection_info(slot).unwrap();
        assert_eq!(info.state, ConnectionState::Running);
        assert!(info.has_transport);
        assert_eq!(hub.emit_sample(SensorKind::Gyro, TICK, vec![0.0; 3]), 1);

        // nothing monitored
        assert_eq!(interface.reset_connection(ResetTarget::All), Ok(0));
    }

    #[test]
    fn test_reset_failure_leaves_slot_active() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);
        let slot = interface.create_client_session(&gyro(20.0)).unwrap();

        hub.set_fail_open(true);
        assert_eq!(interface.reset_connection(ResetTarget::Slot(slot)), Ok(0));
        let info = interface.connection_info(slot).unwrap();
        assert!(info.state.is_active());
        assert!(!info.has_transport);

        hub.set_fail_open(false);
        assert_eq!(interface.reset_connection(ResetTarget::Slot(slot)), Ok(1));
        assert!(interface.connection_info(slot).unwrap().has_transport);
    }

    #[test]
    fn test_silent_connection_scheduled_for_reset() {
        let hub = SimulatedHub::new();
        let jobs = Arc::new(JobQueue::new());
        jobs.start();
        let interface = SensorInterface::new(
            Arc::new(hub.clone()),
            jobs.clone(),
            InterfaceConfig::fast_test(),
        )
        .unwrap();
        interface.probe();

        let gyro_slot = interface.create_client_session(&gyro(20.0)).unwrap();
        let accel_slot = interface
            .create_client_session(&SensorConfig::new(SensorKind::Accelerometer, 20.0))
            .unwrap();
        std::thread::sleep(Duration::from_millis(80));

        hub.emit_sample(SensorKind::Gyro, TICK, vec![0.0; 3]);
        assert_eq!(
            interface.connection_info(accel_slot).unwrap().state,
            ConnectionState::TimedOut
        );
        assert_eq!(
            interface.connection_info(gyro_slot).unwrap().state,
            ConnectionState::Running
        );
        assert_eq!(jobs.pending(), 1);

        // at most one reset per timeout window
        hub.emit_sample(SensorKind::Gyro, 2 * TICK, vec![0.0; 3]);
        assert_eq!(jobs.pending(), 1);

        hub.emit_sample(SensorKind::Accelerometer, TICK, vec![0.0, 0.0, 9.8]);
        assert_eq!(
            interface.connection_info(accel_slot).unwrap().state,
            ConnectionState::Running
        );
    }

    #[test]
    fn test_accessor_pool_exhausted() {
        let hub = SimulatedHub::new();
        let interface = setup_with(
            &hub,
            InterfaceConfig {
                accessor_pool_len: 2,
                ..quiet_config()
            },
        );
        let slot = interface.create_client_session(&gyro(20.0)).unwrap();
        fill(&interface, &hub, 1..=5);

        let a = interface.get_last_n_samples(slot, 2).unwrap();
        let _b = interface.get_last_n_samples(slot, 2).unwrap();
        assert!(matches!(
            interface.get_last_n_samples(slot, 2),
            Err(NcsError::NoMemory(_))
        ));
        drop(a);
        assert!(interface.get_last_n_samples(slot, 2).is_ok());
    }

    #[test]
    fn test_unknown_source_and_garbage_ignored() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);
        interface.dispatch(&[0xff, 0x13, 0x37]);
        assert!(matches!(
            interface.fill_sensor_data(SensorUid::new(1, 2), 0, &[0.0; 3]),
            Err(NcsError::InvalidArgument(_))
        ));

        interface.create_client_session(&gyro(20.0)).unwrap();
        let suid = hub.suid(SensorKind::Gyro).unwrap();
        assert!(matches!(
            interface.fill_sensor_data(suid, 0, &[]),
            Err(NcsError::NotFound(_))
        ));
    }

    #[test]
    fn test_shutdown_fails_pending_and_closes_links() {
        let hub = SimulatedHub::new();
        let interface = setup(&hub);
        let slot = interface.create_client_session(&gyro(20.0)).unwrap();
        let (fence, mut waiter) = ChannelFence::new();
        interface.get_data_async(slot, 0, u64::MAX, fence).unwrap();

        interface.shutdown();
        assert_eq!(waiter.try_wait(), Some(Err(NcsError::Disabled)));
        assert_eq!(hub.active_links(), 0);
        assert!(matches!(
            interface.create_client_session(&gyro(20.0)),
            Err(NcsError::InvalidState(_))
        ));
        // idempotent
        interface.shutdown();
    }
}
