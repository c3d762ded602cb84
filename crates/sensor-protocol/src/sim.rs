//! Simulated Sensor Hub
//!
//! In-process [`TransportFactory`] used by tests and the simulator binary.
//! It answers lookups and attribute queries, tracks which streams each
//! transport configured, and delivers injected or generated samples.

use crate::error::{NcsError, NcsResult};
use crate::kind::{KindSet, SensorKind};
use crate::message::{Attribute, Event, EventMessage, Request, SampleStatus, SensorUid};
use crate::transport::{EventHandler, Transport, TransportFactory};
use crate::TIMER_FREQUENCY_HZ;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Requests kept for inspection; older ones are discarded
pub const REQUEST_LOG_LEN: usize = 256;

/// A source exposed by the simulated hub
#[derive(Debug, Clone)]
pub struct SimSensor {
    pub kind: SensorKind,
    pub suid: SensorUid,
    pub attributes: Vec<Attribute>,
}

impl SimSensor {
    /// Source with a deterministic uid and typical IMU attributes
    pub fn standard(kind: SensorKind) -> Self {
        Self {
            kind,
            suid: SensorUid::new(0x5eed_0000 + kind.index() as u64, 0xabcd),
            attributes: if kind.is_calibration_source() {
                Vec::new()
            } else {
                vec![
                    Attribute::Rates(vec![5.0, 10.0, 25.0, 50.0, 100.0, 200.0, 400.0]),
                    Attribute::Resolutions(vec![0.001]),
                    Attribute::Ranges(vec![(-34.9, 34.9)]),
                ]
            },
        }
    }
}

struct Link {
    handler: Arc<dyn EventHandler>,
    /// suid -> configured rate
    streams: HashMap<SensorUid, f32>,
    calibration: Vec<SensorUid>,
}

#[derive(Default)]
struct HubState {
    sensors: Vec<SimSensor>,
    absent: KindSet,
    fail_open: bool,
    silent: bool,
    links: HashMap<u64, Link>,
    next_link: u64,
    opened: usize,
    requests: VecDeque<Request>,
}

impl HubState {
    fn sensor_by_suid(&self, suid: SensorUid) -> Option<&SimSensor> {
        self.sensors.iter().find(|s| s.suid == suid)
    }

    fn suid_of(&self, kind: SensorKind) -> Option<SensorUid> {
        self.sensors.iter().find(|s| s.kind == kind).map(|s| s.suid)
    }
}

struct HubInner {
    state: Mutex<HubState>,
    epoch: Instant,
}

type Delivery = (Arc<dyn EventHandler>, Vec<u8>);

impl HubInner {
    fn now_ticks(&self) -> u64 {
        let nanos = self.epoch.elapsed().as_nanos();
        (nanos * TIMER_FREQUENCY_HZ as u128 / 1_000_000_000) as u64
    }

    fn handle_request(&self, link_id: u64, request: Request) -> NcsResult<Vec<Delivery>> {
        let mut state = self.state.lock();
        if state.requests.len() == REQUEST_LOG_LEN {
            state.requests.pop_front();
        }
        state.requests.push_back(request.clone());

        let handler = match state.links.get(&link_id) {
            Some(link) => link.handler.clone(),
            None => return Err(NcsError::Transport("transport closed".to_string())),
        };

        let reply = match request {
            Request::Lookup { datatype } => {
                let kind = SensorKind::from_datatype(&datatype);
                if kind.map_or(false, |k| state.absent.contains(k)) {
                    debug!("Simulated hub ignoring lookup for {}", datatype);
                    None
                } else {
                    let suids: Vec<_> = state
                        .sensors
                        .iter()
                        .filter(|s| Some(s.kind) == kind)
                        .map(|s| s.suid)
                        .collect();
                    if suids.is_empty() {
                        None
                    } else {
                        Some(EventMessage::new(
                            SensorUid::default(),
                            vec![Event::LookupResult { datatype, suids }],
                        ))
                    }
                }
            }
            Request::Attributes { suid } => state
                .sensor_by_suid(suid)
                .map(|s| EventMessage::new(suid, vec![Event::Attributes(s.attributes.clone())])),
            Request::Config {
                suid, sample_rate, ..
            } => {
                if let Some(link) = state.links.get_mut(&link_id) {
                    link.streams.insert(suid, sample_rate);
                }
                Some(EventMessage::new(
                    suid,
                    vec![Event::PhysicalConfig { sample_rate }],
                ))
            }
            Request::Calibration { suid } => {
                if let Some(link) = state.links.get_mut(&link_id) {
                    link.calibration.push(suid);
                }
                None
            }
            Request::Disable { suid } => {
                if let Some(link) = state.links.get_mut(&link_id) {
                    link.streams.remove(&suid);
                }
                None
            }
        };

        match reply {
            Some(message) => Ok(vec![(handler, message.encode()?)]),
            None => Ok(Vec::new()),
        }
    }
}

fn deliver(deliveries: Vec<Delivery>) -> usize {
    let count = deliveries.len();
    for (handler, payload) in deliveries {
        handler.on_event(&payload);
    }
    count
}

/// In-process sensor hub
#[derive(Clone)]
pub struct SimulatedHub {
    inner: Arc<HubInner>,
}

impl Default for SimulatedHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHub {
    /// Hub exposing every known kind
    pub fn new() -> Self {
        Self::with_sensors(SensorKind::ALL.into_iter().map(SimSensor::standard).collect())
    }

    /// Hub exposing exactly `sensors`
    pub fn with_sensors(sensors: Vec<SimSensor>) -> Self {
        info!("Creating simulated sensor hub with {} sources", sensors.len());
        Self {
            inner: Arc::new(HubInner {
                state: Mutex::new(HubState {
                    sensors,
                    ..Default::default()
                }),
                epoch: Instant::now(),
            }),
        }
    }

    /// Stop answering lookups for `kind`
    pub fn set_absent(&self, kind: SensorKind, absent: bool) {
        let mut state = self.inner.state.lock();
        if absent {
            state.absent.insert(kind);
        } else {
            state.absent.remove(kind);
        }
    }

    /// Make subsequent `open` calls fail
    pub fn set_fail_open(&self, fail: bool) {
        self.inner.state.lock().fail_open = fail;
    }

    /// Drop all sample and calibration deliveries
    pub fn set_silent(&self, silent: bool) {
        self.inner.state.lock().silent = silent;
    }

    /// Uid of the first source of `kind`
    pub fn suid(&self, kind: SensorKind) -> Option<SensorUid> {
        self.inner.state.lock().suid_of(kind)
    }

    /// Total transports opened since creation
    pub fn open_count(&self) -> usize {
        self.inner.state.lock().opened
    }

    /// Transports currently open
    pub fn active_links(&self) -> usize {
        self.inner.state.lock().links.len()
    }

    /// Highest rate any open transport configured for `kind`
    pub fn stream_rate(&self, kind: SensorKind) -> Option<f32> {
        let state = self.inner.state.lock();
        let suid = state.suid_of(kind)?;
        state
            .links
            .values()
            .filter_map(|link| link.streams.get(&suid).copied())
            .reduce(f32::max)
    }

    /// Most recent requests received, oldest first
    pub fn requests(&self) -> Vec<Request> {
        self.inner.state.lock().requests.iter().cloned().collect()
    }

    /// Current hub time in timer ticks
    pub fn now_ticks(&self) -> u64 {
        self.inner.now_ticks()
    }

    /// Deliver one sample to every transport streaming `kind`; returns deliveries made
    pub fn emit_sample(&self, kind: SensorKind, timestamp: u64, data: Vec<f32>) -> usize {
        self.emit_event(
            kind,
            Event::Sample {
                timestamp,
                data,
                status: SampleStatus::AccuracyHigh,
            },
        )
    }

    /// Deliver an arbitrary event to every transport streaming `kind`
    pub fn emit_event(&self, kind: SensorKind, event: Event) -> usize {
        let deliveries = {
            let state = self.inner.state.lock();
            let suid = match state.suid_of(kind) {
                Some(suid) if !state.silent => suid,
                _ => return 0,
            };
            let message = EventMessage::new(suid, vec![event]);
            let payload = match message.encode() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Simulated hub failed to encode event: {}", e);
                    return 0;
                }
            };
            state
                .links
                .values()
                .filter(|link| link.streams.contains_key(&suid))
                .map(|link| (link.handler.clone(), payload.clone()))
                .collect::<Vec<_>>()
        };
        deliver(deliveries)
    }

    /// Deliver a calibration event from `source` to every subscribed transport
    pub fn emit_calibration(&self, source: SensorKind, bias: [f32; 3], status: SampleStatus) -> usize {
        let deliveries = {
            let state = self.inner.state.lock();
            let suid = match state.suid_of(source) {
                Some(suid) if !state.silent => suid,
                _ => return 0,
            };
            let payload = match EventMessage::new(suid, vec![Event::Calibration { bias, status }]).encode() {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Simulated hub failed to encode calibration: {}", e);
                    return 0;
                }
            };
            state
                .links
                .values()
                .filter(|link| link.calibration.contains(&suid))
                .map(|link| (link.handler.clone(), payload.clone()))
                .collect::<Vec<_>>()
        };
        deliver(deliveries)
    }

    /// Spawn a generator thread producing samples for every configured stream
    pub fn start_streaming(&self, tick: Duration) -> StreamHandle {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let hub = self.clone();

        let handle = std::thread::spawn(move || {
            info!("Simulated hub streaming every {:?}", tick);
            let mut next_due: HashMap<(u64, SensorUid), u64> = HashMap::new();
            let mut phase = 0f32;

            while !shutdown_clone.load(Ordering::SeqCst) {
                let now = hub.now_ticks();
                let deliveries = hub.collect_due(now, &mut next_due, phase);
                deliver(deliveries);
                phase += 0.05;
                std::thread::sleep(tick);
            }
            debug!("Simulated hub streaming stopped");
        });

        StreamHandle {
            shutdown,
            handle: Some(handle),
        }
    }

    fn collect_due(
        &self,
        now: u64,
        next_due: &mut HashMap<(u64, SensorUid), u64>,
        phase: f32,
    ) -> Vec<Delivery> {
        let state = self.inner.state.lock();
        if state.silent {
            return Vec::new();
        }

        let mut deliveries = Vec::new();
        for (id, link) in &state.links {
            for (suid, rate) in &link.streams {
                let Some(sensor) = state.sensor_by_suid(*suid) else {
                    continue;
                };
                let period = (TIMER_FREQUENCY_HZ as f64 / *rate as f64).max(1.0) as u64;
                let due = next_due.entry((*id, *suid)).or_insert(now);

                let mut events = Vec::new();
                while *due <= now {
                    events.push(Event::Sample {
                        timestamp: *due,
                        data: synthetic_values(sensor.kind, phase),
                        status: SampleStatus::AccuracyHigh,
                    });
                    *due += period;
                }
                if events.is_empty() {
                    continue;
                }
                match EventMessage::new(*suid, events).encode() {
                    Ok(payload) => deliveries.push((link.handler.clone(), payload)),
                    Err(e) => warn!("Simulated hub failed to encode batch: {}", e),
                }
            }
        }
        next_due.retain(|(id, suid), _| {
            state
                .links
                .get(id)
                .map_or(false, |link| link.streams.contains_key(suid))
        });
        deliveries
    }
}

fn synthetic_values(kind: SensorKind, phase: f32) -> Vec<f32> {
    let wave = phase.sin();
    match kind {
        SensorKind::Gravity => vec![0.0, 0.0, 9.81, wave * 0.1, 0.0, 0.0],
        SensorKind::Accelerometer => vec![wave * 0.2, 0.0, 9.81],
        _ => vec![wave * 0.01, phase.cos() * 0.01, 0.0],
    }
}

impl TransportFactory for SimulatedHub {
    fn open(&self, handler: Arc<dyn EventHandler>) -> NcsResult<Box<dyn Transport>> {
        let mut state = self.inner.state.lock();
        if state.fail_open {
            return Err(NcsError::Transport("simulated open failure".to_string()));
        }
        let id = state.next_link;
        state.next_link += 1;
        state.opened += 1;
        state.links.insert(
            id,
            Link {
                handler,
                streams: HashMap::new(),
                calibration: Vec::new(),
            },
        );
        debug!("Simulated hub opened link {}", id);

        Ok(Box::new(SimTransport {
            id,
            hub: Arc::downgrade(&self.inner),
        }))
    }
}

struct SimTransport {
    id: u64,
    hub: Weak<HubInner>,
}

impl Transport for SimTransport {
    fn send(&self, request: &[u8]) -> NcsResult<()> {
        let hub = self
            .hub
            .upgrade()
            .ok_or_else(|| NcsError::Transport("hub gone".to_string()))?;
        let request = Request::decode(request)?;
        let deliveries = hub.handle_request(self.id, request)?;
        deliver(deliveries);
        Ok(())
    }
}

impl Drop for SimTransport {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.state.lock().links.remove(&self.id);
            debug!("Simulated hub closed link {}", self.id);
        }
    }
}

/// Generator thread handle; stops and joins on drop
pub struct StreamHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamHandle {
    pub fn stop(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Simulated hub generator panicked");
            }
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.join();
    }
}
