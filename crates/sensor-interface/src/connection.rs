//! Connection table entries

use crate::fence::{CompletionStatus, Fence};
use ring_buffer::SampleRing;
use sensor_protocol::{SensorConfig, SensorKind, SensorUid, Transport};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle state of a connection slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Stopped,
    Running,
    /// Running but silent past the health timeout; a reset is scheduled
    TimedOut,
}

impl ConnectionState {
    /// Running or merely labelled timed out
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Running | ConnectionState::TimedOut)
    }
}

/// Queued asynchronous read
pub(crate) struct PendingRequest {
    t_start: u64,
    t_end: u64,
    fence: Arc<dyn Fence>,
}

impl PendingRequest {
    pub(crate) fn new(t_start: u64, t_end: u64, fence: Arc<dyn Fence>) -> Self {
        Self { t_start, t_end, fence }
    }

    fn is_ready(&self, now: u64) -> bool {
        self.t_start <= now && self.t_end <= now
    }

    fn complete(self, status: CompletionStatus) {
        let outcome = if status.is_ok() { "ok" } else { "error" };
        self.fence.signal(status);
        self.fence.release();
        metrics::counter!("ncs_async_requests_completed_total", "status" => outcome).increment(1);
    }
}

/// Requests whose fences fire once dropped.
///
/// Declared before the state guard so that it drops after the guard, which
/// keeps fence callbacks outside the interface lock.
#[derive(Default)]
pub(crate) struct Completions(Vec<(PendingRequest, CompletionStatus)>);

impl Completions {
    fn push(&mut self, request: PendingRequest, status: CompletionStatus) {
        self.0.push((request, status));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

impl Drop for Completions {
    fn drop(&mut self) {
        for (request, status) in self.0.drain(..) {
            request.complete(status);
        }
    }
}

/// Cached calibration bias; an invalid bias is kept but not applied
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Calibration {
    pub bias: [f32; 3],
    pub valid: bool,
}

/// One slot of the connection table
#[derive(Default)]
pub(crate) struct SensorConnection {
    /// `None` marks a free slot
    pub kind: Option<SensorKind>,
    pub suid: SensorUid,
    pub calib_suid: Option<SensorUid>,
    pub transport: Option<Arc<dyn Transport>>,
    pub ring: Option<SampleRing>,
    pub state: ConnectionState,
    /// Negotiated configuration
    pub config: Option<SensorConfig>,
    pub clients: usize,
    pub pending: VecDeque<PendingRequest>,
    pub last_seen: Option<Instant>,
    pub monitored: bool,
    pub calibration: Calibration,
    /// Bumped whenever ring contents are discarded
    pub generation: u64,
}

impl SensorConnection {
    pub fn is_free(&self) -> bool {
        self.kind.is_none()
    }

    pub fn sampling_rate(&self) -> f32 {
        self.config.as_ref().map_or(0.0, |c| c.sampling_rate)
    }

    /// Complete ready requests; on error complete all of them
    pub fn trigger_fences(&mut self, status: CompletionStatus, now: u64, done: &mut Completions) {
        if status.is_err() {
            self.drain_pending(status, done);
            return;
        }
        let mut waiting = VecDeque::with_capacity(self.pending.len());
        while let Some(request) = self.pending.pop_front() {
            if request.is_ready(now) {
                done.push(request, Ok(()));
            } else {
                waiting.push_back(request);
            }
        }
        self.pending = waiting;
    }

    /// Force-complete every queued request with `status`
    pub fn drain_pending(&mut self, status: CompletionStatus, done: &mut Completions) {
        for request in self.pending.drain(..) {
            done.push(request, status.clone());
        }
    }

    /// Return the slot to the free state, handing back its transport
    pub fn clear(&mut self) -> Option<Arc<dyn Transport>> {
        let generation = self.generation + 1;
        let transport = self.transport.take();
        *self = SensorConnection {
            generation,
            ..Default::default()
        };
        transport
    }
}
