//! Sample accessors handed out by synchronous reads

use crate::interface::Shared;
use ring_buffer::{RingView, SampleSpan};
use sensor_protocol::{NcsError, NcsResult, Sample, SensorKind};
use std::sync::Weak;

/// Bounded budget of outstanding accessors
#[derive(Debug)]
pub(crate) struct AccessorPool {
    capacity: usize,
    outstanding: usize,
}

impl AccessorPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            outstanding: 0,
        }
    }

    pub fn acquire(&mut self) -> NcsResult<()> {
        if self.outstanding >= self.capacity {
            return Err(NcsError::NoMemory(format!(
                "all {} sample accessors in use",
                self.capacity
            )));
        }
        self.outstanding += 1;
        Ok(())
    }

    pub fn release(&mut self) {
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    pub fn available(&self) -> usize {
        self.capacity - self.outstanding
    }
}

/// Where a dropped accessor returns to
pub(crate) struct AccessorLease {
    pub shared: Weak<Shared>,
    pub slot: usize,
    pub generation: u64,
    /// Whether this accessor holds one of the ring's lock counts
    pub locked: bool,
}

/// Read-only window onto a connection's buffered samples.
///
/// While alive it keeps the producer from overwriting the window when the
/// window reaches the write cursor. Dropping it unlocks the ring and returns
/// the accessor to the pool.
pub struct SampleAccessor {
    kind: SensorKind,
    span: SampleSpan,
    view: RingView,
    lease: Option<AccessorLease>,
}

impl SampleAccessor {
    pub(crate) fn new(kind: SensorKind, span: SampleSpan, view: RingView, lease: AccessorLease) -> Self {
        Self {
            kind,
            span,
            view,
            lease: Some(lease),
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Ring slots covered
    pub fn span(&self) -> SampleSpan {
        self.span
    }

    pub fn len(&self) -> usize {
        self.span.len()
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }

    /// `index`-th sample of the window, oldest first
    pub fn get(&self, index: usize) -> NcsResult<Sample> {
        if index >= self.len() {
            return Err(NcsError::InvalidArgument(format!(
                "sample {} of {}",
                index,
                self.len()
            )));
        }
        self.view
            .sample_at((self.span.start + index) % self.span.capacity)
    }

    /// Decode the whole window, oldest first
    pub fn samples(&self) -> NcsResult<Vec<Sample>> {
        self.view.read_span(&self.span)
    }

    /// Whether this accessor pinned the producer
    pub fn holds_lock(&self) -> bool {
        self.lease.as_ref().map_or(false, |lease| lease.locked)
    }
}

impl Drop for SampleAccessor {
    fn drop(&mut self) {
        if let Some(lease) = self.lease.take() {
            if let Some(shared) = lease.shared.upgrade() {
                shared.return_accessor(lease.slot, lease.generation, lease.locked);
            }
        }
    }
}
