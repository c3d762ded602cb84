//! Sample Ring Implementation

use crate::span::SampleSpan;
use parking_lot::RwLock;
use sensor_protocol::{codec, NcsError, NcsResult, Sample, SampleCodec, SensorKind};
use std::fmt;
use std::sync::Arc;

type Storage = Arc<RwLock<Box<[u8]>>>;

/// Circular store of fixed-stride samples for one connection
pub struct SampleRing {
    /// Kind of every stored sample
    kind: SensorKind,
    /// Per-kind record codec
    codec: &'static SampleCodec,
    /// `capacity * stride` bytes, shared with outstanding readers
    storage: Storage,
    /// Number of sample slots
    capacity: usize,
    /// Next slot to fill
    cursor: usize,
    /// Cursor has passed the last slot at least once
    wrapped: bool,
    /// Outstanding reader spans that cover the cursor
    lock_count: u32,
    /// Timer ticks between consecutive samples
    tick_period: u64,
}

impl SampleRing {
    /// Create a ring holding `window_secs` of samples at `sampling_rate`
    pub fn new(
        kind: SensorKind,
        sampling_rate: f32,
        window_secs: u32,
        timer_hz: u64,
    ) -> NcsResult<Self> {
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(NcsError::InvalidArgument(format!(
                "sampling rate {} for {}",
                sampling_rate, kind
            )));
        }
        let capacity = (sampling_rate as usize).max(1) * window_secs.max(1) as usize;
        let tick_period = (timer_hz as f64 / sampling_rate as f64).max(1.0) as u64;
        Self::with_capacity(kind, capacity, tick_period)
    }

    /// Create a ring with an explicit slot count
    pub fn with_capacity(kind: SensorKind, capacity: usize, tick_period: u64) -> NcsResult<Self> {
        let codec = codec(kind).ok_or_else(|| NcsError::Unsupported(kind.to_string()))?;
        if capacity == 0 {
            return Err(NcsError::InvalidArgument("ring capacity 0".to_string()));
        }
        let bytes = capacity
            .checked_mul(codec.stride)
            .ok_or_else(|| NcsError::NoMemory(format!("{} x {} ring", capacity, kind)))?;

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(bytes)
            .map_err(|e| NcsError::NoMemory(format!("{} ring of {} bytes: {}", kind, bytes, e)))?;
        storage.resize(bytes, 0u8);

        Ok(Self {
            kind,
            codec,
            storage: Arc::new(RwLock::new(storage.into_boxed_slice())),
            capacity,
            cursor: 0,
            wrapped: false,
            lock_count: 0,
            tick_period: tick_period.max(1),
        })
    }

    /// Store one sample at the cursor and advance it.
    ///
    /// Returns the slot written, or `ReadOnly` while any reader lock is held.
    pub fn write(&mut self, sample: &Sample) -> NcsResult<usize> {
        if self.lock_count > 0 {
            return Err(NcsError::ReadOnly);
        }

        let stride = self.codec.stride;
        let offset = self.cursor * stride;
        {
            let mut storage = self.storage.write();
            self.codec.encode(sample, &mut storage[offset..offset + stride])?;
        }

        let written = self.cursor;
        self.cursor += 1;
        if self.cursor == self.capacity {
            self.cursor = 0;
            self.wrapped = true;
        }
        Ok(written)
    }

    /// Take a reader lock if `[start, end]` covers the cursor.
    ///
    /// Returns whether the lock count was incremented.
    pub fn lock(&mut self, start: usize, end: usize) -> bool {
        if SampleSpan::new(start, end, self.capacity).contains(self.cursor) {
            self.lock_count += 1;
            true
        } else {
            false
        }
    }

    /// Drop one reader lock
    pub fn unlock(&mut self) {
        self.lock_count = self.lock_count.saturating_sub(1);
    }

    /// Timestamp of the sample stored at `index`
    pub fn timestamp_at(&self, index: usize) -> NcsResult<u64> {
        if index >= self.len() {
            return Err(NcsError::NotFound(format!(
                "{} slot {} not written",
                self.kind, index
            )));
        }
        let stride = self.codec.stride;
        let storage = self.storage.read();
        self.codec
            .timestamp(&storage[index * stride..(index + 1) * stride])
    }

    /// Span ending at the newest sample with timestamp <= `t_end`, long
    /// enough to cover `t_end - t_start` at the current tick period.
    pub fn select_range(&self, t_start: u64, t_end: u64) -> NcsResult<SampleSpan> {
        if t_start > t_end {
            return Err(NcsError::InvalidArgument(format!(
                "range start {} after end {}",
                t_start, t_end
            )));
        }

        let valid = self.len();
        let mut found = None;
        for step in 0..valid {
            let index = (self.cursor + self.capacity - 1 - step) % self.capacity;
            if self.timestamp_at(index)? <= t_end {
                found = Some((index, step));
                break;
            }
        }
        let (end, newer) = found.ok_or(NcsError::NoMoreData(t_end))?;

        let wanted = (t_end - t_start).div_ceil(self.tick_period) + 1;
        let available = (valid - newer) as u64;
        let count = wanted.min(available) as usize;
        let start = (end + self.capacity + 1 - count) % self.capacity;
        Ok(SampleSpan::new(start, end, self.capacity))
    }

    /// Span over the newest `n` samples
    pub fn select_last_n(&self, n: usize) -> NcsResult<SampleSpan> {
        if n == 0 {
            return Err(NcsError::InvalidArgument("zero samples requested".to_string()));
        }
        let valid = self.len();
        if n > valid {
            return Err(NcsError::NotEnoughData {
                requested: n,
                available: valid,
            });
        }
        let end = (self.cursor + self.capacity - 1) % self.capacity;
        let start = (self.cursor + self.capacity - n) % self.capacity;
        Ok(SampleSpan::new(start, end, self.capacity))
    }

    /// Timestamp of the newest sample, if any
    pub fn latest_timestamp(&self) -> Option<u64> {
        if self.is_empty() {
            return None;
        }
        self.timestamp_at((self.cursor + self.capacity - 1) % self.capacity)
            .ok()
    }

    /// Return to the empty state and zero the storage
    pub fn reset(&mut self) {
        self.storage.write().fill(0);
        self.cursor = 0;
        self.wrapped = false;
        self.lock_count = 0;
    }

    /// Read handle onto the storage for use outside the owner's lock
    pub fn view(&self) -> RingView {
        RingView {
            storage: self.storage.clone(),
            codec: self.codec,
            capacity: self.capacity,
        }
    }

    /// Number of valid samples
    pub fn len(&self) -> usize {
        if self.wrapped {
            self.capacity
        } else {
            self.cursor
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stride(&self) -> usize {
        self.codec.stride
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }

    pub fn lock_count(&self) -> u32 {
        self.lock_count
    }

    pub fn tick_period(&self) -> u64 {
        self.tick_period
    }

    pub fn set_tick_period(&mut self, ticks: u64) {
        self.tick_period = ticks.max(1);
    }
}

impl fmt::Debug for SampleRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleRing")
            .field("kind", &self.kind)
            .field("capacity", &self.capacity)
            .field("cursor", &self.cursor)
            .field("wrapped", &self.wrapped)
            .field("lock_count", &self.lock_count)
            .field("tick_period", &self.tick_period)
            .finish()
    }
}

/// Shared read access to a ring's storage.
///
/// Holds the storage alive after the ring is freed; slot contents are only
/// stable while the owning ring's lock count protects them.
#[derive(Clone)]
pub struct RingView {
    storage: Storage,
    codec: &'static SampleCodec,
    capacity: usize,
}

impl RingView {
    /// Decode the sample stored at `index`
    pub fn sample_at(&self, index: usize) -> NcsResult<Sample> {
        if index >= self.capacity {
            return Err(NcsError::InvalidArgument(format!(
                "slot {} beyond capacity {}",
                index, self.capacity
            )));
        }
        let stride = self.codec.stride;
        let storage = self.storage.read();
        self.codec.decode(&storage[index * stride..(index + 1) * stride])
    }

    /// Decode every sample of `span`, oldest first
    pub fn read_span(&self, span: &SampleSpan) -> NcsResult<Vec<Sample>> {
        span.indices().map(|index| self.sample_at(index)).collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
