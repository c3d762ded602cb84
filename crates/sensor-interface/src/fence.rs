//! Completion fences for asynchronous reads
//!
//! The interface calls `attach` before queueing a request, then exactly one
//! `signal` followed by one `release` when the request completes or is
//! drained.

use parking_lot::Mutex;
use sensor_protocol::{NcsError, NcsResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Outcome delivered to a fence
pub type CompletionStatus = Result<(), NcsError>;

/// Caller-provided completion handle
pub trait Fence: Send + Sync {
    /// Take a reference before the request is queued
    fn attach(&self) -> NcsResult<()>;
    /// Deliver the outcome; called exactly once
    fn signal(&self, status: CompletionStatus);
    /// Drop the reference taken by `attach`; always after `signal`
    fn release(&self);
}

/// Single-use fence backed by a oneshot channel
pub struct ChannelFence {
    sender: Mutex<Option<oneshot::Sender<CompletionStatus>>>,
    attached: AtomicBool,
    released: AtomicBool,
}

impl ChannelFence {
    /// Create a fence and the waiter that observes it
    pub fn new() -> (Arc<Self>, FenceWaiter) {
        let (tx, rx) = oneshot::channel();
        let fence = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
            attached: AtomicBool::new(false),
            released: AtomicBool::new(false),
        });
        (fence, FenceWaiter { receiver: rx })
    }

    /// Whether `release` has been called
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Fence for ChannelFence {
    fn attach(&self) -> NcsResult<()> {
        if self.attached.swap(true, Ordering::SeqCst) {
            return Err(NcsError::InvalidState("fence already attached".to_string()));
        }
        Ok(())
    }

    fn signal(&self, status: CompletionStatus) {
        if let Some(tx) = self.sender.lock().take() {
            if tx.send(status).is_err() {
                debug!("Fence waiter dropped before completion");
            }
        }
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        // unsignaled release still wakes the waiter
        self.sender.lock().take();
    }
}

/// Receiving side of a [`ChannelFence`]
pub struct FenceWaiter {
    receiver: oneshot::Receiver<CompletionStatus>,
}

impl FenceWaiter {
    /// Await completion
    pub async fn wait(self) -> CompletionStatus {
        self.receiver.await.unwrap_or(Err(NcsError::Disabled))
    }

    /// Block the current (non-async) thread until completion
    pub fn blocking_wait(self) -> CompletionStatus {
        self.receiver.blocking_recv().unwrap_or(Err(NcsError::Disabled))
    }

    /// Poll without blocking
    pub fn try_wait(&mut self) -> Option<CompletionStatus> {
        match self.receiver.try_recv() {
            Ok(status) => Some(status),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(NcsError::Disabled)),
        }
    }
}
