//! Job queue between ingestion callbacks and the poll thread
//!
//! Producers push jobs (or a bare heartbeat) and signal the condition
//! variable; the single consumer waits with a timeout. A timeout means no
//! ingestion happened anywhere during the window.

use parking_lot::{Condvar, Mutex, MutexGuard};
use sensor_protocol::{NcsError, NcsResult};
use std::collections::VecDeque;
use std::sync::mpsc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Connections targeted by a reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTarget {
    /// Every monitored active connection
    All,
    /// One connection slot
    Slot(usize),
}

/// Acknowledges a flush back to the waiting caller
#[derive(Debug)]
pub struct FlushAck(mpsc::SyncSender<()>);

impl FlushAck {
    fn acknowledge(self) {
        // waiter may have timed out already
        let _ = self.0.try_send(());
    }
}

/// Work item for the poll thread
#[derive(Debug)]
pub enum Job {
    /// Stop the poll loop and acknowledge
    Flush(FlushAck),
    /// Recreate the transport of the targeted connections
    ResetConnection(ResetTarget),
}

impl Job {
    /// Flush job plus the receiver its acknowledgement arrives on
    pub fn flush() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::sync_channel(1);
        (Job::Flush(FlushAck(tx)), rx)
    }
}

/// Result of one [`JobQueue::poll`] round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Woken by a job or heartbeat
    Processed,
    /// Nothing arrived within the timeout
    TimedOut,
    /// Queue no longer running
    Stopped,
}

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    running: bool,
    signaled: bool,
}

/// Mutex + condvar protected job FIFO
#[derive(Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept jobs from now on
    pub fn start(&self) {
        let mut state = self.state.lock();
        state.running = true;
        state.signaled = false;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Queue a job; fails with `InvalidState` when the consumer is not running
    pub fn enqueue(&self, job: Job) -> NcsResult<()> {
        let mut state = self.state.lock();
        if !state.running {
            return Err(NcsError::InvalidState("poll thread not running".to_string()));
        }
        state.jobs.push_back(job);
        state.signaled = true;
        self.available.notify_one();
        Ok(())
    }

    /// Wake the consumer without a job, restarting its timeout window
    pub fn heartbeat(&self) {
        let mut state = self.state.lock();
        if state.running {
            state.signaled = true;
            self.available.notify_one();
        }
    }

    /// Wait up to `timeout` for a signal and run queued jobs.
    ///
    /// Resets are dispatched with the queue lock released. A flush stops the
    /// queue and leaves later jobs for [`JobQueue::stop`] to collect.
    pub fn poll(&self, timeout: Duration, mut reset: impl FnMut(ResetTarget)) -> PollOutcome {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        while !state.signaled && state.running {
            if self.available.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        if !state.running {
            return PollOutcome::Stopped;
        }
        if !state.signaled {
            return PollOutcome::TimedOut;
        }

        state.signaled = false;
        while let Some(job) = state.jobs.pop_front() {
            match job {
                Job::Flush(ack) => {
                    debug!("Poll thread flushed");
                    state.running = false;
                    ack.acknowledge();
                    break;
                }
                Job::ResetConnection(target) => {
                    MutexGuard::unlocked(&mut state, || reset(target));
                }
            }
        }

        if state.running {
            PollOutcome::Processed
        } else {
            PollOutcome::Stopped
        }
    }

    /// Stop the queue and hand back jobs nobody ran
    pub fn stop(&self) -> Vec<Job> {
        let mut state = self.state.lock();
        state.running = false;
        state.signaled = false;
        self.available.notify_all();
        state.jobs.drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().jobs.len()
    }
}
