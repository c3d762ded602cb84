//! Poll thread
//!
//! Runs queued connection resets and, when no ingestion at all happened
//! for a whole poll window, resets every monitored connection.

use sensor_interface::{JobQueue, PollOutcome, ResetTarget, SensorInterface};
use sensor_protocol::{NcsError, NcsResult};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

pub(crate) fn spawn(
    jobs: Arc<JobQueue>,
    interface: Arc<SensorInterface>,
    timeout: Duration,
) -> NcsResult<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("ncs-poll".to_string())
        .spawn(move || run(&jobs, &interface, timeout))
        .map_err(|e| NcsError::NoMemory(format!("poll thread: {}", e)))
}

fn run(jobs: &JobQueue, interface: &SensorInterface, timeout: Duration) {
    info!("Poll thread started ({:?} window)", timeout);
    loop {
        match jobs.poll(timeout, |target| reset(interface, target)) {
            PollOutcome::Processed => {}
            PollOutcome::TimedOut => {
                warn!("No sensor activity for {:?}, resetting monitored connections", timeout);
                reset(interface, ResetTarget::All);
            }
            PollOutcome::Stopped => break,
        }
    }
    info!("Poll thread stopped");
}

fn reset(interface: &SensorInterface, target: ResetTarget) {
    match interface.reset_connection(target) {
        Ok(count) => debug!("Reset {:?} recreated {} connections", target, count),
        Err(e) => warn!("Reset {:?} failed: {}", target, e),
    }
}
