//! Worker thread for the fixed-size pool
//!
//! Each worker:
//! - Signals readiness once its loop is about to start
//! - Selects between the shared job channel and its private stop channel
//! - Runs each job to completion before selecting again
//!
//! ```text
//! Starting ──ready──▶ Idle ⇄ Executing
//!                      │
//!                      └──stop / jobs closed──▶ Stopped
//! ```

use crate::error::WorkerError;
use crate::pool::PoolStats;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace};

/// A unit of work: invoked exactly once by exactly one worker
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to one pool worker thread
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Private stop signal (rendezvous)
    stop: Sender<()>,

    /// Thread handle
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a worker thread
    ///
    /// The worker sends its id on `ready` right before entering its loop.
    pub(crate) fn spawn(
        id: usize,
        jobs: Receiver<Job>,
        ready: Sender<usize>,
        stats: Arc<PoolStats>,
    ) -> Result<Self, WorkerError> {
        let (stop_tx, stop_rx) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name(format!("churn-worker-{}", id))
            .spawn(move || worker_loop(id, jobs, stop_rx, ready, stats))
            .map_err(|e| WorkerError::InitFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            stop: stop_tx,
            handle: Some(handle),
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Deliver the stop signal, blocking until the worker takes it
    ///
    /// A worker in the middle of a job takes the signal once the job returns.
    /// Returns `false` if the worker had already exited.
    pub(crate) fn signal_stop(&self) -> bool {
        self.stop.send(()).is_ok()
    }

    /// Wait for the worker thread to exit
    pub(crate) fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| WorkerError::Panicked {
                id: self.id,
                message: "Worker thread panicked".into(),
            }),
            None => Ok(()),
        }
    }
}

fn worker_loop(
    id: usize,
    jobs: Receiver<Job>,
    stop: Receiver<()>,
    ready: Sender<usize>,
    stats: Arc<PoolStats>,
) {
    stats.record_worker_started();

    // Constructor may have given up waiting; nothing to report then
    let _ = ready.send(id);
    drop(ready);

    debug!(worker = id, "Worker ready");

    loop {
        select! {
            recv(jobs) -> job => match job {
                Ok(job) => run_job(id, job, &stats),
                Err(_) => {
                    trace!(worker = id, "Job channel closed");
                    break;
                }
            },
            recv(stop) -> _ => break,
        }
    }

    stats.record_worker_stopped();
    debug!(worker = id, "Worker stopped");
}

fn run_job(id: usize, job: Job, stats: &PoolStats) {
    trace!(worker = id, "Executing job");

    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        stats.record_panic();
        error!(worker = id, "Job panicked");
    }

    stats.record_completed();
}
