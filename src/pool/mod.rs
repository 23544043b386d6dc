//! Fixed-size worker pool
//!
//! `size` OS threads share one rendezvous job channel. There is no queue:
//! `submit` hands a job directly to an idle worker and blocks the caller
//! while every worker is busy. That blocking is the only backpressure.
//!
//! ```text
//!              submit()                 ┌──────────┐
//!   control ──────────▶ jobs (cap 0) ──▶│ Worker 0 │◀── stop 0
//!   thread                    │         └──────────┘
//!                             ├────────▶│ Worker 1 │◀── stop 1
//!                             │         └──────────┘
//!                             └────────▶│ Worker N │◀── stop N
//!                                       └──────────┘
//! ```
//!
//! `stop` consumes the pool, so stopping twice does not compile. It only
//! guarantees that every worker terminates. Workers are not asked to drain
//! anything: a job that was never handed over is dropped with the channel.

mod worker;

pub use worker::{Job, Worker};

use crate::error::WorkerError;
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters shared between the pool and its workers
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Workers currently inside their loop
    live_workers: AtomicUsize,

    /// Jobs handed to a worker
    submitted: AtomicU64,

    /// Jobs that returned (including ones that panicked)
    completed: AtomicU64,

    /// Jobs that panicked
    panicked: AtomicU64,
}

impl PoolStats {
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    fn record_worker_started(&self) {
        self.live_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn record_worker_stopped(&self) {
        self.live_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_panic(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fixed set of worker threads fed from one shared job channel
pub struct WorkerPool {
    /// Worker handles, owned solely by the pool
    workers: Vec<Worker>,

    /// Sender half of the job channel
    jobs: Sender<Job>,

    /// Shared counters
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Spawn `size` workers and wait until every one of them is ready
    ///
    /// When this returns, `size` workers are blocked on the job channel, so
    /// the first `submit` always has someone to hand off to.
    pub fn new(size: usize) -> Result<Self, WorkerError> {
        if size == 0 {
            return Err(WorkerError::EmptyPool);
        }

        let (jobs_tx, jobs_rx) = bounded::<Job>(0);
        let (ready_tx, ready_rx) = bounded::<usize>(size);
        let stats = Arc::new(PoolStats::default());

        let mut workers = Vec::with_capacity(size);

        for id in 0..size {
            match Worker::spawn(id, jobs_rx.clone(), ready_tx.clone(), Arc::clone(&stats)) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    warn!(worker = id, error = %e, "Worker spawn failed, stopping pool");
                    for worker in &workers {
                        worker.signal_stop();
                    }
                    for worker in workers {
                        let _ = worker.join();
                    }
                    return Err(e);
                }
            }
        }

        drop(ready_tx);

        // Startup barrier
        for _ in 0..size {
            if ready_rx.recv().is_err() {
                return Err(WorkerError::InitFailed {
                    id: stats.live_workers(),
                    reason: "worker exited before becoming ready".into(),
                });
            }
        }

        info!(count = size, "Worker pool ready");

        Ok(Self {
            workers,
            jobs: jobs_tx,
            stats,
        })
    }

    /// Number of workers
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Shared counters
    pub fn stats(&self) -> Arc<PoolStats> {
        Arc::clone(&self.stats)
    }

    /// Hand a job to an idle worker, blocking until one takes it
    ///
    /// No ordering is promised between jobs. Fails only if every worker has
    /// already exited.
    pub fn submit<F>(&self, job: F) -> Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.jobs
            .send(Box::new(job))
            .map_err(|_| WorkerError::QueueSendFailed)?;
        self.stats.record_submitted();
        Ok(())
    }

    /// Stop every worker, then close the job channel
    ///
    /// Stop signals are delivered one worker at a time; each delivery waits
    /// for that worker to finish its current job. Jobs not yet handed over
    /// are not drained.
    pub fn stop(self) {
        let Self {
            workers,
            jobs,
            stats,
        } = self;

        for worker in &workers {
            if !worker.signal_stop() {
                warn!(worker = worker.id(), "Worker already terminated");
            }
        }

        drop(jobs);

        for worker in workers {
            if let Err(e) = worker.join() {
                warn!(error = %e, "Worker failed to join cleanly");
            }
        }

        debug!(
            submitted = stats.submitted(),
            completed = stats.completed(),
            panicked = stats.panicked(),
            "Worker pool stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(WorkerError::EmptyPool)));
    }

    #[test]
    fn test_all_workers_ready_after_new() {
        for size in [1, 4, 16] {
            let pool = WorkerPool::new(size).unwrap();
            assert_eq!(pool.size(), size);
            assert_eq!(pool.stats().live_workers(), size);
            pool.stop();
        }
    }

    #[test]
    fn test_every_job_runs_once() {
        let pool = WorkerPool::new(4).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let seen = Arc::clone(&seen);
            pool.submit(move || seen.lock().unwrap().push(i)).unwrap();
        }

        let stats = pool.stats();
        pool.stop();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
        assert_eq!(stats.submitted(), 100);
        assert_eq!(stats.completed(), 100);
    }

    #[test]
    fn test_submit_blocks_while_saturated() {
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let (gate_tx, gate_rx) = bounded::<()>(0);

        pool.submit(move || {
            let _ = gate_rx.recv();
        })
        .unwrap();

        let second_accepted = Arc::new(AtomicBool::new(false));
        let submitter = {
            let pool = Arc::clone(&pool);
            let second_accepted = Arc::clone(&second_accepted);
            thread::spawn(move || {
                pool.submit(|| {}).unwrap();
                second_accepted.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!second_accepted.load(Ordering::SeqCst));

        gate_tx.send(()).unwrap();
        submitter.join().unwrap();
        assert!(second_accepted.load(Ordering::SeqCst));

        let pool = Arc::try_unwrap(pool).ok().unwrap();
        pool.stop();
    }

    #[test]
    fn test_stop_terminates_workers() {
        let pool = WorkerPool::new(3).unwrap();
        let stats = pool.stats();

        pool.submit(|| thread::sleep(Duration::from_millis(20))).unwrap();
        pool.stop();

        assert_eq!(stats.live_workers(), 0);
        assert_eq!(stats.completed(), 1);
    }

    #[test]
    fn test_stats_track_submissions() {
        let pool = WorkerPool::new(2).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.submitted(), 0);

        for _ in 0..5 {
            pool.submit(|| {}).unwrap();
        }
        assert_eq!(stats.submitted(), 5);

        pool.stop();
        assert_eq!(stats.completed(), 5);
        assert_eq!(stats.panicked(), 0);
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new(1).unwrap();
        let stats = pool.stats();
        let ran = Arc::new(AtomicBool::new(false));

        pool.submit(|| panic!("job failure")).unwrap();

        let ran_clone = Arc::clone(&ran);
        pool.submit(move || ran_clone.store(true, Ordering::SeqCst))
            .unwrap();

        assert_eq!(stats.live_workers(), 1);
        pool.stop();

        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(stats.panicked(), 1);
        assert_eq!(stats.completed(), 2);
    }
}
