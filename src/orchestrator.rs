//! Run orchestrator - builds the scope tree and feeds the worker pool
//!
//! The orchestrator is responsible for:
//! - Spawning the worker pool
//! - Creating the root scope from the global timeout
//! - Deriving one child scope per target from the file timeout, once a
//!   worker has picked the target up
//! - Submitting one job per target from the control thread
//! - Stopping the pool and reporting totals
//!
//! Submission happens on a single thread. Since the pool has no queue, the
//! loop stalls whenever every worker is busy, which caps the number of
//! targets in flight at the pool size.

use crate::config::ChurnConfig;
use crate::error::Result;
use crate::payload::IdAllocator;
use crate::pool::WorkerPool;
use crate::scope::{CancelReason, CancellationScope, Timeout};
use crate::target::{Target, WriteKind, WriteOutcome};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Counters updated by jobs while the run is in progress
#[derive(Debug, Default)]
pub struct RunStats {
    /// Targets that ran every iteration
    pub targets_completed: AtomicU64,

    /// Targets stopped early by their scope
    pub targets_timed_out: AtomicU64,

    /// Targets abandoned before their first iteration
    pub targets_aborted: AtomicU64,

    /// Files written for the first time
    pub files_created: AtomicU64,

    /// Rewrites of existing files
    pub files_updated: AtomicU64,

    /// Iterations that failed and were skipped
    pub failed_iterations: AtomicU64,

    /// Iterations never attempted because of timeout or abort
    pub skipped_iterations: AtomicU64,

    /// Bytes written across all files
    pub bytes_written: AtomicU64,
}

impl RunStats {
    fn record_write(&self, outcome: &WriteOutcome) {
        match outcome.kind {
            WriteKind::Created => self.files_created.fetch_add(1, Ordering::Relaxed),
            WriteKind::Updated => self.files_updated.fetch_add(1, Ordering::Relaxed),
        };
        self.bytes_written.fetch_add(outcome.bytes, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed_iterations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_skipped(&self, count: u64) {
        self.skipped_iterations.fetch_add(count, Ordering::Relaxed);
    }

    /// Iterations that are finished one way or another
    pub fn iterations_done(&self) -> u64 {
        self.writes() + self.failed_iterations.load(Ordering::Relaxed)
            + self.skipped_iterations.load(Ordering::Relaxed)
    }

    /// Successful writes
    pub fn writes(&self) -> u64 {
        self.files_created.load(Ordering::Relaxed) + self.files_updated.load(Ordering::Relaxed)
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub targets: u64,
    pub targets_completed: u64,
    pub targets_timed_out: u64,
    pub targets_aborted: u64,
    pub files_created: u64,
    pub files_updated: u64,
    pub failed_iterations: u64,
    pub bytes_written: u64,
    pub duration: Duration,

    /// Root scope was cancelled by hand (e.g. Ctrl-C)
    pub interrupted: bool,
}

impl RunSummary {
    fn collect(targets: u64, stats: &RunStats, duration: Duration, root: &CancellationScope) -> Self {
        Self {
            targets,
            targets_completed: stats.targets_completed.load(Ordering::Relaxed),
            targets_timed_out: stats.targets_timed_out.load(Ordering::Relaxed),
            targets_aborted: stats.targets_aborted.load(Ordering::Relaxed),
            files_created: stats.files_created.load(Ordering::Relaxed),
            files_updated: stats.files_updated.load(Ordering::Relaxed),
            failed_iterations: stats.failed_iterations.load(Ordering::Relaxed),
            bytes_written: stats.bytes_written.load(Ordering::Relaxed),
            duration,
            interrupted: root.reason() == Some(CancelReason::Cancelled),
        }
    }

    /// Successful writes
    pub fn writes(&self) -> u64 {
        self.files_created + self.files_updated
    }
}

/// Everything a job needs, cloned once per target
#[derive(Clone)]
struct JobContext {
    iterations: usize,
    file_timeout: Timeout,
    ids: Arc<IdAllocator>,
    stats: Arc<RunStats>,
}

/// Coordinates one run
pub struct Orchestrator {
    config: Arc<ChurnConfig>,
    pool: WorkerPool,
    root: CancellationScope,
    ids: Arc<IdAllocator>,
    stats: Arc<RunStats>,
}

impl Orchestrator {
    /// Spawn the pool, then start the global clock
    pub fn new(config: ChurnConfig) -> Result<Self> {
        let pool = WorkerPool::new(config.concurrency)?;
        let root = CancellationScope::root(config.global_timeout);

        Ok(Self {
            config: Arc::new(config),
            pool,
            root,
            ids: Arc::new(IdAllocator::new()),
            stats: Arc::new(RunStats::default()),
        })
    }

    /// Root of the scope tree (cancel it to stop every target)
    pub fn root_scope(&self) -> CancellationScope {
        self.root.clone()
    }

    /// Live counters
    pub fn stats(&self) -> Arc<RunStats> {
        Arc::clone(&self.stats)
    }

    /// Submit every target, then stop the pool
    pub fn run(self) -> Result<RunSummary> {
        let Self {
            config,
            pool,
            root,
            ids,
            stats,
        } = self;

        let start = Instant::now();

        info!(
            files = config.files,
            iterations = config.iterations,
            concurrency = config.concurrency,
            file_timeout = %config.file_timeout,
            global_timeout = %config.global_timeout,
            output_dir = %config.output_dir.display(),
            "Starting file churn"
        );

        let ctx = JobContext {
            iterations: config.iterations,
            file_timeout: config.file_timeout,
            ids,
            stats: Arc::clone(&stats),
        };

        for index in 1..=config.files {
            let target = Target::new(&config.output_dir, index);
            let parent = root.clone();
            let ctx = ctx.clone();

            if let Err(e) = pool.submit(move || run_target(target, &parent, ctx)) {
                pool.stop();
                return Err(e.into());
            }
        }

        pool.stop();

        let summary = RunSummary::collect(config.files as u64, &stats, start.elapsed(), &root);

        info!(
            writes = summary.writes(),
            created = summary.files_created,
            updated = summary.files_updated,
            failed = summary.failed_iterations,
            timed_out = summary.targets_timed_out,
            aborted = summary.targets_aborted,
            duration_ms = summary.duration.as_millis() as u64,
            "Files written"
        );

        Ok(summary)
    }
}

/// Body of one job: resolve the target, then write it `iterations` times
///
/// The file scope is derived here, once a worker has picked the job up, so
/// time spent waiting in `submit` does not count against the file timeout.
/// The scope is polled before every iteration and nowhere else, so an
/// in-progress write always finishes.
fn run_target(target: Target, parent: &CancellationScope, ctx: JobContext) {
    let scope = parent.child(ctx.file_timeout);
    let path = target.path().display().to_string();
    let total = ctx.iterations as u64;

    let mut writer = match target.resolve() {
        Ok(writer) => writer,
        Err(e) => {
            error!(
                file = %path,
                index = target.index(),
                error = %e,
                "Cannot read existing file, skipping target"
            );
            ctx.stats.targets_aborted.fetch_add(1, Ordering::Relaxed);
            ctx.stats.record_skipped(total);
            return;
        }
    };

    debug!(
        file = %path,
        index = target.index(),
        exists = writer.exists(),
        "Target resolved"
    );

    let mut rng = rand::thread_rng();

    for iteration in 0..total {
        if let Some(reason) = scope.reason() {
            warn!(
                file = %path,
                index = target.index(),
                written = iteration,
                iterations = total,
                reason = %reason,
                "File write timed out"
            );
            ctx.stats.targets_timed_out.fetch_add(1, Ordering::Relaxed);
            ctx.stats.record_skipped(total - iteration);
            return;
        }

        match writer.write_once(&ctx.ids, &mut rng) {
            Ok(outcome) => {
                debug!(
                    file = %path,
                    iteration = iteration + 1,
                    id = outcome.id,
                    kind = ?outcome.kind,
                    bytes = outcome.bytes,
                    "File written"
                );
                ctx.stats.record_write(&outcome);
            }
            Err(e) => {
                error!(file = %path, iteration = iteration + 1, error = %e, "File write failed");
                ctx.stats.record_failure();
            }
        }
    }

    ctx.stats.targets_completed.fetch_add(1, Ordering::Relaxed);
}
