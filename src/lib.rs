//! file-churn - Concurrent YAML File Churn Generator
//!
//! Creates `file-1.yaml` .. `file-N.yaml` in an output directory and rewrites
//! each of them a configurable number of times with random content, using a
//! fixed pool of worker threads. Useful for exercising filesystems, watchers
//! and sync tools under concurrent write load.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Orchestrator (control thread)                │
//! │   root scope (global-timeout)                                    │
//! │     └── child scope per file (file-timeout)                      │
//! │   one job per file ──submit()── blocks while all workers busy    │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ rendezvous channel (no buffer)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Worker Pool                              │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐         ┌─────────┐     │
//! │  │Worker 1 │  │Worker 2 │  │Worker 3 │  ...    │Worker N │     │
//! │  └────┬────┘  └────┬────┘  └────┬────┘         └────┬────┘     │
//! │       │ for each iteration: poll scope, then create/update      │
//! └───────┼────────────┼────────────┼────────────────────┼──────────┘
//!         ▼            ▼            ▼                    ▼
//!    file-1.yaml  file-2.yaml  file-3.yaml    ...   file-N.yaml
//! ```
//!
//! # Example
//!
//! ```bash
//! # 100 files, each written 20 times, 8 workers
//! file-churn --files 100 --iterations 20 --concurrency 8
//!
//! # Stop everything after 5 seconds, each file after 200ms
//! file-churn --global-timeout 5s --file-timeout 200ms
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod payload;
pub mod pool;
pub mod progress;
pub mod scope;
pub mod target;

pub use config::{ChurnConfig, CliArgs};
pub use error::{ChurnError, Result};
pub use orchestrator::{Orchestrator, RunStats, RunSummary};
pub use pool::WorkerPool;
pub use scope::{CancelReason, CancellationScope, Timeout};
