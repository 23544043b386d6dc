//! Error types for file-churn
//!
//! This module defines the error hierarchy for:
//! - Configuration and output directory errors (fatal at startup)
//! - Worker pool errors
//! - Payload encoding errors
//! - Per-target file errors (logged inside a job, never escalated)
//!
//! Errors raised inside a job stay inside that job. Only startup errors
//! reach `main` and affect the exit status.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the file-churn application
#[derive(Error, Debug)]
pub enum ChurnError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker pool errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid concurrency {count}: must be between 1 and {max}")]
    InvalidConcurrency { count: usize, max: usize },

    /// Duration flag could not be parsed
    #[error("Invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// Output directory could not be inspected
    #[error("Cannot stat output directory '{path}': {source}")]
    OutputDirStat {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Output directory could not be created
    #[error("Cannot create output directory '{path}': {source}")]
    OutputDirCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Output path exists but is not a directory
    #[error("Output path '{path}' is not a directory")]
    OutputNotDirectory { path: PathBuf },
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Pool was asked for zero workers
    #[error("Worker pool size must be at least 1")]
    EmptyPool,

    /// Worker thread could not be spawned
    #[error("Failed to initialize worker {id}: {reason}")]
    InitFailed { id: usize, reason: String },

    /// Job channel has no receivers left
    #[error("Failed to submit job: all workers have terminated")]
    QueueSendFailed,

    /// Worker thread panicked outside of a job
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },
}

/// Payload encoding errors
#[derive(Error, Debug)]
pub enum PayloadError {
    /// YAML serialization failed
    #[error("Failed to serialize payload: {0}")]
    Serialize(#[source] serde_yaml::Error),

    /// YAML deserialization failed
    #[error("Failed to deserialize payload: {0}")]
    Deserialize(#[source] serde_yaml::Error),
}

/// Per-target file errors
#[derive(Error, Debug)]
pub enum TargetError {
    /// Existing file could not be read during resolution
    #[error("Failed to read '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Previous payload could not be read for an update
    #[error("Failed to read previous payload from '{path}': {source}")]
    ReadPrevious {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Payload encoding failed
    #[error("Payload error for '{path}': {source}")]
    Payload { path: PathBuf, source: PayloadError },

    /// File write failed
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type alias for ChurnError
pub type Result<T> = std::result::Result<T, ChurnError>;

/// Result type alias for TargetError
pub type TargetResult<T> = std::result::Result<T, TargetError>;
