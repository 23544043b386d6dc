//! Configuration types for file-churn
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Output directory preparation

use crate::error::ConfigError;
use crate::scope::Timeout;
use clap::Parser;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Maximum reasonable worker count
const MAX_CONCURRENCY: usize = 4096;

/// Concurrently create and rewrite YAML files under a time budget
#[derive(Parser, Debug, Clone)]
#[command(
    name = "file-churn",
    version,
    about = "Concurrently create and rewrite YAML files under a time budget",
    long_about = "Writes file-1.yaml .. file-N.yaml into an output directory using a fixed pool \
                  of worker threads. Each file is rewritten a number of times with random \
                  content, keeping its id and creation time.\n\n\
                  Two timeouts apply: one per file and one for the whole run. A negative \
                  duration means no timeout.",
    after_help = "EXAMPLES:\n    \
        file-churn --files 100 --concurrency 8\n    \
        file-churn --files 10 --iterations 50 --file-timeout 200ms\n    \
        file-churn --global-timeout 5s --output-dir /tmp/churn"
)]
pub struct CliArgs {
    /// Number of worker threads writing files concurrently
    #[arg(long, default_value_t = 10, value_name = "NUM")]
    pub concurrency: usize,

    /// Number of files to write
    #[arg(long, default_value_t = 10, value_name = "NUM")]
    pub files: usize,

    /// Number of times each file is rewritten
    #[arg(long, default_value_t = 1, value_name = "NUM")]
    pub iterations: usize,

    /// Time budget per file (negative = unbounded)
    #[arg(long, default_value = "-1", value_name = "DURATION", allow_hyphen_values = true)]
    pub file_timeout: Timeout,

    /// Time budget for the whole run (negative = unbounded)
    #[arg(long, default_value = "-1", value_name = "DURATION", allow_hyphen_values = true)]
    pub global_timeout: Timeout,

    /// Directory that receives the files (created if missing)
    #[arg(long, default_value = ".output", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Quiet mode - suppress progress bar and summary
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (log every write)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ChurnConfig {
    /// Worker pool size
    pub concurrency: usize,

    /// Number of targets
    pub files: usize,

    /// Writes per target
    pub iterations: usize,

    /// Per-target budget
    pub file_timeout: Timeout,

    /// Whole-run budget
    pub global_timeout: Timeout,

    /// Output directory
    pub output_dir: PathBuf,

    /// Show progress bar and summary
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl ChurnConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.concurrency == 0 || args.concurrency > MAX_CONCURRENCY {
            return Err(ConfigError::InvalidConcurrency {
                count: args.concurrency,
                max: MAX_CONCURRENCY,
            });
        }

        Ok(Self {
            concurrency: args.concurrency,
            files: args.files,
            iterations: args.iterations,
            file_timeout: args.file_timeout,
            global_timeout: args.global_timeout,
            output_dir: args.output_dir,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Total writes the run would perform with no timeouts
    pub fn total_iterations(&self) -> u64 {
        (self.files as u64).saturating_mul(self.iterations as u64)
    }

    /// Make sure the output directory exists
    ///
    /// A missing directory is created recursively. Any other stat failure,
    /// or a path that is not a directory, is fatal.
    pub fn prepare_output_dir(&self) -> Result<(), ConfigError> {
        let path = &self.output_dir;

        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ConfigError::OutputNotDirectory { path: path.clone() }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(path).map_err(|e| ConfigError::OutputDirCreate {
                    path: path.clone(),
                    source: e,
                })
            }
            Err(e) => Err(ConfigError::OutputDirStat {
                path: path.clone(),
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("file-churn").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.concurrency, 10);
        assert_eq!(args.files, 10);
        assert_eq!(args.iterations, 1);
        assert_eq!(args.file_timeout, Timeout::Unbounded);
        assert_eq!(args.global_timeout, Timeout::Unbounded);
        assert_eq!(args.output_dir, PathBuf::from(".output"));
    }

    #[test]
    fn test_timeout_flags() {
        let args = parse(&["--file-timeout", "250ms", "--global-timeout", "-1"]);
        assert_eq!(args.file_timeout, Timeout::After(Duration::from_millis(250)));
        assert_eq!(args.global_timeout, Timeout::Unbounded);

        let args = parse(&["--global-timeout=0"]);
        assert_eq!(args.global_timeout, Timeout::After(Duration::ZERO));

        assert!(CliArgs::try_parse_from(["file-churn", "--file-timeout", "later"]).is_err());
    }

    #[test]
    fn test_invalid_concurrency() {
        let args = parse(&["--concurrency", "0"]);
        assert!(matches!(
            ChurnConfig::from_args(args),
            Err(ConfigError::InvalidConcurrency { count: 0, .. })
        ));
    }

    #[test]
    fn test_total_iterations() {
        let config = ChurnConfig::from_args(parse(&["--files", "3", "--iterations", "4"])).unwrap();
        assert_eq!(config.total_iterations(), 12);
        assert!(config.show_progress);
    }

    #[test]
    fn test_prepare_output_dir_creates_nested() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");

        let mut config = ChurnConfig::from_args(parse(&[])).unwrap();
        config.output_dir = nested.clone();

        config.prepare_output_dir().unwrap();
        assert!(nested.is_dir());

        // Existing directory is fine
        config.prepare_output_dir().unwrap();
    }

    #[test]
    fn test_prepare_output_dir_rejects_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();

        let mut config = ChurnConfig::from_args(parse(&[])).unwrap();
        config.output_dir = file;

        assert!(matches!(
            config.prepare_output_dir(),
            Err(ConfigError::OutputNotDirectory { .. })
        ));
    }
}
