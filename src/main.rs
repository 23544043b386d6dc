//! file-churn - Concurrent YAML File Churn Generator
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use file_churn::config::{ChurnConfig, CliArgs};
use file_churn::orchestrator::Orchestrator;
use file_churn::progress::{print_header, print_summary, ProgressReporter};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose);

    // Validate and create config
    let config = ChurnConfig::from_args(args).context("Invalid configuration")?;

    config
        .prepare_output_dir()
        .context("Failed to prepare output directory")?;

    let output_dir = config.output_dir.display().to_string();

    if config.show_progress {
        print_header(&output_dir, config.concurrency, config.files, config.iterations);
    }

    let show_progress = config.show_progress;
    let total = config.total_iterations();

    let orchestrator = Orchestrator::new(config).context("Failed to start worker pool")?;

    // Ctrl-C cancels the root scope; running writes finish, the rest are skipped
    let root = orchestrator.root_scope();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, stopping...");
        root.cancel();
    })
    .context("Failed to set signal handler")?;

    let progress = show_progress.then(|| ProgressReporter::new(total));
    let watcher = progress
        .as_ref()
        .map(|p| p.watch(orchestrator.stats()));
    let stats = orchestrator.stats();

    let result = orchestrator.run();

    // Stop the watcher before reporting, whether or not the run succeeded
    if let Some(ref p) = progress {
        p.update(&stats);
        match &result {
            Ok(summary) if summary.interrupted => p.finish("Run interrupted"),
            Ok(_) => p.finish("Run completed"),
            Err(_) => p.finish("Run failed"),
        }
    }
    if let Some(watcher) = watcher {
        let _ = watcher.join();
    }

    let summary = result.context("Run failed")?;

    if show_progress {
        print_summary(&summary, &output_dir);
    }

    if summary.interrupted {
        info!("Run was interrupted before completion");
    }

    Ok(())
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("file_churn=debug,warn")
    } else {
        EnvFilter::new("file_churn=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
