//! Progress reporting for a churn run
//!
//! Provides a live progress bar using indicatif plus header/summary output.

use crate::orchestrator::{RunStats, RunSummary};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the watcher thread refreshes the bar
const REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Progress bar over the total number of iterations
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,

    /// Stop signal for the watcher thread
    stop: Arc<AtomicBool>,
}

impl ProgressReporter {
    /// Create a reporter expecting `total` iterations
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("Invalid progress template")
                .progress_chars("=> "),
        );

        bar.enable_steady_tick(REFRESH_INTERVAL);

        Self {
            bar,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Update the bar from live counters
    pub fn update(&self, stats: &RunStats) {
        update_bar(&self.bar, stats);
    }

    /// Refresh the bar from `stats` on a background thread until finished
    pub fn watch(&self, stats: Arc<RunStats>) -> JoinHandle<()> {
        let bar = self.bar.clone();
        let stop = Arc::clone(&self.stop);

        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                update_bar(&bar, &stats);
                thread::sleep(REFRESH_INTERVAL);
            }
        })
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.stop.store(true, Ordering::SeqCst);
        self.bar.finish_with_message(message.to_string());
    }
}

fn update_bar(bar: &ProgressBar, stats: &RunStats) {
    bar.set_position(stats.iterations_done());
    bar.set_message(format!(
        "Written: {} | Failed: {} | {}",
        format_number(stats.writes()),
        format_number(stats.failed_iterations.load(Ordering::Relaxed)),
        format_size(stats.bytes_written.load(Ordering::Relaxed), BINARY),
    ));
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the run
pub fn print_summary(summary: &RunSummary, output_dir: &str) {
    let secs = summary.duration.as_secs_f64();
    let rate = if secs > 0.0 {
        summary.writes() as f64 / secs
    } else {
        0.0
    };

    let title = if summary.interrupted {
        style("Run Interrupted").yellow().bold()
    } else {
        style("Run Complete").green().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Files:").bold(), format_number(summary.targets));
    println!(
        "  {} {} created, {} updated",
        style("Writes:").bold(),
        format_number(summary.files_created),
        format_number(summary.files_updated)
    );
    println!(
        "  {} {}",
        style("Written:").bold(),
        format_size(summary.bytes_written, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.0} writes/sec)",
        style("Duration:").bold(),
        secs,
        rate
    );
    if summary.targets_timed_out > 0 {
        println!(
            "  {} {}",
            style("Timed out:").yellow().bold(),
            format_number(summary.targets_timed_out)
        );
    }
    if summary.failed_iterations > 0 || summary.targets_aborted > 0 {
        println!(
            "  {} {} failed writes, {} skipped files",
            style("Errors:").red().bold(),
            format_number(summary.failed_iterations),
            format_number(summary.targets_aborted)
        );
    }
    println!("  {} {}", style("Output:").bold(), output_dir);
    println!();
}

/// Print a header at the start of the run
pub fn print_header(output_dir: &str, workers: usize, files: usize, iterations: usize) {
    println!();
    println!(
        "{} {}",
        style("file-churn").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Output:").bold(), output_dir);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!(
        "  {} {} x {} iterations",
        style("Files:").bold(),
        format_number(files as u64),
        format_number(iterations as u64)
    );
    println!();
}
