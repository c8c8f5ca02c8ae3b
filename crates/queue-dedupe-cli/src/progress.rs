use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use queue_dedupe_core::ProgressReporter;
use std::sync::Mutex;
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Progress for the `process` command.
///
/// Prefiltering shows a spinner, hashing a bar sized by the number of files
/// that actually need a digest.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars(TICK_CHARS)
}

impl ProgressReporter for CliReporter {
    fn on_prefilter_start(&self, total_files: usize) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(style("{spinner:.cyan} {msg}"));
        pb.set_message(format!("Prefiltering {} queued files...", total_files));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_prefilter_complete(&self, total_files: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  {} Prefilter complete: {} files in {:.2}s",
            "✓".green(),
            total_files,
            duration_secs
        );
    }

    fn on_hash_start(&self, files_to_hash: usize) {
        let pb = ProgressBar::new(files_to_hash as u64);
        pb.set_style(style(
            "  {spinner:.cyan} Hashing [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
        ));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_hash_progress(&self, files_hashed: usize, total_files: usize) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                if pb.length() != Some(total_files as u64) {
                    pb.set_length(total_files as u64);
                }
                pb.set_position(files_hashed as u64);
            }
        }
    }

    fn on_verify_complete(&self, verified: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  {} Verification complete: {} comparisons in {:.2}s",
            "✓".green(),
            verified,
            duration_secs
        );
    }
}
