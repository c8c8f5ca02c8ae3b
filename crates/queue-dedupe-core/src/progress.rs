/// Trait for reporting engine progress.
///
/// The CLI implements it with indicatif bars. All methods have default no-op
/// implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_prefilter_start(&self, _total_files: usize) {}
    fn on_prefilter_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_hash_start(&self, _files_to_hash: usize) {}
    fn on_hash_progress(&self, _files_hashed: usize, _total_files: usize) {}
    fn on_verify_complete(&self, _verified: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
