/// Trait for reporting analysis progress.
///
/// The CLI implements it with indicatif bars. All methods have default
/// no-op implementations; `on_analyze_progress` is called from rayon workers.
pub trait ProgressReporter: Send + Sync {
    fn on_discover_start(&self) {}
    fn on_discover_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_analyze_start(&self, _total_files: usize) {}
    fn on_analyze_progress(&self, _files_done: usize, _total_files: usize) {}
    fn on_analyze_complete(&self, _files_analyzed: usize, _files_failed: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
