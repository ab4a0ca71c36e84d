/// Trait for reporting build progress.
///
/// The CLI implements it with indicatif bars; tests use `SilentReporter`.
/// All methods have default no-op implementations.
pub trait BuildReporter: Send + Sync {
    fn on_scan_start(&self) {}
    fn on_scan_complete(&self, _total_files: usize, _duration_secs: f64) {}
    fn on_hash_start(&self, _total_files: usize) {}
    fn on_hash_progress(&self, _files_hashed: usize, _total_files: usize) {}
    fn on_hash_complete(&self, _duration_secs: f64) {}
    fn on_tag_start(&self) {}
    fn on_tag_complete(&self, _files: usize, _folders: usize, _duration_secs: f64) {}
    fn on_zips_complete(&self, _zips: usize) {}
    fn on_save_complete(&self, _saved: bool) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl BuildReporter for SilentReporter {}
