//! Progress tracking for a restore session.
//!
//! Percentages are integer and computed from file counts, so 100 is reached
//! exactly when every file has been processed and never earlier.

use crate::session::SessionState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreProgress {
    /// State the session was in at the last update
    pub stage: SessionState,

    pub files_processed: usize,
    pub total_files: usize,

    pub bytes_processed: u64,
    pub total_bytes: u64,

    /// 0-100, never decreases within a session
    pub percentage: u8,
}

impl RestoreProgress {
    pub fn new() -> Self {
        Self {
            stage: SessionState::Initializing,
            files_processed: 0,
            total_files: 0,
            bytes_processed: 0,
            total_bytes: 0,
            percentage: 0,
        }
    }

    /// Reset counters for the copy phase.
    pub fn begin(&mut self, total_files: usize, total_bytes: u64) {
        self.total_files = total_files;
        self.total_bytes = total_bytes;
        self.files_processed = 0;
        self.bytes_processed = 0;
        self.refresh_percentage();
    }

    /// Count one processed file (copied, skipped or failed).
    pub fn record_file(&mut self, bytes: u64) {
        self.files_processed = (self.files_processed + 1).min(self.total_files);
        self.bytes_processed += bytes;
        self.refresh_percentage();
    }

    pub fn is_complete(&self) -> bool {
        self.files_processed == self.total_files
    }

    fn refresh_percentage(&mut self) {
        let next = percent(self.files_processed, self.total_files);
        self.percentage = self.percentage.max(next);
    }
}

impl Default for RestoreProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Floor of `done / total * 100`; an empty workload counts as complete.
pub fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = done.min(total) as u128;
    (done * 100 / total as u128) as u8
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format duration as human-readable string
pub fn format_duration(millis: u64) -> String {
    let seconds = millis / 1000;
    if seconds == 0 {
        format!("{}ms", millis)
    } else if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_reaches_100_only_when_done() {
        assert_eq!(percent(0, 3), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 66);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(999, 1000), 99);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut progress = RestoreProgress::new();
        progress.begin(4, 100);
        let mut last = progress.percentage;
        for _ in 0..4 {
            progress.record_file(25);
            assert!(progress.percentage >= last);
            last = progress.percentage;
        }
        assert!(progress.is_complete());
        assert_eq!(progress.percentage, 100);
        assert_eq!(progress.bytes_processed, 100);
    }

    #[test]
    fn test_processed_never_exceeds_total() {
        let mut progress = RestoreProgress::new();
        progress.begin(1, 10);
        progress.record_file(10);
        progress.record_file(0);
        assert_eq!(progress.files_processed, 1);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(250), "250ms");
        assert_eq!(format_duration(30_000), "30s");
        assert_eq!(format_duration(90_000), "1m 30s");
        assert_eq!(format_duration(3_665_000), "1h 1m");
    }
}
