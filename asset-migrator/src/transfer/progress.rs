//! Run-level progress: throughput and completion estimates.
//!
//! Everything here is derived from the run counters and the elapsed time;
//! nothing holds its own copy of the counts.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Derived throughput for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunProgress {
    /// Completed backups per minute since the run started
    pub operations_per_minute: Option<f64>,

    /// Estimated time to exhaust the remaining budget
    pub eta: Option<Duration>,
}

/// Progress tracker anchored at the run's start time
#[derive(Debug, Clone, Copy)]
pub struct ProgressTracker {
    start_time: Instant,
}

impl ProgressTracker {
    /// Start tracking now
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start_time: Instant) -> Self {
        Self { start_time }
    }

    /// Get total elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Recompute rate and ETA from the current counters
    pub fn update(&self, completed: u64, remaining_budget: u64) -> RunProgress {
        Self::derive(completed, remaining_budget, self.elapsed())
    }

    /// Pure derivation used by [`update`](Self::update)
    pub fn derive(completed: u64, remaining_budget: u64, elapsed: Duration) -> RunProgress {
        let operations_per_minute = operations_per_minute(completed, elapsed);
        RunProgress {
            operations_per_minute,
            eta: eta(remaining_budget, operations_per_minute),
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// `completed / elapsed_minutes`, undefined until something completed and
/// time has passed
pub fn operations_per_minute(completed: u64, elapsed: Duration) -> Option<f64> {
    if completed == 0 || elapsed.is_zero() {
        return None;
    }
    let minutes = elapsed.as_secs_f64() / 60.0;
    Some(completed as f64 / minutes)
}

/// `remaining / rate`, undefined whenever the rate is undefined or not positive
pub fn eta(remaining_budget: u64, operations_per_minute: Option<f64>) -> Option<Duration> {
    let rate = operations_per_minute.filter(|r| r.is_finite() && *r > 0.0)?;
    let minutes = remaining_budget as f64 / rate;
    Duration::try_from_secs_f64(minutes * 60.0).ok()
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

/// Format a backup rate, `-` while it is undefined
pub fn format_rate(operations_per_minute: Option<f64>) -> String {
    match operations_per_minute {
        Some(rate) => format!("{:.1}/min", rate),
        None => "-".to_string(),
    }
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}
