//! Per-run counters and their observable snapshots.

use crate::store::{Asset, AssetId};
use crate::transfer::{ProgressTracker, RunProgress};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An asset that exhausted its attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAsset {
    pub asset_id: AssetId,
    pub filename: String,
    /// Last error seen
    pub error: String,
    pub attempts: u32,
}

/// Mutable state of one run, owned by the task driving it
#[derive(Debug)]
pub struct RunState {
    pub run_id: String,
    pub initial_budget: u64,
    pub budget: u64,
    pub backup_completed: u64,
    pub uploaded: u64,
    pub already_present: u64,
    pub bytes_uploaded: u64,
    pub retries: u64,
    pub failed: Vec<FailedAsset>,
    pub cancel_requested: bool,
    pub progress: RunProgress,
    tracker: ProgressTracker,
}

impl RunState {
    pub fn new(budget: u64) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            initial_budget: budget,
            budget,
            backup_completed: 0,
            uploaded: 0,
            already_present: 0,
            bytes_uploaded: 0,
            retries: 0,
            failed: Vec::new(),
            cancel_requested: false,
            progress: RunProgress::default(),
            tracker: ProgressTracker::new(),
        }
    }

    /// Assets that consumed budget, whatever their outcome
    pub fn processed(&self) -> u64 {
        self.initial_budget - self.budget
    }

    /// Spend one unit of budget
    pub fn consume(&mut self) {
        self.budget = self.budget.saturating_sub(1);
    }

    pub fn record_backup(&mut self, uploaded: bool, bytes: u64) {
        self.backup_completed += 1;
        if uploaded {
            self.uploaded += 1;
            self.bytes_uploaded += bytes;
        } else {
            self.already_present += 1;
        }
    }

    pub fn record_failure(&mut self, asset: &Asset, error: String, attempts: u32) {
        self.failed.push(FailedAsset {
            asset_id: asset.id.clone(),
            filename: asset.filename.clone(),
            error,
            attempts,
        });
    }

    /// Recompute rate and ETA from the current counters
    pub fn refresh_progress(&mut self) {
        self.progress = self.tracker.update(self.backup_completed, self.budget);
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.tracker.elapsed().as_secs_f64()
    }

    pub fn snapshot(
        &self,
        deletion_queue_size: usize,
        delete_completed: u64,
        running: bool,
    ) -> StatusSnapshot {
        StatusSnapshot {
            run_id: Some(self.run_id.clone()),
            budget_remaining: self.budget,
            backup_completed: self.backup_completed,
            uploaded: self.uploaded,
            already_present: self.already_present,
            failed: self.failed.len() as u64,
            delete_completed,
            retries: self.retries,
            operations_per_minute: self.progress.operations_per_minute,
            eta_seconds: self.progress.eta.map(|d| d.as_secs()),
            deletion_queue_size,
            cancel_requested: self.cancel_requested,
            running,
        }
    }

    pub fn into_summary(self, cancelled: bool) -> RunSummary {
        RunSummary {
            processed: self.processed(),
            duration_secs: self.elapsed_secs(),
            run_id: self.run_id,
            budget_remaining: self.budget,
            backup_completed: self.backup_completed,
            uploaded: self.uploaded,
            already_present: self.already_present,
            bytes_uploaded: self.bytes_uploaded,
            retries: self.retries,
            cancelled,
            failed: self.failed,
        }
    }
}

/// Point-in-time view of the executor, published after every asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Current or most recent run
    pub run_id: Option<String>,
    pub budget_remaining: u64,
    pub backup_completed: u64,
    pub uploaded: u64,
    pub already_present: u64,
    pub failed: u64,
    pub delete_completed: u64,
    pub retries: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operations_per_minute: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    pub deletion_queue_size: usize,
    pub cancel_requested: bool,
    pub running: bool,
}

/// Final accounting of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub processed: u64,
    pub budget_remaining: u64,
    pub backup_completed: u64,
    pub uploaded: u64,
    pub already_present: u64,
    pub bytes_uploaded: u64,
    pub retries: u64,
    pub cancelled: bool,
    pub duration_secs: f64,
    pub failed: Vec<FailedAsset>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut state = RunState::new(5);
        state.record_backup(true, 100);
        state.consume();
        state.record_backup(false, 50);
        state.consume();
        state.record_failure(&Asset::new("x", "x.bmp"), "Unsupported format: x.bmp".into(), 1);
        state.consume();

        assert_eq!(state.backup_completed, 2);
        assert_eq!(state.uploaded, 1);
        assert_eq!(state.already_present, 1);
        assert_eq!(state.bytes_uploaded, 100);
        assert_eq!(state.processed(), 3);

        let snapshot = state.snapshot(2, 0, true);
        assert_eq!(snapshot.budget_remaining, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.deletion_queue_size, 2);
        assert!(snapshot.running);
    }

    #[test]
    fn test_budget_never_underflows() {
        let mut state = RunState::new(0);
        state.consume();
        assert_eq!(state.budget, 0);
    }

    #[test]
    fn test_summary_carries_failures() {
        let mut state = RunState::new(2);
        state.record_failure(&Asset::new("a", "a.jpg"), "boom".into(), 3);
        state.consume();

        let summary = state.into_summary(false);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].attempts, 3);
    }

    #[test]
    fn test_snapshot_omits_undefined_rate() {
        let state = RunState::new(1);
        let json = serde_json::to_value(state.snapshot(0, 0, true)).unwrap();
        assert!(json.get("operations_per_minute").is_none());
        assert!(json.get("eta_seconds").is_none());
        assert_eq!(json["budget_remaining"], 1);
    }
}
