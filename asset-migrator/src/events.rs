//! Migration events broadcast to observers.
//!
//! Events are fire-and-forget: a run never waits for a subscriber, and a
//! lagging subscriber loses the oldest events rather than slowing the run.

use crate::executor::state::{FailedAsset, RunSummary};
use crate::store::AssetId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Maximum number of queued events per subscriber
pub const EVENT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum MigrationEvent {
    #[serde(rename = "run:started")]
    RunStarted { run_id: String, budget: u64 },

    /// Asset confirmed present on the remote and queued for deletion
    #[serde(rename = "asset:backed_up")]
    AssetBackedUp {
        run_id: String,
        asset_id: AssetId,
        filename: String,
        bytes: u64,
        uploaded: bool,
        retries: u32,
    },

    /// Asset gave up after its last attempt
    #[serde(rename = "asset:failed")]
    AssetFailed {
        run_id: String,
        #[serde(flatten)]
        failure: FailedAsset,
    },

    #[serde(rename = "run:completed")]
    RunCompleted(RunSummary),

    #[serde(rename = "delete:completed")]
    DeleteCompleted { deleted: usize, delete_completed: u64 },

    #[serde(rename = "delete:failed")]
    DeleteFailed { pending: usize, error: String },
}

/// Create the event channel shared by an executor and its subscribers
pub fn channel() -> broadcast::Sender<MigrationEvent> {
    let (tx, _) = broadcast::channel(EVENT_CAPACITY);
    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = MigrationEvent::RunStarted {
            run_id: "r1".into(),
            budget: 10,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "run:started");
        assert_eq!(json["payload"]["budget"], 10);
    }

    #[test]
    fn test_failed_event_flattens_failure() {
        let event = MigrationEvent::AssetFailed {
            run_id: "r1".into(),
            failure: FailedAsset {
                asset_id: AssetId::new("a"),
                filename: "a.bmp".into(),
                error: "Unsupported format: a.bmp".into(),
                attempts: 1,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "asset:failed");
        assert_eq!(json["payload"]["filename"], "a.bmp");
        assert_eq!(json["payload"]["run_id"], "r1");

        let back: MigrationEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(back, MigrationEvent::AssetFailed { .. }));
    }

    #[test]
    fn test_send_without_subscribers_is_harmless() {
        let tx = channel();
        assert!(tx
            .send(MigrationEvent::DeleteFailed {
                pending: 1,
                error: "x".into()
            })
            .is_err());
    }
}
