//! Migration executor - drives backup runs over an asset store.
//!
//! A run walks the store's enumeration in order, one asset at a time:
//! - derive the remote target, fetch, dedup-check and upload (with retries)
//! - queue confirmed assets for deletion
//! - publish a status snapshot and an event after every asset
//!
//! Deletion is a separate step ([`MigrationExecutor::flush`]), so nothing is
//! ever removed locally before its remote copy was confirmed.

pub mod dedup;
pub mod deletion;
pub mod pipeline;
pub mod retry;
pub mod state;

use crate::config::RunConfig;
use crate::events::{self, MigrationEvent};
use crate::remote::RemoteStore;
use crate::store::{Asset, AssetStore};
use crate::{MigrationError, Result};
use deletion::DeletionQueue;
use futures_util::StreamExt;
use pipeline::UploadPipeline;
use retry::RetryController;
use state::{RunState, RunSummary, StatusSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Tunables for a [`MigrationExecutor`]
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Attempts per asset, including the first
    pub max_attempts: u32,

    /// Upper bound on a single probe or upload call
    pub call_timeout: Duration,

    /// Zero disables backoff
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            call_timeout: Duration::from_secs(60),
            backoff_base: Duration::ZERO,
            backoff_max: Duration::from_secs(10),
        }
    }
}

impl From<&RunConfig> for ExecutorOptions {
    fn from(run: &RunConfig) -> Self {
        Self {
            max_attempts: run.max_attempts,
            call_timeout: Duration::from_secs(run.call_timeout_secs),
            backoff_base: Duration::from_millis(run.backoff_base_ms),
            backoff_max: Duration::from_millis(run.backoff_max_ms),
        }
    }
}

/// Main migration executor.
///
/// One executor serves one asset store and one remote. Runs are serialized;
/// the deletion queue outlives individual runs.
pub struct MigrationExecutor {
    assets: Arc<dyn AssetStore>,
    pipeline: UploadPipeline,
    retry: RetryController,
    deletion_queue: Arc<DeletionQueue>,
    events: broadcast::Sender<MigrationEvent>,
    status: watch::Sender<StatusSnapshot>,
    run_lock: Mutex<()>,
}

impl MigrationExecutor {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        remote: Arc<dyn RemoteStore>,
        options: ExecutorOptions,
    ) -> Self {
        let pipeline = UploadPipeline::new(assets.clone(), remote, options.call_timeout);
        let retry = RetryController::new(options.max_attempts)
            .with_backoff(options.backoff_base, options.backoff_max);
        let (status, _) = watch::channel(StatusSnapshot::default());

        Self {
            assets,
            pipeline,
            retry,
            deletion_queue: Arc::new(DeletionQueue::new()),
            events: events::channel(),
            status,
            run_lock: Mutex::new(()),
        }
    }

    /// Subscribe to status snapshots
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    /// Subscribe to migration events
    pub fn subscribe_events(&self) -> broadcast::Receiver<MigrationEvent> {
        self.events.subscribe()
    }

    /// Latest published snapshot
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn deletion_queue(&self) -> &Arc<DeletionQueue> {
        &self.deletion_queue
    }

    /// Spawn a run on the runtime and return immediately
    pub fn start(self: &Arc<Self>, budget: u64) -> RunHandle {
        let cancel = CancellationToken::new();
        let executor = Arc::clone(self);
        let token = cancel.clone();
        let join = tokio::spawn(async move { executor.run(budget, token).await });

        RunHandle {
            cancel,
            status: self.subscribe(),
            join,
        }
    }

    /// Execute one run to completion.
    ///
    /// Stops when the enumeration ends, the budget reaches zero or `cancel`
    /// fires. Cancellation is only observed between assets, so an asset that
    /// has started always finishes. Asset-level failures never fail the run;
    /// the only run-level error is an enumeration that cannot start.
    pub async fn run(&self, budget: u64, cancel: CancellationToken) -> Result<RunSummary> {
        let _run = self.run_lock.lock().await;

        let mut state = RunState::new(budget);
        info!(run_id = %state.run_id, budget, "Starting migration run");
        self.emit(MigrationEvent::RunStarted {
            run_id: state.run_id.clone(),
            budget,
        });
        self.publish(&state, true);

        let mut assets = match self.assets.enumerate().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(run_id = %state.run_id, error = %e, "Enumeration failed");
                self.publish(&state, false);
                return Err(match e {
                    MigrationError::Enumeration(_) => e,
                    other => MigrationError::Enumeration(other.to_string()),
                });
            }
        };

        loop {
            if state.budget == 0 {
                break;
            }
            if cancel.is_cancelled() {
                state.cancel_requested = true;
                break;
            }
            let Some(asset) = assets.next().await else {
                break;
            };

            self.process_asset(&mut state, asset).await;
            self.publish(&state, true);
        }
        // Stops a lazy walker that is still producing
        drop(assets);

        if cancel.is_cancelled() {
            state.cancel_requested = true;
        }
        self.publish(&state, false);

        info!(
            run_id = %state.run_id,
            processed = state.processed(),
            backed_up = state.backup_completed,
            uploaded = state.uploaded,
            already_present = state.already_present,
            failed = state.failed.len(),
            retries = state.retries,
            cancelled = state.cancel_requested,
            "Migration run finished in {:.1}s",
            state.elapsed_secs()
        );

        let cancelled = state.cancel_requested;
        let summary = state.into_summary(cancelled);
        self.emit(MigrationEvent::RunCompleted(summary.clone()));
        Ok(summary)
    }

    async fn process_asset(&self, state: &mut RunState, asset: Asset) {
        let pipeline = &self.pipeline;
        let target = &asset;
        let outcome = self.retry.attempt(|_| pipeline.process(target)).await;

        state.retries += u64::from(outcome.retries);
        state.consume();

        match outcome.result {
            Ok(backup) => {
                self.deletion_queue.push(asset.clone());
                state.record_backup(backup.was_uploaded(), backup.bytes());
                self.emit(MigrationEvent::AssetBackedUp {
                    run_id: state.run_id.clone(),
                    asset_id: asset.id,
                    filename: asset.filename,
                    bytes: backup.bytes(),
                    uploaded: backup.was_uploaded(),
                    retries: outcome.retries,
                });
            }
            Err(e) => {
                warn!(
                    run_id = %state.run_id,
                    asset_id = %asset.id,
                    attempts = outcome.attempts,
                    error = %e,
                    "Asset failed, skipping"
                );
                state.record_failure(&asset, e.to_string(), outcome.attempts);
                if let Some(failure) = state.failed.last() {
                    self.emit(MigrationEvent::AssetFailed {
                        run_id: state.run_id.clone(),
                        failure: failure.clone(),
                    });
                }
            }
        }

        state.refresh_progress();
    }

    /// Delete every queued asset from the asset store.
    ///
    /// On failure the queue is left as it was and the error is returned.
    pub async fn flush(&self) -> Result<usize> {
        let result = self.deletion_queue.flush(self.assets.as_ref()).await;
        let pending = self.deletion_queue.len();
        let delete_completed = self.deletion_queue.delete_completed();

        match &result {
            Ok(deleted) => self.emit(MigrationEvent::DeleteCompleted {
                deleted: *deleted,
                delete_completed,
            }),
            Err(e) => self.emit(MigrationEvent::DeleteFailed {
                pending,
                error: e.to_string(),
            }),
        }

        self.status.send_modify(|s| {
            s.deletion_queue_size = pending;
            s.delete_completed = delete_completed;
        });
        result
    }

    fn publish(&self, state: &RunState, running: bool) {
        self.status.send_replace(state.snapshot(
            self.deletion_queue.len(),
            self.deletion_queue.delete_completed(),
            running,
        ));
    }

    fn emit(&self, event: MigrationEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Caller-side handle of a spawned run
pub struct RunHandle {
    cancel: CancellationToken,
    status: watch::Receiver<StatusSnapshot>,
    join: JoinHandle<Result<RunSummary>>,
}

impl RunHandle {
    /// Ask the run to stop after the asset in flight
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to finish
    pub async fn wait(self) -> Result<RunSummary> {
        self.join
            .await
            .map_err(|e| MigrationError::Worker(e.to_string()))?
    }
}
