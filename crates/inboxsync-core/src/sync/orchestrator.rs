//! SyncOrchestrator - fans pipelines out over every syncable inbox
//!
//! The orchestrator owns the run state shared by all passes:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncOrchestrator                                               │
//! │  ├── pipeline: InboxPipeline                                    │
//! │  ├── run: Mutex<RunState>                                       │
//! │  │   ├── syncing      (held by a request_sync pass)             │
//! │  │   ├── in_flight    (pipelines not yet settled)               │
//! │  │   ├── active       (inboxes with a running pipeline)         │
//! │  │   └── failures     (consecutive failures per inbox)          │
//! │  └── event_tx: broadcast::Sender<SyncEvent>                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All pipelines of a pass run concurrently on the calling task. Their
//! bookkeeping is released by guards, so dropping a pass half way leaves the
//! run state consistent.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::events::{SyncEvent, SyncReport};
use super::pipeline::{InboxPipeline, SyncedInbox};
use crate::config::SyncConfig;
use crate::crypto::CryptoPort;
use crate::error::{InboxError, InboxResult};
use crate::remote::RemoteInbox;
use crate::storage::InboxStore;
use crate::types::Inbox;

#[derive(Debug, Default)]
struct RunState {
    syncing: bool,
    in_flight: usize,
    active: HashMap<String, usize>,
    failures: HashMap<String, u32>,
}

impl RunState {
    fn enter(&mut self, public_key: &str) {
        self.in_flight += 1;
        *self.active.entry(public_key.to_string()).or_insert(0) += 1;
    }

    fn leave(&mut self, public_key: &str) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if let Some(count) = self.active.get_mut(public_key) {
            *count -= 1;
            if *count == 0 {
                self.active.remove(public_key);
            }
        }
    }
}

/// Marks one pipeline as in flight until dropped
struct Activity<'a> {
    run: &'a Mutex<RunState>,
    public_key: String,
}

impl<'a> Activity<'a> {
    /// Caller must already hold the lock and have called `RunState::enter`.
    fn entered(run: &'a Mutex<RunState>, public_key: &str) -> Self {
        Self {
            run,
            public_key: public_key.to_string(),
        }
    }
}

impl Drop for Activity<'_> {
    fn drop(&mut self) {
        self.run.lock().leave(&self.public_key);
    }
}

/// Holds the overlap guard for one `request_sync` pass.
///
/// Dropped only after the pass has joined its pipelines and sent
/// `SyncFinished`, or when the pass future itself is dropped.
struct PassGuard<'a> {
    run: &'a Mutex<RunState>,
}

impl<'a> PassGuard<'a> {
    fn acquire(run: &'a Mutex<RunState>) -> Option<Self> {
        let mut state = run.lock();
        if state.syncing {
            debug!(in_flight = state.in_flight, "Sync already in progress");
            return None;
        }
        state.syncing = true;
        Some(Self { run })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.run.lock().syncing = false;
    }
}

/// Runs inbox pipelines and reports on them
pub struct SyncOrchestrator {
    pipeline: InboxPipeline,
    store: Arc<dyn InboxStore>,
    run: Mutex<RunState>,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl SyncOrchestrator {
    pub fn new(
        crypto: Arc<dyn CryptoPort>,
        remote: Arc<dyn RemoteInbox>,
        store: Arc<dyn InboxStore>,
        config: &SyncConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            pipeline: InboxPipeline::new(crypto, remote, store.clone()),
            store,
            run: Mutex::new(RunState::default()),
            event_tx,
        }
    }

    /// Subscribe to sync events.
    ///
    /// Multiple subscribers can exist; events are broadcast to all.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    /// Whether a pass started by [`request_sync`](Self::request_sync) is still running
    pub fn is_syncing(&self) -> bool {
        self.run.lock().syncing
    }

    /// Number of pipelines that have not settled yet
    pub fn in_flight(&self) -> usize {
        self.run.lock().in_flight
    }

    /// Consecutive failed runs for an inbox, reset by a successful one
    pub fn failure_count(&self, public_key: &str) -> u32 {
        self.run
            .lock()
            .failures
            .get(public_key)
            .copied()
            .unwrap_or(0)
    }

    /// Start a pass unless one is already running.
    ///
    /// Returns `false` without doing anything while a previous pass is still
    /// running. Otherwise runs [`sync_all`](Self::sync_all) to completion and
    /// returns `true`. The guard is released after `SyncFinished` is sent.
    /// Pipelines started by [`sync_one`](Self::sync_one) never hold it.
    pub async fn request_sync(&self) -> bool {
        let Some(_guard) = PassGuard::acquire(&self.run) else {
            return false;
        };

        self.sync_all().await;
        true
    }

    /// Run one pipeline per syncable inbox and wait for all of them.
    ///
    /// Inboxes awaiting server registration, and inboxes that already have a
    /// pipeline running, are skipped. Emits [`SyncEvent::SyncFinished`] once
    /// every launched pipeline has settled, even if none were launched.
    pub async fn sync_all(&self) -> SyncReport {
        let inboxes = match self.store.list_syncable_inboxes() {
            Ok(inboxes) => inboxes,
            Err(e) => {
                warn!(error = %e, "Failed to list inboxes");
                Vec::new()
            }
        };

        let mut report = SyncReport::default();
        let mut launched = Vec::with_capacity(inboxes.len());
        {
            let mut run = self.run.lock();
            for inbox in inboxes {
                if inbox.awaiting_registration || run.active.contains_key(&inbox.public_key) {
                    debug!(public_key = %inbox.public_key, "Skipping inbox");
                    report.skipped += 1;
                    continue;
                }
                run.enter(&inbox.public_key);
                let activity = Activity::entered(&self.run, &inbox.public_key);
                launched.push((inbox, activity));
            }
        }

        info!(inboxes = launched.len(), skipped = report.skipped, "Starting sync pass");

        let results = join_all(
            launched
                .into_iter()
                .map(|(inbox, activity)| self.run_tracked(inbox, activity)),
        )
        .await;

        for result in results {
            match result {
                Ok(synced) => {
                    report.synced += 1;
                    report.merged += synced.payloads.len();
                }
                Err(_) => report.failed += 1,
            }
        }

        info!(%report, "Sync pass finished");
        let _ = self.event_tx.send(SyncEvent::SyncFinished(report));
        report
    }

    /// Run the pipeline for a single inbox, outside of any pass.
    ///
    /// This bypasses the overlap guard but still counts as in flight, so a
    /// concurrent pass skips the inbox.
    pub async fn sync_one(&self, public_key: &str) -> InboxResult<SyncedInbox> {
        let inbox = self
            .store
            .find_inbox(public_key)?
            .ok_or_else(|| InboxError::InboxNotFound(public_key.to_string()))?;

        let activity = {
            let mut run = self.run.lock();
            run.enter(&inbox.public_key);
            Activity::entered(&self.run, &inbox.public_key)
        };
        self.run_tracked(inbox, activity).await
    }

    async fn run_tracked(&self, inbox: Inbox, activity: Activity<'_>) -> InboxResult<SyncedInbox> {
        let result = self.pipeline.run(&inbox).await;
        self.record(&inbox.public_key, &result);
        drop(activity);
        result
    }

    fn record(&self, public_key: &str, result: &InboxResult<SyncedInbox>) {
        match result {
            Ok(synced) => {
                self.run.lock().failures.remove(public_key);
                debug!(public_key, merged = synced.payloads.len(), "Inbox synced");

                if synced.did_delete_chat() {
                    info!(public_key, "Chat deleted by contact");
                    let _ = self.event_tx.send(SyncEvent::ChatDeleted {
                        public_key: public_key.to_string(),
                    });
                }
                let _ = self.event_tx.send(SyncEvent::InboxSynced {
                    public_key: public_key.to_string(),
                    merged: synced.payloads.len(),
                });
            }
            Err(e) => {
                let failures = {
                    let mut run = self.run.lock();
                    let count = run.failures.entry(public_key.to_string()).or_insert(0);
                    *count += 1;
                    *count
                };
                warn!(public_key, failures, error = %e, "Inbox sync failed");
                let _ = self.event_tx.send(SyncEvent::InboxFailed {
                    public_key: public_key.to_string(),
                    stage: e.stage(),
                    message: e.to_string(),
                });
            }
        }
    }
}
