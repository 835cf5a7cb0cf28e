//! Sync event types and pass summaries
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SyncEvent: Notifications about sync activity                   │
//! │  ├── SyncFinished: a full pass settled (once per pass)          │
//! │  ├── ChatDeleted: an inbox was purged by a delete-chat message  │
//! │  ├── InboxSynced: one inbox pipeline succeeded                  │
//! │  └── InboxFailed: one inbox pipeline failed                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use crate::error::SyncStage;

/// Summary of one orchestration pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Inboxes whose pipeline succeeded
    pub synced: usize,
    /// Inboxes whose pipeline failed
    pub failed: usize,
    /// Inboxes left out (awaiting registration or already in flight)
    pub skipped: usize,
    /// Payloads merged across all inboxes
    pub merged: usize,
}

impl SyncReport {
    /// Number of pipelines launched in the pass
    pub fn launched(&self) -> usize {
        self.synced + self.failed
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} synced, {} failed, {} skipped, {} messages",
            self.synced, self.failed, self.skipped, self.merged
        )
    }
}

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// Every pipeline launched by a pass has settled
    SyncFinished(SyncReport),
    /// A delete-chat message purged an inbox's messages
    ChatDeleted {
        /// The purged inbox
        public_key: String,
    },
    /// An inbox pipeline succeeded
    InboxSynced {
        public_key: String,
        /// Payloads merged from this pull
        merged: usize,
    },
    /// An inbox pipeline failed
    InboxFailed {
        public_key: String,
        /// Failing stage, `None` for missing key material
        stage: Option<SyncStage>,
        /// Error message
        message: String,
    },
}

impl SyncEvent {
    /// Get the inbox associated with this event, if any
    pub fn public_key(&self) -> Option<&str> {
        match self {
            SyncEvent::SyncFinished(_) => None,
            SyncEvent::ChatDeleted { public_key } => Some(public_key),
            SyncEvent::InboxSynced { public_key, .. } => Some(public_key),
            SyncEvent::InboxFailed { public_key, .. } => Some(public_key),
        }
    }
}
