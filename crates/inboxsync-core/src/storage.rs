//! Persistent storage using redb.
//!
//! This module provides ACID-compliant storage for:
//! - Inboxes (key material and owner)
//! - Messages, keyed by inbox public key and message id
//!
//! [`Storage`] also implements [`InboxStore`], the narrow interface the sync
//! pipeline merges through.

use crate::error::InboxError;
use crate::message::MessagePayload;
use crate::types::Inbox;
use parking_lot::RwLock;
use redb::Database;
use std::path::Path;
use std::sync::Arc;

// Submodules
mod inboxes;
mod messages;

use inboxes::INBOXES_TABLE;
use messages::MESSAGES_TABLE;

/// File name of the database inside a data directory
pub const DB_FILE_NAME: &str = "inboxsync.redb";

/// Result of merging one pulled batch into the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The batch carried a delete-chat request and the inbox was purged
    pub did_delete_chat: bool,
    /// Messages that were not stored before
    pub inserted: usize,
    /// Messages whose id was already stored
    pub updated: usize,
}

/// Store operations the sync engine depends on.
///
/// Implementations must serialize their own writes; concurrent pipelines
/// call `merge_or_delete` for different inboxes at the same time.
pub trait InboxStore: Send + Sync {
    /// Every inbox tied to a user offer, plus the personal inbox.
    fn list_syncable_inboxes(&self) -> Result<Vec<Inbox>, InboxError>;

    /// Look up one inbox by public key.
    fn find_inbox(&self, public_key: &str) -> Result<Option<Inbox>, InboxError>;

    /// Apply a decrypted batch to the inbox's messages.
    ///
    /// If any payload is a delete-chat request, all of the inbox's messages
    /// are removed and nothing is upserted. Otherwise every payload is
    /// upserted by id; applying the same batch twice leaves the same state.
    fn merge_or_delete(
        &self,
        inbox: &Inbox,
        payloads: &[MessagePayload],
    ) -> Result<MergeOutcome, InboxError>;
}

/// Storage layer using redb for ACID-compliant persistence
#[derive(Clone)]
pub struct Storage {
    db: Arc<RwLock<Database>>,
}

impl Storage {
    /// Create a new storage instance at the given path.
    ///
    /// This will:
    /// - Create the database directory if it doesn't exist
    /// - Initialize the database file
    /// - Create all required tables
    pub fn new(path: impl AsRef<Path>) -> Result<Self, InboxError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(INBOXES_TABLE)?;
            let _ = write_txn.open_table(MESSAGES_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
        })
    }

    /// Open the database inside a data directory.
    pub fn open_dir(data_dir: impl AsRef<Path>) -> Result<Self, InboxError> {
        Self::new(data_dir.as_ref().join(DB_FILE_NAME))
    }

    fn db_handle(&self) -> Arc<RwLock<Database>> {
        self.db.clone()
    }
}

impl InboxStore for Storage {
    fn list_syncable_inboxes(&self) -> Result<Vec<Inbox>, InboxError> {
        let mut inboxes = self.list_inboxes()?;
        // offer inboxes first, then the personal one
        inboxes.sort_by_key(|inbox| inbox.is_personal());
        Ok(inboxes)
    }

    fn find_inbox(&self, public_key: &str) -> Result<Option<Inbox>, InboxError> {
        self.load_inbox(public_key)
    }

    fn merge_or_delete(
        &self,
        inbox: &Inbox,
        payloads: &[MessagePayload],
    ) -> Result<MergeOutcome, InboxError> {
        if payloads.iter().any(MessagePayload::purges_chat) {
            self.purge_messages(&inbox.public_key)?;
            return Ok(MergeOutcome {
                did_delete_chat: true,
                ..Default::default()
            });
        }
        self.upsert_messages(&inbox.public_key, payloads)
    }
}
