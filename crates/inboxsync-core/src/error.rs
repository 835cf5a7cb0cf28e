//! Error types for the inbox synchronization engine

use std::fmt;

use thiserror::Error;

/// Pipeline stage at which an inbox sync failed.
///
/// Callers that only care whether an inbox synced can ignore this; it is kept
/// on [`InboxError::InboxSyncFailed`] so logs and events can tell a rejected
/// challenge apart from a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStage {
    /// Requesting the challenge from the remote service
    Challenge,
    /// Signing the challenge with the inbox keys
    Sign,
    /// Pulling encrypted envelopes
    Pull,
    /// Merging decrypted payloads into the local store
    Merge,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStage::Challenge => write!(f, "challenge"),
            SyncStage::Sign => write!(f, "sign"),
            SyncStage::Pull => write!(f, "pull"),
            SyncStage::Merge => write!(f, "merge"),
        }
    }
}

/// Main error type for inbox sync operations
#[derive(Error, Debug)]
pub enum InboxError {
    /// The inbox carries no keypair and cannot be authenticated
    #[error("Inbox {0} has no key material")]
    MissingKeyMaterial(String),

    /// A pipeline stage failed; the inbox is retried on the next pass
    #[error("Inbox sync failed for {public_key} at {stage} stage: {reason}")]
    InboxSyncFailed {
        /// Public key of the inbox
        public_key: String,
        /// Stage that produced the error
        stage: SyncStage,
        /// Underlying error message
        reason: String,
    },

    /// No inbox with this public key exists in the store
    #[error("Inbox not found: {0}")]
    InboxNotFound(String),

    /// A decrypted envelope could not be turned into a payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Remote inbox service error
    #[error("Network error: {0}")]
    Network(String),

    /// Keypair parsing or encoding error
    #[error("Identity error: {0}")]
    Identity(String),

    /// Error during storage operations (redb)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InboxError {
    /// Wrap a stage error into the flattened pipeline failure.
    pub fn at_stage(public_key: &str, stage: SyncStage, source: InboxError) -> Self {
        InboxError::InboxSyncFailed {
            public_key: public_key.to_string(),
            stage,
            reason: source.to_string(),
        }
    }

    /// Stage attribution, if this is a pipeline failure.
    pub fn stage(&self) -> Option<SyncStage> {
        match self {
            InboxError::InboxSyncFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type alias using InboxError
pub type InboxResult<T> = Result<T, InboxError>;
