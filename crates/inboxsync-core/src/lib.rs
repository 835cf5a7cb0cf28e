//! Inbox Sync Core Library
//!
//! Keeps local copies of encrypted mailboxes in step with a remote inbox
//! service.
//!
//! ## Overview
//!
//! Every inbox is addressed by its public key. A sync run for one inbox
//! proves ownership with a signed challenge, pulls the envelopes queued for
//! it, decrypts them, merges the payloads into local storage and asks the
//! service to drop what was pulled. The [`SyncOrchestrator`] runs that
//! pipeline for all inboxes at once and never lets two passes overlap; the
//! [`SyncScheduler`] triggers passes on a timer whenever push notifications
//! are not available.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use inboxsync_core::{
//!     Inbox, LocalCrypto, MemoryRemote, OfferId, Storage, SyncConfig, SyncOrchestrator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Arc::new(Storage::open_dir("~/.inboxsync/data")?);
//!     storage.save_inbox(&Inbox::for_offer(OfferId::new()))?;
//!
//!     let orchestrator = SyncOrchestrator::new(
//!         Arc::new(LocalCrypto::new()),
//!         Arc::new(MemoryRemote::new()),
//!         storage,
//!         &SyncConfig::default(),
//!     );
//!     let report = orchestrator.sync_all().await;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod message;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod types;

// Re-exports
pub use config::SyncConfig;
pub use crypto::{CryptoPort, LocalCrypto};
pub use error::{InboxError, InboxResult, SyncStage};
pub use identity::{InboxKeypair, InboxPublicKey};
pub use message::{ChatUser, EncryptedEnvelope, MessagePayload, MessageType};
pub use remote::{ChallengeResponse, MemoryRemote, PullResponse, RemoteInbox};
pub use storage::{InboxStore, MergeOutcome, Storage};
pub use sync::{
    InboxPipeline, SchedulerState, SyncEvent, SyncOrchestrator, SyncReport, SyncScheduler,
    SyncedInbox,
};
pub use types::*;
