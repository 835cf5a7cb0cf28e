//! Per-inbox sync pipeline
//!
//! One run authenticates against the remote service, pulls pending
//! envelopes, decrypts them, merges the result into the store and finally
//! asks the service to drop what was pulled:
//!
//! ```text
//! challenge ──▶ sign ──▶ pull ──▶ decrypt ──▶ merge ──▶ delete-ack
//!                          │ empty                         (best effort)
//!                          └──▶ done
//! ```
//!
//! Stage errors before the merge abort the run. Envelopes that fail to
//! decrypt or decode are dropped one by one. A failed delete-ack is logged
//! and the envelopes are pulled again on the next run; merging is idempotent
//! so that is harmless.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::crypto::CryptoPort;
use crate::error::{InboxError, InboxResult, SyncStage};
use crate::identity::InboxKeypair;
use crate::message::{EncryptedEnvelope, MessagePayload};
use crate::remote::RemoteInbox;
use crate::storage::{InboxStore, MergeOutcome};
use crate::types::Inbox;

/// Result of one successful pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncedInbox {
    /// The inbox that was synced
    pub public_key: String,
    /// Payloads handed to the store, in pull order
    pub payloads: Vec<MessagePayload>,
    /// What the store did with them
    pub merge: MergeOutcome,
}

impl SyncedInbox {
    fn nothing_pulled(public_key: &str) -> Self {
        Self {
            public_key: public_key.to_string(),
            ..Default::default()
        }
    }

    /// Whether the batch purged the inbox
    pub fn did_delete_chat(&self) -> bool {
        self.merge.did_delete_chat
    }
}

/// The challenge → sign → pull → decrypt → merge → delete-ack chain
#[derive(Clone)]
pub struct InboxPipeline {
    crypto: Arc<dyn CryptoPort>,
    remote: Arc<dyn RemoteInbox>,
    store: Arc<dyn InboxStore>,
}

impl InboxPipeline {
    pub fn new(
        crypto: Arc<dyn CryptoPort>,
        remote: Arc<dyn RemoteInbox>,
        store: Arc<dyn InboxStore>,
    ) -> Self {
        Self {
            crypto,
            remote,
            store,
        }
    }

    /// Run the full chain for one inbox.
    ///
    /// Returns [`InboxError::MissingKeyMaterial`] without touching the remote
    /// service if the inbox has no keypair. Any other failure is reported as
    /// [`InboxError::InboxSyncFailed`] carrying the failing stage.
    pub async fn run(&self, inbox: &Inbox) -> InboxResult<SyncedInbox> {
        let public_key = inbox.public_key.as_str();
        let keys = inbox
            .keys
            .as_ref()
            .ok_or_else(|| InboxError::MissingKeyMaterial(public_key.to_string()))?;

        let challenge = self
            .remote
            .request_challenge(public_key)
            .await
            .map_err(|e| InboxError::at_stage(public_key, SyncStage::Challenge, e))?
            .challenge;

        let signature = self
            .crypto
            .sign(keys, &challenge)
            .await
            .map_err(|e| InboxError::at_stage(public_key, SyncStage::Sign, e))?;

        let envelopes = self
            .remote
            .pull_messages(public_key, &signature)
            .await
            .map_err(|e| InboxError::at_stage(public_key, SyncStage::Pull, e))?
            .messages;

        if envelopes.is_empty() {
            debug!(public_key, "No pending messages");
            return Ok(SyncedInbox::nothing_pulled(public_key));
        }

        let payloads = self.decrypt_all(public_key, keys, &envelopes).await;
        debug!(
            public_key,
            pulled = envelopes.len(),
            decoded = payloads.len(),
            "Decrypted pulled envelopes"
        );

        let merge = self
            .store
            .merge_or_delete(inbox, &payloads)
            .map_err(|e| InboxError::at_stage(public_key, SyncStage::Merge, e))?;

        self.acknowledge(public_key).await;

        Ok(SyncedInbox {
            public_key: public_key.to_string(),
            payloads,
            merge,
        })
    }

    /// Decrypt and decode each envelope, keeping pull order.
    async fn decrypt_all(
        &self,
        public_key: &str,
        keys: &InboxKeypair,
        envelopes: &[EncryptedEnvelope],
    ) -> Vec<MessagePayload> {
        let mut payloads = Vec::with_capacity(envelopes.len());
        for (index, envelope) in envelopes.iter().enumerate() {
            let plaintext = match self.crypto.decrypt(&envelope.message, keys).await {
                Ok(plaintext) => plaintext,
                Err(e) => {
                    debug!(public_key, index, error = %e, "Dropping undecryptable envelope");
                    continue;
                }
            };
            match MessagePayload::from_envelope(envelope, &plaintext, public_key) {
                Ok(payload) => payloads.push(payload),
                Err(e) => {
                    debug!(public_key, index, error = %e, "Dropping undecodable envelope");
                }
            }
        }
        payloads
    }

    async fn acknowledge(&self, public_key: &str) {
        if let Err(e) = self.remote.delete_messages(public_key).await {
            warn!(public_key, error = %e, "Failed to delete pulled messages");
        }
    }
}
