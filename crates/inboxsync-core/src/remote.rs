//! Remote inbox service port
//!
//! The backend exposes three calls per inbox, all keyed by the inbox public
//! key: request a challenge, pull messages with the signed challenge, and
//! delete the messages that were pulled.
//!
//! [`MemoryRemote`] is a complete in-process mailbox server. It issues
//! single-use challenges and checks signatures against the inbox key, so it
//! exercises the same authentication path a real server does.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::crypto;
use crate::error::{InboxError, InboxResult};
use crate::identity::InboxPublicKey;
use crate::message::{EncryptedEnvelope, MessagePayload};

/// Response to a challenge request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeResponse {
    pub challenge: String,
}

/// Response to a pull request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResponse {
    pub messages: Vec<EncryptedEnvelope>,
}

/// The remote mailbox service.
#[async_trait]
pub trait RemoteInbox: Send + Sync {
    /// Ask the service for a challenge to sign.
    async fn request_challenge(&self, public_key: &str) -> InboxResult<ChallengeResponse>;

    /// Pull pending envelopes, proving ownership with the signed challenge.
    async fn pull_messages(&self, public_key: &str, signature: &str) -> InboxResult<PullResponse>;

    /// Drop the envelopes held for this inbox.
    async fn delete_messages(&self, public_key: &str) -> InboxResult<()>;
}

/// Number of calls each endpoint has served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteCallCounts {
    pub challenges: usize,
    pub pulls: usize,
    pub deletes: usize,
}

/// In-memory mailbox server.
#[derive(Default)]
pub struct MemoryRemote {
    mailboxes: Mutex<HashMap<String, Vec<EncryptedEnvelope>>>,
    challenges: Mutex<HashMap<String, String>>,
    challenge_calls: AtomicUsize,
    pull_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an envelope for `recipient`.
    pub fn deliver(&self, recipient: &str, envelope: EncryptedEnvelope) {
        self.mailboxes
            .lock()
            .entry(recipient.to_string())
            .or_default()
            .push(envelope);
    }

    /// Seal `payload` to `recipient` and queue it.
    ///
    /// The sender is taken from `payload.inbox_key`.
    pub fn send(&self, recipient: &str, payload: &MessagePayload) -> InboxResult<()> {
        let recipient_key = InboxPublicKey::from_base58(recipient)?;
        let plaintext = payload.to_plaintext()?;
        let sealed = crypto::seal(plaintext.as_bytes(), &recipient_key)?;
        self.deliver(
            recipient,
            EncryptedEnvelope {
                sender_public_key: payload.inbox_key.clone(),
                message: sealed,
                message_type: payload.message_type.as_wire().to_string(),
            },
        );
        Ok(())
    }

    /// Envelopes currently held for `public_key`
    pub fn pending(&self, public_key: &str) -> usize {
        self.mailboxes
            .lock()
            .get(public_key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn call_counts(&self) -> RemoteCallCounts {
        RemoteCallCounts {
            challenges: self.challenge_calls.load(Ordering::SeqCst),
            pulls: self.pull_calls.load(Ordering::SeqCst),
            deletes: self.delete_calls.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl RemoteInbox for MemoryRemote {
    async fn request_challenge(&self, public_key: &str) -> InboxResult<ChallengeResponse> {
        self.challenge_calls.fetch_add(1, Ordering::SeqCst);

        let mut nonce = [0u8; 32];
        rand::rng().fill_bytes(&mut nonce);
        let challenge = bs58::encode(nonce).into_string();

        self.challenges
            .lock()
            .insert(public_key.to_string(), challenge.clone());
        debug!(public_key, "Issued challenge");
        Ok(ChallengeResponse { challenge })
    }

    async fn pull_messages(&self, public_key: &str, signature: &str) -> InboxResult<PullResponse> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);

        let challenge = self
            .challenges
            .lock()
            .remove(public_key)
            .ok_or_else(|| InboxError::Network("No outstanding challenge".to_string()))?;

        let key = InboxPublicKey::from_base58(public_key)
            .map_err(|e| InboxError::Network(format!("Unknown inbox key: {}", e)))?;
        if !key.verify_encoded(challenge.as_bytes(), signature) {
            return Err(InboxError::Network("Invalid challenge signature".to_string()));
        }

        let messages = self
            .mailboxes
            .lock()
            .get(public_key)
            .cloned()
            .unwrap_or_default();
        Ok(PullResponse { messages })
    }

    async fn delete_messages(&self, public_key: &str) -> InboxResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.mailboxes.lock().remove(public_key);
        Ok(())
    }
}
