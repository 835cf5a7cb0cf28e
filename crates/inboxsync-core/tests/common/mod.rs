//! Scripted ports shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use inboxsync_core::{
    ChallengeResponse, CryptoPort, EncryptedEnvelope, InboxError, InboxKeypair, InboxResult,
    PullResponse, RemoteInbox, Storage, SyncConfig, SyncOrchestrator,
};

/// Crypto that signs every challenge as `sig1` and "decrypts" by table lookup
#[derive(Default)]
pub struct ScriptedCrypto {
    plaintexts: Mutex<HashMap<String, String>>,
    pub signed: Mutex<Vec<String>>,
}

impl ScriptedCrypto {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `ciphertext` decrypt to `plaintext`. Unknown ciphertexts fail.
    pub fn learn(&self, ciphertext: &str, plaintext: &str) {
        self.plaintexts
            .lock()
            .insert(ciphertext.to_string(), plaintext.to_string());
    }
}

#[async_trait]
impl CryptoPort for ScriptedCrypto {
    async fn sign(&self, _keys: &InboxKeypair, message: &str) -> InboxResult<String> {
        self.signed.lock().push(message.to_string());
        Ok("sig1".to_string())
    }

    async fn decrypt(&self, ciphertext: &str, _keys: &InboxKeypair) -> InboxResult<String> {
        self.plaintexts
            .lock()
            .get(ciphertext)
            .cloned()
            .ok_or_else(|| InboxError::Crypto(format!("cannot decrypt {}", ciphertext)))
    }
}

/// One observed call on the remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Challenge(String),
    Pull { public_key: String, signature: String },
    Delete(String),
}

/// Remote that answers from per-inbox scripts
#[derive(Default)]
pub struct ScriptedRemote {
    envelopes: Mutex<HashMap<String, Vec<EncryptedEnvelope>>>,
    delays: Mutex<HashMap<String, Duration>>,
    failing_pulls: Mutex<Vec<String>>,
    failing_deletes: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<RemoteCall>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(&self, public_key: &str, envelope: EncryptedEnvelope) {
        self.envelopes
            .lock()
            .entry(public_key.to_string())
            .or_default()
            .push(envelope);
    }

    /// Delay the pull for `public_key`
    pub fn delay(&self, public_key: &str, delay: Duration) {
        self.delays.lock().insert(public_key.to_string(), delay);
    }

    pub fn fail_pull(&self, public_key: &str) {
        self.failing_pulls.lock().push(public_key.to_string());
    }

    pub fn fail_delete(&self, public_key: &str) {
        self.failing_deletes.lock().push(public_key.to_string());
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().clone()
    }

    pub fn challenge_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RemoteCall::Challenge(_)))
            .count()
    }

    pub fn delete_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RemoteCall::Delete(_)))
            .count()
    }
}

#[async_trait]
impl RemoteInbox for ScriptedRemote {
    async fn request_challenge(&self, public_key: &str) -> InboxResult<ChallengeResponse> {
        self.calls
            .lock()
            .push(RemoteCall::Challenge(public_key.to_string()));
        Ok(ChallengeResponse {
            challenge: "abc".to_string(),
        })
    }

    async fn pull_messages(&self, public_key: &str, signature: &str) -> InboxResult<PullResponse> {
        self.calls.lock().push(RemoteCall::Pull {
            public_key: public_key.to_string(),
            signature: signature.to_string(),
        });

        let delay = self.delays.lock().get(public_key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_pulls.lock().iter().any(|k| k == public_key) {
            return Err(InboxError::Network("503 Service Unavailable".to_string()));
        }

        let messages = self
            .envelopes
            .lock()
            .get(public_key)
            .cloned()
            .unwrap_or_default();
        Ok(PullResponse { messages })
    }

    async fn delete_messages(&self, public_key: &str) -> InboxResult<()> {
        self.calls
            .lock()
            .push(RemoteCall::Delete(public_key.to_string()));
        if self.failing_deletes.lock().iter().any(|k| k == public_key) {
            return Err(InboxError::Network("connection reset".to_string()));
        }
        self.envelopes.lock().remove(public_key);
        Ok(())
    }
}

pub fn envelope(ciphertext: &str, tag: &str) -> EncryptedEnvelope {
    EncryptedEnvelope {
        sender_public_key: "contact".to_string(),
        message: ciphertext.to_string(),
        message_type: tag.to_string(),
    }
}

/// JSON body as a counterparty would seal it
pub fn body(id: &str, time: i64) -> String {
    format!(r#"{{"uuid":"{}","time":{},"text":"hello {}"}}"#, id, time, id)
}

pub struct Fixture {
    pub _dir: TempDir,
    pub storage: Arc<Storage>,
    pub crypto: Arc<ScriptedCrypto>,
    pub remote: Arc<ScriptedRemote>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn fixture() -> Fixture {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(Storage::open_dir(dir.path()).unwrap());
    let crypto = Arc::new(ScriptedCrypto::new());
    let remote = Arc::new(ScriptedRemote::new());
    let orchestrator = Arc::new(SyncOrchestrator::new(
        crypto.clone(),
        remote.clone(),
        storage.clone(),
        &SyncConfig::default(),
    ));
    Fixture {
        _dir: dir,
        storage,
        crypto,
        remote,
        orchestrator,
    }
}
