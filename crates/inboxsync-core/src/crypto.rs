//! Crypto port and its local implementation
//!
//! The sync pipeline only needs two operations from cryptography: signing a
//! challenge and decrypting an envelope. [`CryptoPort`] captures exactly that.
//! [`LocalCrypto`] implements it with Ed25519 signatures and sealed boxes.
//!
//! # Sealed box wire format
//!
//! ```text
//! base64( [ephemeral x25519 pk: 32 bytes][nonce: 12 bytes][ciphertext + tag] )
//! ```
//!
//! The content key is `HKDF-SHA256(x25519(ephemeral, recipient), info)` where
//! `info` binds both public keys, and the payload is sealed with
//! ChaCha20-Poly1305.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519StaticSecret};

use crate::error::{InboxError, InboxResult};
use crate::identity::{InboxKeypair, InboxPublicKey};

/// Nonce size for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_SIZE: usize = 12;

/// Domain separation string for HKDF
const HKDF_INFO: &[u8] = b"inboxsync-sealed-box-v1";

/// Signing and decryption as seen by the sync pipeline.
#[async_trait]
pub trait CryptoPort: Send + Sync {
    /// Sign `message` with the inbox's private key, returning the wire form.
    async fn sign(&self, keys: &InboxKeypair, message: &str) -> InboxResult<String>;

    /// Decrypt an envelope body addressed to the inbox.
    async fn decrypt(&self, ciphertext: &str, keys: &InboxKeypair) -> InboxResult<String>;
}

/// In-process implementation of [`CryptoPort`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCrypto;

impl LocalCrypto {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CryptoPort for LocalCrypto {
    async fn sign(&self, keys: &InboxKeypair, message: &str) -> InboxResult<String> {
        Ok(keys.sign_encoded(message.as_bytes()))
    }

    async fn decrypt(&self, ciphertext: &str, keys: &InboxKeypair) -> InboxResult<String> {
        let plaintext = open(ciphertext, keys)?;
        String::from_utf8(plaintext)
            .map_err(|e| InboxError::Crypto(format!("Plaintext is not UTF-8: {}", e)))
    }
}

/// Seal `plaintext` so only the holder of `recipient`'s keypair can open it.
pub fn seal(plaintext: &[u8], recipient: &InboxPublicKey) -> InboxResult<String> {
    let mut ephemeral_seed = [0u8; 32];
    rand::rng().fill_bytes(&mut ephemeral_seed);
    let ephemeral_secret = X25519StaticSecret::from(ephemeral_seed);
    let ephemeral_public = X25519PublicKey::from(&ephemeral_secret);

    let shared = ephemeral_secret.diffie_hellman(recipient.exchange());
    let key = derive_key(shared.as_bytes(), &ephemeral_public, recipient.exchange())?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new((&key).into());
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| InboxError::Crypto(format!("Encryption failed: {}", e)))?;

    let mut out = Vec::with_capacity(32 + NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(out))
}

/// Open a sealed box produced by [`seal`].
pub fn open(sealed: &str, keys: &InboxKeypair) -> InboxResult<Vec<u8>> {
    let data = BASE64
        .decode(sealed.trim())
        .map_err(|e| InboxError::Crypto(format!("Invalid base64 ciphertext: {}", e)))?;

    // ephemeral key + nonce + 16-byte tag
    if data.len() < 32 + NONCE_SIZE + 16 {
        return Err(InboxError::Crypto("Ciphertext too short".to_string()));
    }

    let ephemeral_bytes: [u8; 32] = data[..32]
        .try_into()
        .map_err(|_| InboxError::Crypto("Invalid ephemeral key".to_string()))?;
    let ephemeral_public = X25519PublicKey::from(ephemeral_bytes);
    let nonce = &data[32..32 + NONCE_SIZE];
    let ciphertext = &data[32 + NONCE_SIZE..];

    let recipient_public = X25519PublicKey::from(keys.exchange_secret());
    let shared = keys.exchange_secret().diffie_hellman(&ephemeral_public);
    let key = derive_key(shared.as_bytes(), &ephemeral_public, &recipient_public)?;

    let cipher = ChaCha20Poly1305::new((&key).into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| InboxError::Crypto("Decryption failed".to_string()))
}

/// Derive the 32-byte content key from a shared secret using HKDF-SHA256.
fn derive_key(
    shared_secret: &[u8],
    ephemeral: &X25519PublicKey,
    recipient: &X25519PublicKey,
) -> InboxResult<[u8; 32]> {
    let mut info = Vec::with_capacity(HKDF_INFO.len() + 64);
    info.extend_from_slice(HKDF_INFO);
    info.extend_from_slice(ephemeral.as_bytes());
    info.extend_from_slice(recipient.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let mut output = [0u8; 32];
    hkdf.expand(&info, &mut output)
        .map_err(|e| InboxError::Crypto(format!("Key derivation failed: {}", e)))?;
    Ok(output)
}
