//! Inbox keypair combining Ed25519 signing and X25519 key agreement
//!
//! The signing half answers the remote service's challenges; the key
//! agreement half opens the sealed boxes senders address to the inbox.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519StaticSecret};

use crate::error::InboxError;

/// Length of an encoded public key: [ed25519: 32 bytes][x25519: 32 bytes]
pub const PUBLIC_KEY_LEN: usize = 64;

/// Private key material for one inbox.
pub struct InboxKeypair {
    /// Ed25519 signing key
    signing: SigningKey,
    /// X25519 static secret for opening sealed boxes
    exchange: X25519StaticSecret,
}

impl InboxKeypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let mut signing_seed = [0u8; 32];
        let mut exchange_seed = [0u8; 32];
        rand::rng().fill_bytes(&mut signing_seed);
        rand::rng().fill_bytes(&mut exchange_seed);
        Self::from_seeds(&signing_seed, &exchange_seed)
    }

    /// Build a keypair from two 32-byte seeds
    pub fn from_seeds(signing_seed: &[u8; 32], exchange_seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(signing_seed),
            exchange: X25519StaticSecret::from(*exchange_seed),
        }
    }

    /// Get the public half
    pub fn public_key(&self) -> InboxPublicKey {
        InboxPublicKey {
            signing: self.signing.verifying_key(),
            exchange: X25519PublicKey::from(&self.exchange),
        }
    }

    /// Base58 form of the public key, used as the inbox identifier
    pub fn public_key_string(&self) -> String {
        self.public_key().to_base58()
    }

    /// Sign a message with the Ed25519 key
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing.sign(message)
    }

    /// Sign a message and return the base64 signature sent over the wire
    pub fn sign_encoded(&self, message: &[u8]) -> String {
        BASE64.encode(self.sign(message).to_bytes())
    }

    pub(crate) fn exchange_secret(&self) -> &X25519StaticSecret {
        &self.exchange
    }

    /// Serialize the private key material
    ///
    /// Format: [ed25519_seed: 32 bytes][x25519_secret: 32 bytes]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(64);
        bytes.extend_from_slice(self.signing.as_bytes());
        bytes.extend_from_slice(self.exchange.as_bytes());
        bytes
    }

    /// Deserialize a keypair from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InboxError> {
        if bytes.len() != 64 {
            return Err(InboxError::Identity(format!(
                "Keypair must be 64 bytes (got {})",
                bytes.len()
            )));
        }
        let signing_seed: [u8; 32] = bytes[..32]
            .try_into()
            .map_err(|_| InboxError::Identity("Invalid Ed25519 seed".to_string()))?;
        let exchange_seed: [u8; 32] = bytes[32..]
            .try_into()
            .map_err(|_| InboxError::Identity("Invalid X25519 secret".to_string()))?;
        Ok(Self::from_seeds(&signing_seed, &exchange_seed))
    }
}

impl Clone for InboxKeypair {
    fn clone(&self) -> Self {
        Self {
            signing: SigningKey::from_bytes(self.signing.as_bytes()),
            exchange: X25519StaticSecret::from(self.exchange.to_bytes()),
        }
    }
}

impl std::fmt::Debug for InboxKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboxKeypair")
            .field("public_key", &self.public_key_string())
            .finish_non_exhaustive()
    }
}

impl Serialize for InboxKeypair {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for InboxKeypair {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = <Vec<u8>>::deserialize(deserializer)?;
        Self::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

/// Public half of an [`InboxKeypair`]
#[derive(Clone, PartialEq, Eq)]
pub struct InboxPublicKey {
    signing: VerifyingKey,
    exchange: X25519PublicKey,
}

impl InboxPublicKey {
    /// Verify a base64 signature produced by [`InboxKeypair::sign_encoded`]
    pub fn verify_encoded(&self, message: &[u8], signature: &str) -> bool {
        let Ok(bytes) = BASE64.decode(signature) else {
            return false;
        };
        let Ok(bytes) = <[u8; 64]>::try_from(bytes.as_slice()) else {
            return false;
        };
        let signature = Signature::from_bytes(&bytes);
        self.signing.verify(message, &signature).is_ok()
    }

    /// X25519 key senders seal messages to
    pub fn exchange(&self) -> &X25519PublicKey {
        &self.exchange
    }

    /// Serialize the public key
    ///
    /// Format: [ed25519: 32 bytes][x25519: 32 bytes]
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        let mut bytes = [0u8; PUBLIC_KEY_LEN];
        bytes[..32].copy_from_slice(self.signing.as_bytes());
        bytes[32..].copy_from_slice(self.exchange.as_bytes());
        bytes
    }

    /// Deserialize a public key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InboxError> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(InboxError::Identity(format!(
                "Public key must be {} bytes (got {})",
                PUBLIC_KEY_LEN,
                bytes.len()
            )));
        }
        let signing_bytes: [u8; 32] = bytes[..32]
            .try_into()
            .map_err(|_| InboxError::Identity("Invalid Ed25519 public key length".to_string()))?;
        let signing = VerifyingKey::from_bytes(&signing_bytes)
            .map_err(|_| InboxError::Identity("Invalid Ed25519 public key".to_string()))?;
        let exchange_bytes: [u8; 32] = bytes[32..]
            .try_into()
            .map_err(|_| InboxError::Identity("Invalid X25519 public key length".to_string()))?;
        Ok(Self {
            signing,
            exchange: X25519PublicKey::from(exchange_bytes),
        })
    }

    /// Convert to base58 string
    pub fn to_base58(&self) -> String {
        bs58::encode(self.to_bytes()).into_string()
    }

    /// Parse from base58 string
    pub fn from_base58(s: &str) -> Result<Self, InboxError> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| InboxError::Identity(format!("Invalid base58 public key: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

impl std::fmt::Debug for InboxPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InboxPublicKey({})", self.to_base58())
    }
}
