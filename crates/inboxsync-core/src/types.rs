//! Core types for inbox synchronization

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::identity::InboxKeypair;

/// Unique identifier for a user-owned offer
///
/// Uses ULID for time-ordered unique identifiers that sort lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfferId(pub Ulid);

impl OfferId {
    /// Create a new OfferId with current timestamp
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse from string representation
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for OfferId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OfferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an inbox belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InboxOwner {
    /// Inbox created for one of the user's offers
    Offer(OfferId),
    /// The user's personal inbox, tied to their profile
    Profile,
}

/// A cryptographically addressed mailbox
///
/// The public key is the stable identifier used by the remote service.
/// An inbox without a keypair is still listed but every pipeline run on it
/// fails with [`crate::InboxError::MissingKeyMaterial`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inbox {
    /// Encoded public key (see [`InboxKeypair::public_key_string`])
    pub public_key: String,
    /// Key material, absent for inboxes whose keys were lost or never stored
    pub keys: Option<InboxKeypair>,
    /// Offer or personal profile
    pub owner: InboxOwner,
    /// Set while the inbox is queued for server-side creation
    #[serde(default)]
    pub awaiting_registration: bool,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
}

impl Inbox {
    /// Create an inbox for the given keypair.
    pub fn new(keys: InboxKeypair, owner: InboxOwner) -> Self {
        Self {
            public_key: keys.public_key_string(),
            keys: Some(keys),
            owner,
            awaiting_registration: false,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a fresh offer inbox with newly generated keys.
    pub fn for_offer(offer_id: OfferId) -> Self {
        Self::new(InboxKeypair::generate(), InboxOwner::Offer(offer_id))
    }

    /// Create a fresh personal inbox with newly generated keys.
    pub fn personal() -> Self {
        Self::new(InboxKeypair::generate(), InboxOwner::Profile)
    }

    /// Whether this is the personal inbox
    pub fn is_personal(&self) -> bool {
        self.owner == InboxOwner::Profile
    }
}
