//! Inbox key material
//!
//! Every inbox owns one [`InboxKeypair`]. Its public half, encoded as base58,
//! is the address the remote service files messages under.
//!
//! ```rust
//! use inboxsync_core::identity::{InboxKeypair, InboxPublicKey};
//!
//! let keys = InboxKeypair::generate();
//! let address = keys.public_key_string();
//!
//! let signature = keys.sign_encoded(b"challenge");
//! let public = InboxPublicKey::from_base58(&address).unwrap();
//! assert!(public.verify_encoded(b"challenge", &signature));
//! ```

mod keypair;

pub use keypair::{InboxKeypair, InboxPublicKey, PUBLIC_KEY_LEN};
