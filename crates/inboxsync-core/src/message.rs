//! Message types: encrypted envelopes and decrypted payloads
//!
//! An [`EncryptedEnvelope`] is what the remote service hands back from a pull.
//! Once decrypted, its JSON body becomes a [`MessagePayload`], which is also
//! the record the store keeps.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{InboxError, InboxResult};

/// Content type of a message, as tagged by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Plain text message
    Message,
    /// Image message
    Image,
    /// Request to start communicating
    MessagingRequest,
    /// Communication request accepted
    MessagingApproval,
    /// Communication request rejected
    MessagingRejection,
    /// Request to reveal the anonymous identity
    RevealRequest,
    /// Identity reveal accepted
    RevealApproval,
    /// Identity reveal rejected
    RevealRejection,
    /// Counterparty deleted the chat
    DeleteChat,
    /// Older clients' communication request
    LegacyCommunicationRequest,
    /// Unknown tag
    Invalid,
}

impl MessageType {
    /// Parse a wire tag; unknown tags map to [`MessageType::Invalid`].
    pub fn from_wire(tag: &str) -> Self {
        match tag {
            "MESSAGE" => MessageType::Message,
            "IMAGE" => MessageType::Image,
            "REQUEST_MESSAGING" => MessageType::MessagingRequest,
            "APPROVE_MESSAGING" => MessageType::MessagingApproval,
            "DISAPPROVE_MESSAGING" => MessageType::MessagingRejection,
            "REQUEST_REVEAL" => MessageType::RevealRequest,
            "APPROVE_REVEAL" => MessageType::RevealApproval,
            "DISAPPROVE_REVEAL" => MessageType::RevealRejection,
            "DELETE_CHAT" => MessageType::DeleteChat,
            "COMMUNICATION_REQUEST" => MessageType::LegacyCommunicationRequest,
            _ => MessageType::Invalid,
        }
    }

    /// Wire tag for this type
    pub fn as_wire(&self) -> &'static str {
        match self {
            MessageType::Message => "MESSAGE",
            MessageType::Image => "IMAGE",
            MessageType::MessagingRequest => "REQUEST_MESSAGING",
            MessageType::MessagingApproval => "APPROVE_MESSAGING",
            MessageType::MessagingRejection => "DISAPPROVE_MESSAGING",
            MessageType::RevealRequest => "REQUEST_REVEAL",
            MessageType::RevealApproval => "APPROVE_REVEAL",
            MessageType::RevealRejection => "DISAPPROVE_REVEAL",
            MessageType::DeleteChat => "DELETE_CHAT",
            MessageType::LegacyCommunicationRequest => "COMMUNICATION_REQUEST",
            MessageType::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Encrypted message as returned by the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    /// Inbox public key of the sender
    pub sender_public_key: String,
    /// Sealed JSON body
    pub message: String,
    /// Wire tag, see [`MessageType::from_wire`]
    pub message_type: String,
}

impl EncryptedEnvelope {
    pub fn kind(&self) -> MessageType {
        MessageType::from_wire(&self.message_type)
    }
}

/// Identity the counterparty revealed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    pub name: String,
    pub image_url: Option<String>,
    /// Base64 avatar
    pub image_data: Option<String>,
}

/// Decrypted, typed message ready for storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Stable identifier, unique within the inbox
    pub id: String,
    /// Inbox the message was delivered to
    pub inbox_key: String,
    /// Inbox of the counterparty
    pub contact_inbox_key: String,
    pub text: Option<String>,
    /// Encrypted or base64 image body
    pub image: Option<String>,
    pub message_type: MessageType,
    /// Unix timestamp in milliseconds
    pub time: i64,
    pub user: Option<ChatUser>,
    /// Authored by the counterparty rather than the local user
    pub is_contact: bool,
}

/// JSON body inside a sealed envelope
#[derive(Debug, Serialize, Deserialize)]
struct PlainBody {
    uuid: String,
    time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(
        rename = "deanonymizedUser",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    user: Option<PlainUser>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PlainUser {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(
        rename = "imageBase64",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    image_base64: Option<String>,
}

impl MessagePayload {
    /// Materialize a payload from a decrypted envelope body.
    ///
    /// Fails with [`InboxError::Decode`] if the body is not JSON or lacks
    /// `uuid` / `time`.
    pub fn from_envelope(
        envelope: &EncryptedEnvelope,
        plaintext: &str,
        inbox_public_key: &str,
    ) -> InboxResult<Self> {
        let body: PlainBody = serde_json::from_str(plaintext)
            .map_err(|e| InboxError::Decode(format!("Invalid message body: {}", e)))?;

        Ok(Self {
            id: body.uuid,
            inbox_key: inbox_public_key.to_string(),
            contact_inbox_key: envelope.sender_public_key.clone(),
            text: body.text,
            image: body.image,
            message_type: envelope.kind(),
            time: body.time,
            user: body.user.map(|u| ChatUser {
                name: u.name,
                image_url: u.image,
                image_data: u.image_base64,
            }),
            is_contact: true,
        })
    }

    /// Build an outgoing text payload authored by the local user.
    pub fn outgoing(
        inbox_key: &str,
        contact_inbox_key: &str,
        message_type: MessageType,
        text: Option<String>,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            inbox_key: inbox_key.to_string(),
            contact_inbox_key: contact_inbox_key.to_string(),
            text,
            image: None,
            message_type,
            time: chrono::Utc::now().timestamp_millis(),
            user: None,
            is_contact: false,
        }
    }

    /// Encode the JSON body that gets sealed into an envelope.
    pub fn to_plaintext(&self) -> InboxResult<String> {
        let body = PlainBody {
            uuid: self.id.clone(),
            time: self.time,
            text: self.text.clone(),
            image: self.image.clone(),
            user: self.user.as_ref().map(|u| PlainUser {
                name: u.name.clone(),
                image: u.image_url.clone(),
                image_base64: u.image_data.clone(),
            }),
        };
        serde_json::to_string(&body).map_err(|e| InboxError::Serialization(e.to_string()))
    }

    /// Whether this payload ends the chat and purges its messages.
    ///
    /// A contact deleting the chat and a rejected messaging request both do.
    pub fn purges_chat(&self) -> bool {
        matches!(
            self.message_type,
            MessageType::DeleteChat | MessageType::MessagingRejection
        )
    }
}
