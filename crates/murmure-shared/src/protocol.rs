use serde::{Deserialize, Serialize};

use crate::crypto::{EncryptionKeys, SymmetricKey};
use crate::types::{ClientId, MessageId, UserId};
use crate::MurmureError;

/// Content of one logical message, as serialized into the per-device
/// plaintext. System records never travel over this payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageContent {
    /// Plain text with @-mentions resolved to user identifiers.
    Text { body: String, mentions: Vec<UserId> },

    /// Binary attachment metadata (the blob itself travels separately).
    Asset(AssetContent),

    /// Delivery confirmation for a previously received message.
    Confirmation { first_message: MessageId },

    /// Interactive action (button press) referring back to the message
    /// that carried the button.
    ButtonAction { reference_message: MessageId },

    /// Delete-for-everyone tombstone.
    Deleted { message: MessageId },

    /// Externalized-payload pointer: the real content was encrypted once
    /// under `otr_key` and shipped as the envelope's shared blob; `sha256`
    /// authenticates that blob.
    External {
        otr_key: SymmetricKey,
        sha256: [u8; 32],
    },
}

impl MessageContent {
    pub fn is_confirmation(&self) -> bool {
        matches!(self, MessageContent::Confirmation { .. })
    }

    pub fn is_external(&self) -> bool {
        matches!(self, MessageContent::External { .. })
    }
}

/// Metadata of the original file behind an asset message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetOriginal {
    pub name: Option<String>,
    pub size: u64,
    pub mime_type: String,
}

/// Preview (thumbnail) metadata for an asset message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetPreview {
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotUploadedReason {
    Cancelled,
    Failed,
}

/// Transfer outcome for the asset blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssetTransfer {
    NotUploaded(NotUploadedReason),
    Uploaded {
        asset_id: String,
        keys: EncryptionKeys,
    },
}

/// Immutable asset record: original / preview / transfer outcome.
/// Built once via `AssetBuilder`, never merged in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetContent {
    pub original: Option<AssetOriginal>,
    pub preview: Option<AssetPreview>,
    pub transfer: Option<AssetTransfer>,
}

/// The per-device plaintext: what actually gets encrypted once per
/// recipient device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plaintext {
    pub message_id: MessageId,
    pub content: MessageContent,
}

impl Plaintext {
    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, MurmureError> {
        bincode::serialize(self).map_err(|e| MurmureError::Serialization(e.to_string()))
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, MurmureError> {
        bincode::deserialize(data).map_err(|e| MurmureError::Serialization(e.to_string()))
    }
}

/// One ciphertext for one device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientEntry {
    pub client: ClientId,
    pub ciphertext: Vec<u8>,
}

/// All device ciphertexts for one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntry {
    pub user: UserId,
    pub clients: Vec<ClientEntry>,
}

/// Multi-recipient envelope submitted to the backend.
///
/// The serialized layout is part of the wire contract and must stay stable:
/// sender device, native-push flag, per-user/per-client ciphertext entries,
/// the optional list of users the server must still treat as mandatory, and
/// the optional shared ciphertext blob (externalized path only).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub sender: ClientId,
    pub native_push: bool,
    pub recipients: Vec<UserEntry>,
    pub report_missing: Option<Vec<UserId>>,
    pub blob: Option<Vec<u8>>,
}

impl MessageEnvelope {
    /// Serialize to binary (bincode)
    pub fn to_bytes(&self) -> Result<Vec<u8>, MurmureError> {
        bincode::serialize(self).map_err(|e| MurmureError::Serialization(e.to_string()))
    }

    /// Deserialize from binary
    pub fn from_bytes(data: &[u8]) -> Result<Self, MurmureError> {
        bincode::deserialize(data).map_err(|e| MurmureError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = MessageEnvelope {
            sender: ClientId("self-device".into()),
            native_push: true,
            recipients: vec![UserEntry {
                user: UserId([9u8; 32]),
                clients: vec![ClientEntry {
                    client: ClientId("c1".into()),
                    ciphertext: vec![1, 2, 3],
                }],
            }],
            report_missing: Some(vec![UserId([9u8; 32])]),
            blob: None,
        };

        let bytes = envelope.to_bytes().unwrap();
        let restored = MessageEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(envelope, restored);
    }

    #[test]
    fn test_plaintext_roundtrip() {
        let plaintext = Plaintext {
            message_id: MessageId::new(),
            content: MessageContent::Text {
                body: "salut".into(),
                mentions: vec![],
            },
        };

        let bytes = plaintext.to_bytes().unwrap();
        assert_eq!(Plaintext::from_bytes(&bytes).unwrap(), plaintext);
    }

    #[test]
    fn test_envelope_with_blob_grows() {
        let mut envelope = MessageEnvelope {
            sender: ClientId("self-device".into()),
            native_push: false,
            recipients: vec![],
            report_missing: None,
            blob: None,
        };
        let small = envelope.to_bytes().unwrap().len();
        envelope.blob = Some(vec![0u8; 1024]);
        assert!(envelope.to_bytes().unwrap().len() > small + 1000);
    }
}
