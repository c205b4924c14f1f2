//! Externalized payloads.
//!
//! When per-device fan-out of a payload would exceed the envelope size
//! threshold, the payload is encrypted exactly once under a fresh random
//! key and shipped as a single shared blob; the per-device fan-out then
//! carries only a tiny pointer (key plus digest). The externalized path
//! runs at most once per send: a pointer that is itself oversized is a
//! misconfiguration, not a retried condition.

use murmure_shared::crypto::{self, SymmetricKey};
use murmure_shared::protocol::{MessageContent, Plaintext};
use murmure_store::{MessageRecord, ObjectStore, RecordContent};

use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::fanout::{self, RecipientMap};
use crate::resolver::MissingClientsStrategy;
use crate::session::SessionStore;

/// Re-encrypt an oversized message as one shared blob and fan out a
/// pointer message carrying the key and a SHA-256 digest over the blob.
pub(crate) fn encrypt_with_external_blob<S: SessionStore>(
    store: &mut ObjectStore,
    sessions: &mut S,
    message: &MessageRecord,
    recipients: &RecipientMap,
    strategy: &MissingClientsStrategy,
    config: &CoreConfig,
) -> Result<Vec<u8>, CoreError> {
    let content = message
        .user_content()
        .ok_or(CoreError::SystemRecordNotSendable)?;
    let original = Plaintext {
        message_id: message.id,
        content: content.clone(),
    }
    .to_bytes()?;

    let otr_key = crypto::generate_symmetric_key();
    let (blob, sha256) = crypto::encrypt_with_digest(&otr_key, &original)?;

    let mut pointer = message.clone();
    pointer.content = RecordContent::User(MessageContent::External { otr_key, sha256 });

    fanout::encrypt(
        store,
        sessions,
        &pointer,
        recipients,
        strategy,
        Some(blob),
        config,
    )
}

/// Receiver side: verify the shared blob against the pointer's digest and
/// recover the original payload. Digest mismatch or undecodable bytes mean
/// corrupt data; no plaintext is produced.
pub fn decode_external_blob(
    blob: &[u8],
    otr_key: &SymmetricKey,
    sha256: &[u8; 32],
) -> Option<Plaintext> {
    let digest = crypto::AssetDigest::Sha256(*sha256);
    let plaintext = crypto::decrypt_if_digest_matches(otr_key, blob, &digest)?;
    Plaintext::from_bytes(&plaintext).ok()
}

#[cfg(test)]
mod tests {
    use murmure_shared::types::MessageId;

    use super::*;

    #[test]
    fn test_decode_rejects_tampered_blob() {
        let plaintext = Plaintext {
            message_id: MessageId::new(),
            content: MessageContent::Text {
                body: "gros contenu".into(),
                mentions: vec![],
            },
        };
        let otr_key = crypto::generate_symmetric_key();
        let (mut blob, sha256) =
            crypto::encrypt_with_digest(&otr_key, &plaintext.to_bytes().unwrap()).unwrap();

        assert_eq!(
            decode_external_blob(&blob, &otr_key, &sha256).unwrap(),
            plaintext
        );

        let len = blob.len();
        blob[len / 2] ^= 0x01;
        assert!(decode_external_blob(&blob, &otr_key, &sha256).is_none());
    }

    #[test]
    fn test_decode_rejects_wrong_digest() {
        let plaintext = Plaintext {
            message_id: MessageId::new(),
            content: MessageContent::Text {
                body: "contenu".into(),
                mentions: vec![],
            },
        };
        let otr_key = crypto::generate_symmetric_key();
        let (blob, _) =
            crypto::encrypt_with_digest(&otr_key, &plaintext.to_bytes().unwrap()).unwrap();

        assert!(decode_external_blob(&blob, &otr_key, &[0u8; 32]).is_none());
    }
}
