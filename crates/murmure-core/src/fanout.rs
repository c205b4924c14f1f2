//! Per-device encryption fan-out.
//!
//! One logical message becomes one ciphertext per recipient device,
//! assembled into a single multi-recipient envelope. Encrypting advances
//! each session's ratchet irreversibly, so the oversize path must roll all
//! advances back before retrying through the externalizer: a sender must
//! never advance a session for ciphertext it then throws away, or the next
//! real send desynchronizes from a receiver who never saw the discarded
//! message.

use std::collections::BTreeMap;

use murmure_shared::constants::FAILED_SESSION_PAYLOAD;
use murmure_shared::protocol::{ClientEntry, MessageEnvelope, Plaintext, UserEntry};
use murmure_shared::types::{ClientId, MessageId, SessionId, UserId};
use murmure_store::{Client, MessageRecord, ObjectStore};

use crate::config::CoreConfig;
use crate::error::CoreError;
use crate::external;
use crate::resolver::{resolve_recipients, MissingClientsStrategy};
use crate::session::SessionStore;

/// Devices each authorized user should receive the message on. Computed
/// per send, never persisted.
pub type RecipientMap = BTreeMap<UserId, Vec<Client>>;

/// A serialized envelope ready for hand-off, with the enforcement strategy
/// the transport must attach to the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub data: Vec<u8>,
    pub strategy: MissingClientsStrategy,
}

/// Resolve recipients and encrypt a stored message for every one of their
/// devices. Oversized envelopes are rerouted through the externalizer.
pub fn encrypt_for_transport<S: SessionStore>(
    store: &mut ObjectStore,
    sessions: &mut S,
    message_id: &MessageId,
    config: &CoreConfig,
) -> Result<EncryptedPayload, CoreError> {
    let message = store
        .message(message_id)
        .ok_or(CoreError::MessageNotFound(*message_id))?
        .clone();
    let conversation = store
        .conversation(&message.conversation)
        .ok_or(CoreError::ConversationNotFound(message.conversation))?
        .clone();

    let resolved = resolve_recipients(store, &message, &conversation, config)?;
    let recipients = recipient_map(store, resolved.users.iter());
    let data = encrypt(
        store,
        sessions,
        &message,
        &recipients,
        &resolved.strategy,
        None,
        config,
    )?;
    Ok(EncryptedPayload {
        data,
        strategy: resolved.strategy,
    })
}

/// Encrypt a stored message for an explicit device set, e.g. a targeted
/// re-send to devices the backend reported as missing. Completeness is
/// never enforced on this path.
pub fn encrypt_for_clients<S: SessionStore>(
    store: &mut ObjectStore,
    sessions: &mut S,
    message_id: &MessageId,
    recipients: &RecipientMap,
    config: &CoreConfig,
) -> Result<EncryptedPayload, CoreError> {
    let message = store
        .message(message_id)
        .ok_or(CoreError::MessageNotFound(*message_id))?
        .clone();
    let strategy = MissingClientsStrategy::IgnoreAllMissingClients;
    let data = encrypt(store, sessions, &message, recipients, &strategy, None, config)?;
    Ok(EncryptedPayload { data, strategy })
}

/// Materialize the per-send recipient map: every device of every
/// authorized user, minus deleted accounts.
pub fn recipient_map<'a>(
    store: &ObjectStore,
    users: impl Iterator<Item = &'a UserId>,
) -> RecipientMap {
    users
        .filter(|id| store.user(id).is_some_and(|u| !u.account_deleted))
        .map(|id| (*id, store.clients_of(id).cloned().collect()))
        .collect()
}

pub(crate) fn encrypt<S: SessionStore>(
    store: &mut ObjectStore,
    sessions: &mut S,
    message: &MessageRecord,
    recipients: &RecipientMap,
    strategy: &MissingClientsStrategy,
    external_blob: Option<Vec<u8>>,
    config: &CoreConfig,
) -> Result<Vec<u8>, CoreError> {
    let self_client = store
        .self_client()
        .cloned()
        .ok_or(CoreError::NoSelfClient)?;
    let content = message
        .user_content()
        .ok_or(CoreError::SystemRecordNotSendable)?;
    let plaintext = Plaintext {
        message_id: message.id,
        content: content.clone(),
    }
    .to_bytes()?;

    let already_external = external_blob.is_some();
    sessions.checkpoint();
    let envelope = build_envelope(
        sessions,
        message,
        &plaintext,
        recipients,
        strategy,
        store.self_user(),
        &self_client,
        external_blob,
    );
    let blob_len = envelope.blob.as_ref().map_or(0, Vec::len);
    let data = match envelope.to_bytes() {
        Ok(data) => data,
        Err(err) => {
            sessions.rollback();
            return Err(err.into());
        }
    };

    // The shared blob's size is fixed by the original content and does not
    // count against the fan-out threshold.
    if data.len() - blob_len >= config.external_threshold {
        // Discard this attempt entirely; every ratchet advance made for it
        // must be undone before re-encrypting.
        sessions.rollback();
        if already_external {
            return Err(CoreError::ExternalPayloadOversized);
        }
        tracing::info!(
            message = %message.id,
            size = data.len(),
            threshold = config.external_threshold,
            "envelope over size threshold, externalizing payload"
        );
        return external::encrypt_with_external_blob(
            store, sessions, message, recipients, strategy, config,
        );
    }

    sessions.commit();
    clear_failed_session_flags(store, recipients);
    Ok(data)
}

#[allow(clippy::too_many_arguments)]
fn build_envelope<S: SessionStore>(
    sessions: &mut S,
    message: &MessageRecord,
    plaintext: &[u8],
    recipients: &RecipientMap,
    strategy: &MissingClientsStrategy,
    self_user: UserId,
    self_client: &ClientId,
    blob: Option<Vec<u8>>,
) -> MessageEnvelope {
    let mut entries = Vec::new();
    for (user, clients) in recipients {
        let client_entries: Vec<ClientEntry> = clients
            .iter()
            .filter(|client| !(client.user == self_user && &client.id == self_client))
            .filter_map(|client| encrypt_for_client(sessions, plaintext, client))
            .collect();
        if !client_entries.is_empty() {
            entries.push(UserEntry {
                user: *user,
                clients: client_entries,
            });
        }
    }

    MessageEnvelope {
        sender: self_client.clone(),
        // Delivery receipts must not wake a push notification.
        native_push: !message.is_confirmation(),
        recipients: entries,
        report_missing: match strategy {
            MissingClientsStrategy::IgnoreAllMissingClientsNotFromUsers(users) => {
                Some(users.iter().copied().collect())
            }
            _ => None,
        },
        blob,
    }
}

/// One device's entry, or `None` when the device has to be omitted.
/// Devices whose session establishment failed earlier get the sentinel
/// tombstone so they can detect it and recover by re-keying.
fn encrypt_for_client<S: SessionStore>(
    sessions: &mut S,
    plaintext: &[u8],
    client: &Client,
) -> Option<ClientEntry> {
    let session = SessionId::for_client(&client.user, &client.id);
    if sessions.has_session(&session) {
        match sessions.encrypt(plaintext, &session) {
            Ok(ciphertext) => Some(ClientEntry {
                client: client.id.clone(),
                ciphertext,
            }),
            Err(err) => {
                tracing::warn!(client = %client.id, error = %err, "skipping device, per-device encryption failed");
                None
            }
        }
    } else if client.failed_to_establish_session {
        Some(ClientEntry {
            client: client.id.clone(),
            ciphertext: FAILED_SESSION_PAYLOAD.as_bytes().to_vec(),
        })
    } else {
        None
    }
}

/// A completed hand-off means every flagged device received its tombstone;
/// the flag has served its purpose.
fn clear_failed_session_flags(store: &mut ObjectStore, recipients: &RecipientMap) {
    for (user, clients) in recipients {
        for client in clients {
            if client.failed_to_establish_session {
                if let Some(stored) = store.client_mut(user, &client.id) {
                    stored.failed_to_establish_session = false;
                }
            }
        }
    }
}
