//! Recipient resolution for outgoing messages.
//!
//! Given a message and its conversation, computes which users are
//! authorized to receive it and how strictly the backend must enforce that
//! every device of those users was covered. Narrowed recipient sets (a
//! delivery receipt targets one user, not the room) must come with a
//! relaxed completeness check, otherwise the backend would reject the send
//! for "missing" devices that were never supposed to receive it.

use std::collections::BTreeSet;

use murmure_shared::protocol::MessageContent;
use murmure_shared::types::{MessageId, UserId};
use murmure_store::{Conversation, ConversationKind, MessageRecord, ObjectStore};

use crate::config::CoreConfig;
use crate::error::CoreError;

/// Instruction to the backend about missing-device enforcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingClientsStrategy {
    /// Enforce completeness against every authorized user's account.
    DoNotIgnoreAnyMissingClient,
    /// Enforce completeness only for the listed users.
    IgnoreAllMissingClientsNotFromUsers(BTreeSet<UserId>),
    /// Never enforce; used for targeted re-sends to known devices.
    IgnoreAllMissingClients,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRecipients {
    pub users: BTreeSet<UserId>,
    pub strategy: MissingClientsStrategy,
}

/// Compute the authorized recipient users and the enforcement strategy for
/// one outgoing message. First matching rule wins:
///
/// 1. Delivery confirmations go to the confirmed message's sender only.
/// 2. Button actions go to the button message's sender only.
/// 3. Deleting an already-destructing ephemeral message in a group only
///    involves its sender and self, unless self is the sender.
/// 4. Everything else goes to the conversation's authorized set.
pub fn resolve_recipients(
    store: &ObjectStore,
    message: &MessageRecord,
    conversation: &Conversation,
    config: &CoreConfig,
) -> Result<ResolvedRecipients, CoreError> {
    let content = message
        .user_content()
        .ok_or(CoreError::SystemRecordNotSendable)?;
    let self_user = store.self_user();

    let users = match content {
        MessageContent::Confirmation { first_message } => {
            let original = store
                .message_in_conversation(&conversation.id, first_message)
                .ok_or(CoreError::ConfirmationNeedsRecipient(message.id))?;
            BTreeSet::from([original.sender])
        }

        MessageContent::ButtonAction { reference_message } => {
            let original = store
                .message_in_conversation(&conversation.id, reference_message)
                .ok_or(CoreError::ActionNeedsRecipient(message.id))?;
            BTreeSet::from([original.sender])
        }

        MessageContent::Deleted { message: deleted } => {
            match deleted_ephemeral_recipients(store, conversation, deleted, self_user) {
                Some(users) => users,
                None => authorized_recipients(store, conversation, content, self_user, config),
            }
        }

        _ => authorized_recipients(store, conversation, content, self_user, config),
    };

    let strategy = derive_strategy(conversation, &users);
    Ok(ResolvedRecipients { users, strategy })
}

/// Rule 3: in a group, deleting an ephemeral message whose destruction
/// countdown already started only involves the sender of that message and
/// self. `None` falls through to the broadcast rule.
fn deleted_ephemeral_recipients(
    store: &ObjectStore,
    conversation: &Conversation,
    deleted: &MessageId,
    self_user: UserId,
) -> Option<BTreeSet<UserId>> {
    if conversation.kind != ConversationKind::Group {
        return None;
    }
    let original = store.message_in_conversation(&conversation.id, deleted)?;
    if !original.is_ephemeral() || original.destruction_date.is_none() {
        return None;
    }
    if original.sender == self_user {
        return None;
    }
    Some(BTreeSet::from([original.sender, self_user]))
}

/// Rule 4: the conversation's full authorized recipient set.
fn authorized_recipients(
    store: &ObjectStore,
    conversation: &Conversation,
    content: &MessageContent,
    self_user: UserId,
    config: &CoreConfig,
) -> BTreeSet<UserId> {
    match &conversation.kind {
        ConversationKind::OneToOne { connected_user } => {
            BTreeSet::from([*connected_user, self_user])
        }
        ConversationKind::Group => {
            let mut users: BTreeSet<UserId> = conversation
                .participants
                .iter()
                .filter(|id| {
                    let service = store.user(id).is_some_and(|u| u.is_service);
                    !service || service_is_addressed(content, id, config)
                })
                .copied()
                .collect();
            users.insert(self_user);
            users
        }
    }
}

fn service_is_addressed(content: &MessageContent, service: &UserId, config: &CoreConfig) -> bool {
    if !config.services_must_be_mentioned {
        return true;
    }
    match content {
        MessageContent::Text { mentions, .. } => mentions.contains(service),
        _ => false,
    }
}

/// A recipient set narrower than the conversation's full authorized set
/// relaxes server-side completeness enforcement to just those users.
fn derive_strategy(conversation: &Conversation, users: &BTreeSet<UserId>) -> MissingClientsStrategy {
    let narrowed = match &conversation.kind {
        ConversationKind::OneToOne { .. } => users.len() != 2,
        ConversationKind::Group => users.len() != conversation.participants.len(),
    };
    if narrowed {
        MissingClientsStrategy::IgnoreAllMissingClientsNotFromUsers(users.clone())
    } else {
        MissingClientsStrategy::DoNotIgnoreAnyMissingClient
    }
}
