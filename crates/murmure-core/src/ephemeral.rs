//! Self-destruction of ephemeral messages.
//!
//! One [`DestructionTimer`] registry exists per managed context; entries
//! are (message, fire date) pairs. The countdown starts at a lifecycle
//! point, not at append: the author's copy arms when the message is
//! durably sent (held while a link preview is still resolving, since
//! editing content after the countdown started would corrupt the
//! destruction guarantee), a recipient's copy arms when the read marker
//! reaches it.
//!
//! Firing branches on ownership: the author's copy is obfuscated (record,
//! sender and timestamp stay visible, content does not), a recipient's
//! copy is hidden outright. Wall-clock alarms are not persisted; after a
//! restart [`DestructionTimer::resume`] resolves overdue messages and
//! re-arms future ones from the fire dates recorded on the messages.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use murmure_shared::constants::OBFUSCATED_BODY;
use murmure_shared::protocol::MessageContent;
use murmure_shared::types::{ConversationId, MessageId, UserId};
use murmure_store::{
    DeliveryState, DestructionTimeout, MessageRecord, ObjectStore, RecordContent, SystemRecord,
    SystemRecordKind,
};

/// Per-context registry of armed destruction timers.
#[derive(Debug, Default)]
pub struct DestructionTimer {
    entries: HashMap<MessageId, DateTime<Utc>>,
}

impl DestructionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the countdown for a message if its trigger condition is met.
    /// Returns whether a timer was started.
    pub fn start_destruction_if_needed(
        &mut self,
        store: &mut ObjectStore,
        id: &MessageId,
        now: DateTime<Utc>,
    ) -> bool {
        let self_user = store.self_user();
        let Some(record) = store.message(id) else {
            return false;
        };
        let Some(timeout) = record.ephemeral_timeout else {
            return false;
        };
        if record.destruction_date.is_some() {
            return false;
        }

        let triggered = if record.sender == self_user {
            matches!(
                record.delivery_state,
                DeliveryState::Sent | DeliveryState::Delivered
            ) && !record.awaiting_link_preview
        } else {
            read_marker_reached(store, record)
        };
        if !triggered {
            return false;
        }

        // Custom timeouts are unbounded; saturate instead of wrapping into
        // a fire date in the past.
        let seconds = i64::try_from(timeout.seconds()).unwrap_or(i64::MAX);
        let fire_at = Duration::try_seconds(seconds)
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        if let Some(record) = store.message_mut(id) {
            record.destruction_date = Some(fire_at);
        }
        self.entries.insert(*id, fire_at);
        tracing::debug!(message = %id, fire_at = %fire_at, "destruction countdown started");
        true
    }

    /// Disarm a message's timer (deleted, edited, teardown). Safe to call
    /// when no timer is registered.
    pub fn cancel(&mut self, id: &MessageId) {
        self.entries.remove(id);
    }

    pub fn is_armed(&self, id: &MessageId) -> bool {
        self.entries.contains_key(id)
    }

    /// Fire every timer whose date has passed. Each fired message is
    /// re-validated first; concurrently deleted or edited messages are
    /// dropped from the registry without effect.
    pub fn fire_due(&mut self, store: &mut ObjectStore, now: DateTime<Utc>) -> Vec<MessageId> {
        let mut due: Vec<MessageId> = self
            .entries
            .iter()
            .filter(|(_, fire_at)| **fire_at <= now)
            .map(|(id, _)| *id)
            .collect();
        due.sort();

        let mut fired = Vec::new();
        for id in due {
            self.entries.remove(&id);
            if destroy(store, &id) {
                fired.push(id);
            }
        }
        fired
    }

    /// Restart recovery: resolve every message whose recorded fire date
    /// already passed, re-arm the rest. Returns the messages destroyed.
    pub fn resume(&mut self, store: &mut ObjectStore, now: DateTime<Utc>) -> Vec<MessageId> {
        let mut destroyed = Vec::new();
        for id in store.messages_with_destruction_date() {
            let Some(fire_at) = store.message(&id).and_then(|m| m.destruction_date) else {
                continue;
            };
            if fire_at <= now {
                if destroy(store, &id) {
                    destroyed.push(id);
                }
            } else {
                self.entries.insert(id, fire_at);
            }
        }
        destroyed
    }

    /// The author's copy becomes eligible once durably handed off.
    pub fn message_sent(
        &mut self,
        store: &mut ObjectStore,
        id: &MessageId,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(record) = store.message_mut(id) {
            if record.delivery_state == DeliveryState::Pending {
                record.delivery_state = DeliveryState::Sent;
            }
        }
        self.start_destruction_if_needed(store, id, now)
    }

    /// The link preview finished resolving (or was skipped); a held
    /// countdown may start now.
    pub fn link_preview_resolved(
        &mut self,
        store: &mut ObjectStore,
        id: &MessageId,
        now: DateTime<Utc>,
    ) -> bool {
        if let Some(record) = store.message_mut(id) {
            record.awaiting_link_preview = false;
        }
        self.start_destruction_if_needed(store, id, now)
    }

    /// The local read marker moved; arm every received ephemeral message
    /// it now covers. Returns the messages whose countdown started.
    pub fn read_marker_moved(
        &mut self,
        store: &mut ObjectStore,
        conversation: &ConversationId,
        up_to: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<MessageId> {
        if store.advance_read_marker(conversation, up_to).is_err() {
            return Vec::new();
        }
        store
            .visible_timeline(conversation)
            .into_iter()
            .filter(|id| self.start_destruction_if_needed(store, id, now))
            .collect()
    }
}

fn read_marker_reached(store: &ObjectStore, record: &MessageRecord) -> bool {
    store
        .conversation(&record.conversation)
        .and_then(|c| c.read_marker)
        .is_some_and(|marker| marker >= record.timestamp)
}

/// Fire-time branching: obfuscate the author's own copy, hide a received
/// one. Returns false if the message no longer exists or is no longer
/// ephemeral.
fn destroy(store: &mut ObjectStore, id: &MessageId) -> bool {
    let self_user = store.self_user();
    let Some(record) = store.message_mut(id) else {
        return false;
    };
    if !record.is_ephemeral() {
        return false;
    }

    if record.sender == self_user {
        record.is_obfuscated = true;
        record.content = RecordContent::User(MessageContent::Text {
            body: OBFUSCATED_BODY.into(),
            mentions: vec![],
        });
    } else {
        record.hidden = true;
        record.content = RecordContent::User(MessageContent::Text {
            body: String::new(),
            mentions: vec![],
        });
    }
    true
}

/// A participant changed the conversation's destruction timer: apply it to
/// future messages and record the change in the timeline.
pub fn update_message_timer(
    store: &mut ObjectStore,
    conversation_id: &ConversationId,
    actor: UserId,
    timeout: Option<DestructionTimeout>,
    now: DateTime<Utc>,
) -> Option<MessageId> {
    let conversation = store.conversation_mut(conversation_id)?;
    conversation.message_timer = timeout;

    let record = SystemRecord {
        kind: SystemRecordKind::MessageTimerUpdate,
        users: [actor].into_iter().collect(),
        devices: Default::default(),
        timer_seconds: Some(timeout.map(|t| t.seconds()).unwrap_or(0)),
    };
    let id = MessageId::new();
    // Conversation existence was checked above.
    let _ = store.append_message(MessageRecord::system(
        id,
        *conversation_id,
        actor,
        record,
        now,
    ));
    Some(id)
}
