//! Conversation trust state machine.
//!
//! A conversation is `Secure` while every active participant's every
//! device is verified; discovering or ignoring an unverified device drops
//! it to `SecureWithIgnored`; an explicit user reset forces `NotSecure` to
//! silence further prompts. Transitions append system records to the
//! timeline and are reported to the caller as [`TrustChange`] values so an
//! embedding UI can react.
//!
//! All transition functions are no-ops on absent conversations or empty
//! participant sets; they never fail.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use murmure_shared::types::{ConversationId, MessageId, UserId};
use murmure_store::{
    Conversation, DeliveryState, DeviceRef, MessageRecord, ObjectStore, SystemRecord,
    SystemRecordKind, TrustLevel,
};

/// Notification that a conversation's trust level changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustChange {
    pub conversation: ConversationId,
    pub level: TrustLevel,
}

/// After the user verified devices: upgrade to `Secure` if the
/// conversation is now fully verified. Appends a "conversation is secure"
/// record naming the devices that completed the verification.
pub fn increase_security_level_after_trusting(
    store: &mut ObjectStore,
    conversation_id: &ConversationId,
    trusted_devices: &BTreeSet<DeviceRef>,
    now: DateTime<Utc>,
) -> Option<TrustChange> {
    let users = trusted_devices.iter().map(|d| d.user).collect();
    upgrade_if_fully_verified(store, conversation_id, users, trusted_devices.clone(), now)
}

/// After devices were removed (revoked or their user left): the remaining
/// device set may now be fully verified.
pub fn increase_security_level_after_removing_clients(
    store: &mut ObjectStore,
    conversation_id: &ConversationId,
    affected_users: &BTreeSet<UserId>,
    now: DateTime<Utc>,
) -> Option<TrustChange> {
    upgrade_if_fully_verified(
        store,
        conversation_id,
        affected_users.clone(),
        BTreeSet::new(),
        now,
    )
}

fn upgrade_if_fully_verified(
    store: &mut ObjectStore,
    conversation_id: &ConversationId,
    users: BTreeSet<UserId>,
    devices: BTreeSet<DeviceRef>,
    now: DateTime<Utc>,
) -> Option<TrustChange> {
    let conversation = store.conversation(conversation_id)?;
    if conversation.participants.is_empty() || conversation.trust_level == TrustLevel::Secure {
        return None;
    }
    if !all_users_trusted(store, conversation) || !all_participants_have_clients(store, conversation)
    {
        return None;
    }

    store.conversation_mut(conversation_id)?.trust_level = TrustLevel::Secure;
    tracing::info!(conversation = %conversation_id, "conversation is now secure");

    if !users.is_empty() {
        append_system_record(
            store,
            conversation_id,
            SystemRecord {
                kind: SystemRecordKind::ConversationIsSecure,
                users,
                devices,
                timer_seconds: None,
            },
            now,
        );
    }
    Some(TrustChange {
        conversation: *conversation_id,
        level: TrustLevel::Secure,
    })
}

/// After unverified devices were discovered: downgrade a `Secure`
/// conversation and record the discovery. When the discovery was caused by
/// receiving a specific message, every still-pending message back to that
/// message is expired and flagged as having caused the degradation
/// (delivery receipts are expired without the flag).
pub fn decrease_security_level_after_discovering(
    store: &mut ObjectStore,
    conversation_id: &ConversationId,
    discovered: &BTreeSet<DeviceRef>,
    caused_by: Option<MessageId>,
    now: DateTime<Utc>,
) -> Option<TrustChange> {
    downgrade(
        store,
        conversation_id,
        SystemRecordKind::NewClient,
        discovered,
        caused_by,
        now,
    )
}

/// The user dismissed newly discovered devices without verifying them.
/// Downgrades and records, but never expires pending messages.
pub fn decrease_security_level_after_ignoring(
    store: &mut ObjectStore,
    conversation_id: &ConversationId,
    ignored: &BTreeSet<DeviceRef>,
    now: DateTime<Utc>,
) -> Option<TrustChange> {
    downgrade(
        store,
        conversation_id,
        SystemRecordKind::IgnoredClient,
        ignored,
        None,
        now,
    )
}

fn downgrade(
    store: &mut ObjectStore,
    conversation_id: &ConversationId,
    kind: SystemRecordKind,
    devices: &BTreeSet<DeviceRef>,
    caused_by: Option<MessageId>,
    now: DateTime<Utc>,
) -> Option<TrustChange> {
    let conversation = store.conversation(conversation_id)?;
    if conversation.participants.is_empty()
        || conversation.trust_level == TrustLevel::NotSecure
        || devices.is_empty()
    {
        return None;
    }
    if all_users_trusted(store, conversation) {
        return None;
    }
    let was_secure = conversation.trust_level == TrustLevel::Secure;

    // A repeated discovery of the same devices while already degraded must
    // not spam the timeline.
    if !is_duplicate_discovery(store, conversation_id, kind, devices) {
        append_system_record(
            store,
            conversation_id,
            SystemRecord {
                kind,
                users: devices.iter().map(|d| d.user).collect(),
                devices: devices.clone(),
                timer_seconds: None,
            },
            now,
        );
    }

    if !was_secure {
        return None;
    }
    store.conversation_mut(conversation_id)?.trust_level = TrustLevel::SecureWithIgnored;
    tracing::info!(conversation = %conversation_id, "conversation trust degraded");

    if let Some(trigger) = caused_by {
        expire_messages_after_degradation(store, conversation_id, trigger);
    }
    Some(TrustChange {
        conversation: *conversation_id,
        level: TrustLevel::SecureWithIgnored,
    })
}

fn is_duplicate_discovery(
    store: &ObjectStore,
    conversation_id: &ConversationId,
    kind: SystemRecordKind,
    devices: &BTreeSet<DeviceRef>,
) -> bool {
    if kind != SystemRecordKind::NewClient {
        return false;
    }
    let Some(last) = store.last_visible_message(conversation_id) else {
        return false;
    };
    last.sender == store.self_user()
        && last
            .system_record()
            .is_some_and(|r| r.kind == SystemRecordKind::NewClient && r.devices == *devices)
}

/// Expire every still-pending outgoing user message, walking the timeline
/// backwards down to the triggering message inclusive.
fn expire_messages_after_degradation(
    store: &mut ObjectStore,
    conversation_id: &ConversationId,
    trigger: MessageId,
) {
    let self_user = store.self_user();
    let ids: Vec<MessageId> = store.timeline(conversation_id).to_vec();
    for id in ids.iter().rev() {
        if let Some(record) = store.message_mut(id) {
            if record.sender == self_user
                && record.user_content().is_some()
                && record.delivery_state == DeliveryState::Pending
            {
                record.delivery_state = DeliveryState::Expired;
                // Receipts carry no user content worth resending.
                if !record.is_confirmation() {
                    record.caused_degradation = true;
                }
            }
        }
        if *id == trigger {
            break;
        }
    }
}

/// Explicit user reset: force `NotSecure` regardless of device state, to
/// silence further degradation prompts.
pub fn make_not_secure(
    store: &mut ObjectStore,
    conversation_id: &ConversationId,
) -> Option<TrustChange> {
    let conversation = store.conversation_mut(conversation_id)?;
    if conversation.trust_level == TrustLevel::NotSecure {
        return None;
    }
    conversation.trust_level = TrustLevel::NotSecure;
    Some(TrustChange {
        conversation: *conversation_id,
        level: TrustLevel::NotSecure,
    })
}

/// "Send anyway": reset to `NotSecure` and re-queue every message that was
/// expired by a degradation. Returns the messages to hand back to the
/// fan-out encryptor.
pub fn resend_messages_that_caused_degradation(
    store: &mut ObjectStore,
    conversation_id: &ConversationId,
) -> Vec<MessageId> {
    make_not_secure(store, conversation_id);
    let ids: Vec<MessageId> = store.timeline(conversation_id).to_vec();
    let mut resend = Vec::new();
    for id in ids {
        if let Some(record) = store.message_mut(&id) {
            if record.caused_degradation {
                record.caused_degradation = false;
                record.delivery_state = DeliveryState::Pending;
                resend.push(id);
            }
        }
    }
    resend
}

/// "Do not send": reset to `NotSecure` and drop the degradation flags,
/// leaving the messages expired.
pub fn do_not_resend_messages_that_caused_degradation(
    store: &mut ObjectStore,
    conversation_id: &ConversationId,
) {
    make_not_secure(store, conversation_id);
    let ids: Vec<MessageId> = store.timeline(conversation_id).to_vec();
    for id in ids {
        if let Some(record) = store.message_mut(&id) {
            record.caused_degradation = false;
        }
    }
}

/// Record that the self user started using this device in the given
/// conversation. Appended once; a timeline that already mentions the
/// device is left alone.
pub fn append_started_using_this_device(
    store: &mut ObjectStore,
    conversation_id: &ConversationId,
    now: DateTime<Utc>,
) -> Option<MessageId> {
    let self_client = store.self_client()?.clone();
    let self_user = store.self_user();
    store.conversation(conversation_id)?;

    let device = DeviceRef {
        user: self_user,
        client: self_client,
    };
    let already_recorded = store
        .timeline(conversation_id)
        .iter()
        .filter_map(|id| store.message(id))
        .any(|m| {
            m.system_record().is_some_and(|r| {
                matches!(
                    r.kind,
                    SystemRecordKind::UsingNewDevice | SystemRecordKind::NewClient
                ) && r.devices.contains(&device)
            })
        });
    if already_recorded {
        return None;
    }

    let id = append_system_record(
        store,
        conversation_id,
        SystemRecord {
            kind: SystemRecordKind::UsingNewDevice,
            users: BTreeSet::from([self_user]),
            devices: BTreeSet::from([device]),
            timer_seconds: None,
        },
        now,
    );
    Some(id)
}

fn append_system_record(
    store: &mut ObjectStore,
    conversation_id: &ConversationId,
    record: SystemRecord,
    now: DateTime<Utc>,
) -> MessageId {
    let id = MessageId::new();
    let message = MessageRecord::system(id, *conversation_id, store.self_user(), record, now);
    // Callers verified the conversation exists.
    let _ = store.append_message(message);
    id
}

/// Every participant, self included, with every device verified; no
/// service accounts; every other participant either connected or sharing
/// the self user's team. The self user's own sending device is implicitly
/// trusted.
fn all_users_trusted(store: &ObjectStore, conversation: &Conversation) -> bool {
    let self_user = store.self_user();
    if !conversation.participants.contains(&self_user) {
        return false;
    }
    if conversation.participants.len() < 2 {
        return false;
    }
    let self_team = store.user(&self_user).and_then(|u| u.team.clone());

    conversation.participants.iter().all(|id| {
        let Some(user) = store.user(id) else {
            return false;
        };
        if user.is_service {
            return false;
        }
        if *id != self_user {
            let shares_team = self_team.is_some() && user.team == self_team;
            if !user.is_connected && !shares_team {
                return false;
            }
        }
        store
            .clients_of(id)
            .filter(|c| Some(&c.id) != store.self_client() || c.user != self_user)
            .all(|c| c.verified)
    })
}

fn all_participants_have_clients(store: &ObjectStore, conversation: &Conversation) -> bool {
    conversation
        .participants
        .iter()
        .all(|id| store.clients_of(id).next().is_some())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use murmure_shared::protocol::MessageContent;
    use murmure_shared::types::ClientId;
    use murmure_store::{Client, ConversationKind, User};

    use super::*;

    fn user(n: u8) -> UserId {
        UserId([n; 32])
    }

    fn device(n: u8, id: &str) -> DeviceRef {
        DeviceRef {
            user: user(n),
            client: ClientId(id.into()),
        }
    }

    /// Self user (1) with its device, plus connected user (2) with one
    /// verified device "o1", in a group conversation.
    fn secure_candidate() -> (ObjectStore, ConversationId) {
        let now = Utc::now();
        let mut store = ObjectStore::new(user(1), now);
        store.set_self_client(ClientId("self".into()), now);

        let mut other = User::new(user(2), now);
        other.is_connected = true;
        store.insert_user(other);
        let mut client = Client::new(ClientId("o1".into()), user(2), now);
        client.verified = true;
        store.insert_client(client);

        let conv = ConversationId::new();
        store.insert_conversation(Conversation::new(
            conv,
            ConversationKind::Group,
            [user(1), user(2)].into_iter().collect(),
            now,
        ));
        (store, conv)
    }

    fn trust_level(store: &ObjectStore, conv: &ConversationId) -> TrustLevel {
        store.conversation(conv).unwrap().trust_level
    }

    fn system_records(store: &ObjectStore, conv: &ConversationId) -> Vec<SystemRecordKind> {
        store
            .timeline(conv)
            .iter()
            .filter_map(|id| store.message(id))
            .filter_map(|m| m.system_record())
            .map(|r| r.kind)
            .collect()
    }

    #[test]
    fn test_upgrade_when_every_device_is_verified() {
        let (mut store, conv) = secure_candidate();
        let change = increase_security_level_after_trusting(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o1")]),
            Utc::now(),
        )
        .expect("upgrade fires");

        assert_eq!(change.level, TrustLevel::Secure);
        assert_eq!(trust_level(&store, &conv), TrustLevel::Secure);
        assert_eq!(
            system_records(&store, &conv),
            vec![SystemRecordKind::ConversationIsSecure]
        );
    }

    #[test]
    fn test_upgrade_blocked_by_unverified_device() {
        let (mut store, conv) = secure_candidate();
        store.insert_client(Client::new(ClientId("o2".into()), user(2), Utc::now()));

        let change = increase_security_level_after_trusting(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o1")]),
            Utc::now(),
        );
        assert!(change.is_none());
        assert_eq!(trust_level(&store, &conv), TrustLevel::NotSecure);
    }

    #[test]
    fn test_upgrade_blocked_by_service_participant() {
        let (mut store, conv) = secure_candidate();
        store.user_mut(&user(2)).unwrap().is_service = true;

        let change = increase_security_level_after_trusting(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o1")]),
            Utc::now(),
        );
        assert!(change.is_none());
    }

    #[test]
    fn test_unconnected_participant_needs_shared_team() {
        let (mut store, conv) = secure_candidate();
        store.user_mut(&user(2)).unwrap().is_connected = false;

        assert!(increase_security_level_after_trusting(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o1")]),
            Utc::now(),
        )
        .is_none());

        store.user_mut(&user(1)).unwrap().team = Some("equipe".into());
        store.user_mut(&user(2)).unwrap().team = Some("equipe".into());
        assert!(increase_security_level_after_trusting(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o1")]),
            Utc::now(),
        )
        .is_some());
    }

    #[test]
    fn test_upgrade_after_removing_last_unverified_device() {
        let (mut store, conv) = secure_candidate();
        store.insert_client(Client::new(ClientId("o2".into()), user(2), Utc::now()));
        store.remove_client(&user(2), &ClientId("o2".into())).unwrap();

        let change = increase_security_level_after_removing_clients(
            &mut store,
            &conv,
            &BTreeSet::from([user(2)]),
            Utc::now(),
        );
        assert!(change.is_some());
        assert_eq!(trust_level(&store, &conv), TrustLevel::Secure);
    }

    #[test]
    fn test_upgrade_requires_every_participant_to_have_a_device() {
        let (mut store, conv) = secure_candidate();
        store.remove_client(&user(2), &ClientId("o1".into())).unwrap();

        let change = increase_security_level_after_removing_clients(
            &mut store,
            &conv,
            &BTreeSet::from([user(2)]),
            Utc::now(),
        );
        assert!(change.is_none());
    }

    #[test]
    fn test_discovery_downgrades_and_records() {
        let (mut store, conv) = secure_candidate();
        store.conversation_mut(&conv).unwrap().trust_level = TrustLevel::Secure;
        store.insert_client(Client::new(ClientId("o2".into()), user(2), Utc::now()));

        let change = decrease_security_level_after_discovering(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o2")]),
            None,
            Utc::now(),
        )
        .expect("downgrade fires");

        assert_eq!(change.level, TrustLevel::SecureWithIgnored);
        assert_eq!(trust_level(&store, &conv), TrustLevel::SecureWithIgnored);
        assert_eq!(system_records(&store, &conv), vec![SystemRecordKind::NewClient]);
    }

    #[test]
    fn test_repeated_discovery_does_not_spam_the_timeline() {
        let (mut store, conv) = secure_candidate();
        store.conversation_mut(&conv).unwrap().trust_level = TrustLevel::Secure;
        store.insert_client(Client::new(ClientId("o2".into()), user(2), Utc::now()));

        let devices = BTreeSet::from([device(2, "o2")]);
        decrease_security_level_after_discovering(&mut store, &conv, &devices, None, Utc::now());
        decrease_security_level_after_discovering(&mut store, &conv, &devices, None, Utc::now());

        assert_eq!(system_records(&store, &conv), vec![SystemRecordKind::NewClient]);
    }

    #[test]
    fn test_distinct_discoveries_each_get_a_record() {
        let (mut store, conv) = secure_candidate();
        store.conversation_mut(&conv).unwrap().trust_level = TrustLevel::Secure;
        store.insert_client(Client::new(ClientId("o2".into()), user(2), Utc::now()));
        store.insert_client(Client::new(ClientId("o3".into()), user(2), Utc::now()));

        decrease_security_level_after_discovering(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o2")]),
            None,
            Utc::now(),
        );
        decrease_security_level_after_discovering(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o3")]),
            None,
            Utc::now(),
        );

        assert_eq!(
            system_records(&store, &conv),
            vec![SystemRecordKind::NewClient, SystemRecordKind::NewClient]
        );
    }

    #[test]
    fn test_trust_level_has_no_hidden_history_dependence() {
        // Replaying verify / discover / verify events must land on the same
        // level as evaluating the final device snapshot directly.
        let (mut replayed, conv) = secure_candidate();
        increase_security_level_after_trusting(
            &mut replayed,
            &conv,
            &BTreeSet::from([device(2, "o1")]),
            Utc::now(),
        );
        replayed.insert_client(Client::new(ClientId("o2".into()), user(2), Utc::now()));
        decrease_security_level_after_discovering(
            &mut replayed,
            &conv,
            &BTreeSet::from([device(2, "o2")]),
            None,
            Utc::now(),
        );
        replayed
            .client_mut(&user(2), &ClientId("o2".into()))
            .unwrap()
            .verified = true;
        increase_security_level_after_trusting(
            &mut replayed,
            &conv,
            &BTreeSet::from([device(2, "o2")]),
            Utc::now(),
        );

        let (mut direct, direct_conv) = secure_candidate();
        let mut second = Client::new(ClientId("o2".into()), user(2), Utc::now());
        second.verified = true;
        direct.insert_client(second);
        increase_security_level_after_trusting(
            &mut direct,
            &direct_conv,
            &BTreeSet::from([device(2, "o1"), device(2, "o2")]),
            Utc::now(),
        );

        assert_eq!(trust_level(&replayed, &conv), TrustLevel::Secure);
        assert_eq!(
            trust_level(&replayed, &conv),
            trust_level(&direct, &direct_conv)
        );
    }

    #[test]
    fn test_degradation_expires_pending_messages_with_flag() {
        let (mut store, conv) = secure_candidate();
        store.conversation_mut(&conv).unwrap().trust_level = TrustLevel::Secure;

        let delivered = store
            .append_user_message(
                &conv,
                user(1),
                MessageContent::Text {
                    body: "deja parti".into(),
                    mentions: vec![],
                },
                Utc::now(),
            )
            .unwrap();
        store.message_mut(&delivered).unwrap().delivery_state = DeliveryState::Delivered;
        let pending = store
            .append_user_message(
                &conv,
                user(1),
                MessageContent::Text {
                    body: "en attente".into(),
                    mentions: vec![],
                },
                Utc::now(),
            )
            .unwrap();
        let receipt = store
            .append_user_message(
                &conv,
                user(1),
                MessageContent::Confirmation {
                    first_message: delivered,
                },
                Utc::now(),
            )
            .unwrap();

        store.insert_client(Client::new(ClientId("o2".into()), user(2), Utc::now()));
        decrease_security_level_after_discovering(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o2")]),
            Some(pending),
            Utc::now(),
        )
        .expect("downgrade fires");

        let delivered = store.message(&delivered).unwrap();
        assert_eq!(delivered.delivery_state, DeliveryState::Delivered);

        let pending_record = store.message(&pending).unwrap();
        assert_eq!(pending_record.delivery_state, DeliveryState::Expired);
        assert!(pending_record.caused_degradation);

        let receipt = store.message(&receipt).unwrap();
        assert_eq!(receipt.delivery_state, DeliveryState::Expired);
        assert!(!receipt.caused_degradation);
    }

    #[test]
    fn test_ignoring_devices_never_expires_messages() {
        let (mut store, conv) = secure_candidate();
        store.conversation_mut(&conv).unwrap().trust_level = TrustLevel::Secure;
        let pending = store
            .append_user_message(
                &conv,
                user(1),
                MessageContent::Text {
                    body: "reste en file".into(),
                    mentions: vec![],
                },
                Utc::now(),
            )
            .unwrap();

        store.insert_client(Client::new(ClientId("o2".into()), user(2), Utc::now()));
        let change = decrease_security_level_after_ignoring(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o2")]),
            Utc::now(),
        )
        .expect("downgrade fires");

        assert_eq!(change.level, TrustLevel::SecureWithIgnored);
        assert!(system_records(&store, &conv).contains(&SystemRecordKind::IgnoredClient));
        assert_eq!(
            store.message(&pending).unwrap().delivery_state,
            DeliveryState::Pending
        );
    }

    #[test]
    fn test_resend_requeues_flagged_messages() {
        let (mut store, conv) = secure_candidate();
        store.conversation_mut(&conv).unwrap().trust_level = TrustLevel::Secure;
        let pending = store
            .append_user_message(
                &conv,
                user(1),
                MessageContent::Text {
                    body: "a renvoyer".into(),
                    mentions: vec![],
                },
                Utc::now(),
            )
            .unwrap();
        store.insert_client(Client::new(ClientId("o2".into()), user(2), Utc::now()));
        decrease_security_level_after_discovering(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o2")]),
            Some(pending),
            Utc::now(),
        );

        let resend = resend_messages_that_caused_degradation(&mut store, &conv);
        assert_eq!(resend, vec![pending]);
        assert_eq!(trust_level(&store, &conv), TrustLevel::NotSecure);
        let record = store.message(&pending).unwrap();
        assert_eq!(record.delivery_state, DeliveryState::Pending);
        assert!(!record.caused_degradation);
    }

    #[test]
    fn test_do_not_resend_leaves_messages_expired() {
        let (mut store, conv) = secure_candidate();
        store.conversation_mut(&conv).unwrap().trust_level = TrustLevel::Secure;
        let pending = store
            .append_user_message(
                &conv,
                user(1),
                MessageContent::Text {
                    body: "abandonne".into(),
                    mentions: vec![],
                },
                Utc::now(),
            )
            .unwrap();
        store.insert_client(Client::new(ClientId("o2".into()), user(2), Utc::now()));
        decrease_security_level_after_discovering(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o2")]),
            Some(pending),
            Utc::now(),
        );

        do_not_resend_messages_that_caused_degradation(&mut store, &conv);
        assert_eq!(trust_level(&store, &conv), TrustLevel::NotSecure);
        let record = store.message(&pending).unwrap();
        assert_eq!(record.delivery_state, DeliveryState::Expired);
        assert!(!record.caused_degradation);
    }

    #[test]
    fn test_transitions_on_unknown_conversation_are_no_ops() {
        let now = Utc::now();
        let mut store = ObjectStore::new(user(1), now);
        let conv = ConversationId::new();

        assert!(increase_security_level_after_trusting(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o1")]),
            now,
        )
        .is_none());
        assert!(decrease_security_level_after_discovering(
            &mut store,
            &conv,
            &BTreeSet::from([device(2, "o1")]),
            None,
            now,
        )
        .is_none());
        assert!(make_not_secure(&mut store, &conv).is_none());
    }

    #[test]
    fn test_started_using_device_is_recorded_once() {
        let (mut store, conv) = secure_candidate();

        let first = append_started_using_this_device(&mut store, &conv, Utc::now());
        assert!(first.is_some());
        let second = append_started_using_this_device(&mut store, &conv, Utc::now());
        assert!(second.is_none());
        assert_eq!(
            system_records(&store, &conv),
            vec![SystemRecordKind::UsingNewDevice]
        );
    }
}
