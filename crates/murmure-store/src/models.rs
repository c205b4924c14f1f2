//! Domain model structs held by the object store.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to an embedding application over IPC.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use murmure_shared::protocol::MessageContent;
use murmure_shared::types::{ClientId, ConversationId, MessageId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A known user identity.  The primary key is the 32-byte Ed25519 public key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// Optional human-readable display name.
    pub display_name: Option<String>,
    /// Service (bot) accounts get recipients-by-mention treatment and
    /// block the secure trust level.
    pub is_service: bool,
    /// Whether the self user holds an accepted connection to this user.
    pub is_connected: bool,
    /// Set when the account was deleted on the backend; deleted accounts
    /// never receive ciphertext.
    pub account_deleted: bool,
    /// Team tag; participants outside the self user's team that are not
    /// connected count as external and block the secure trust level.
    pub team: Option<String>,
    /// Timestamp when this user was first seen / created locally.
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name: None,
            is_service: false,
            is_connected: false,
            account_deleted: false,
            team: None,
            created_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Client (device)
// ---------------------------------------------------------------------------

/// One cryptographic device of a user. Created when the device is first
/// observed (locally or from a server payload), deleted when it is revoked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Client {
    pub id: ClientId,
    pub user: UserId,
    /// Whether the self user has verified this device's fingerprint.
    pub verified: bool,
    /// Set after a failed session establishment; such devices receive the
    /// sentinel tombstone ciphertext so they can recover by re-keying.
    pub failed_to_establish_session: bool,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(id: ClientId, user: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user,
            verified: false,
            failed_to_establish_session: false,
            created_at: now,
        }
    }
}

/// A (user, device) pair, the unit the trust machine reasons about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceRef {
    pub user: UserId,
    pub client: ClientId,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Conversation-wide trust derived from participants' device verification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrustLevel {
    /// Never verified, or explicitly reset by the user to silence prompts.
    NotSecure,
    /// Every active participant's every device is verified.
    Secure,
    /// Was secure; an unverified device has since been discovered or
    /// ignored.
    SecureWithIgnored,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConversationKind {
    /// One-to-one conversation with the connected user.
    OneToOne { connected_user: UserId },
    Group,
}

/// Well-known destruction timeouts, with a custom fallback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DestructionTimeout {
    TenSeconds,
    FiveMinutes,
    OneHour,
    OneDay,
    OneWeek,
    FourWeeks,
    Custom(u64),
}

impl DestructionTimeout {
    /// Map a raw second count onto a timeout. Zero means "not ephemeral".
    pub fn from_seconds(seconds: u64) -> Option<Self> {
        match seconds {
            0 => None,
            10 => Some(Self::TenSeconds),
            300 => Some(Self::FiveMinutes),
            3_600 => Some(Self::OneHour),
            86_400 => Some(Self::OneDay),
            604_800 => Some(Self::OneWeek),
            2_419_200 => Some(Self::FourWeeks),
            other => Some(Self::Custom(other)),
        }
    }

    pub fn seconds(&self) -> u64 {
        match self {
            Self::TenSeconds => 10,
            Self::FiveMinutes => 300,
            Self::OneHour => 3_600,
            Self::OneDay => 86_400,
            Self::OneWeek => 604_800,
            Self::FourWeeks => 2_419_200,
            Self::Custom(seconds) => *seconds,
        }
    }

    pub fn is_known_timeout(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

/// A conversation and its participant state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    /// Active participants, self user included.
    pub participants: BTreeSet<UserId>,
    pub trust_level: TrustLevel,
    /// Destruction timeout applied to newly appended messages.
    pub message_timer: Option<DestructionTimeout>,
    /// Everything at or before this timestamp has been read locally.
    pub read_marker: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(
        id: ConversationId,
        kind: ConversationKind,
        participants: BTreeSet<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            participants,
            trust_level: TrustLevel::NotSecure,
            message_timer: None,
            read_marker: None,
            created_at: now,
        }
    }

    /// The connected user of a one-to-one conversation.
    pub fn connected_user(&self) -> Option<&UserId> {
        match &self.kind {
            ConversationKind::OneToOne { connected_user } => Some(connected_user),
            ConversationKind::Group => None,
        }
    }
}

// ---------------------------------------------------------------------------
// System records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SystemRecordKind {
    /// New (unverified) devices were discovered.
    NewClient,
    /// The user dismissed newly discovered devices without verifying.
    IgnoredClient,
    /// All devices of all participants are now verified.
    ConversationIsSecure,
    /// The self user started using this device.
    UsingNewDevice,
    /// A participant changed the conversation's destruction timer.
    MessageTimerUpdate,
}

/// A locally generated timeline record describing a state change rather
/// than user content. Never encrypted, never sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemRecord {
    pub kind: SystemRecordKind,
    /// Users affected by the change.
    pub users: BTreeSet<UserId>,
    /// Devices that triggered the change.
    pub devices: BTreeSet<DeviceRef>,
    /// New timer in seconds, for `MessageTimerUpdate` (0 = off).
    pub timer_seconds: Option<u64>,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DeliveryState {
    /// Created locally, not yet handed off.
    Pending,
    /// Durably handed off to the backend.
    Sent,
    /// Confirmed received by at least one recipient device.
    Delivered,
    /// Gave up: marked undeliverable (e.g. after a trust downgrade).
    Expired,
}

/// What a timeline record carries: user content or a system record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecordContent {
    User(MessageContent),
    System(SystemRecord),
}

/// A single timeline record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRecord {
    /// Unique message identifier (nonce).
    pub id: MessageId,
    pub conversation: ConversationId,
    pub sender: UserId,
    pub content: RecordContent,
    pub timestamp: DateTime<Utc>,
    pub delivery_state: DeliveryState,
    /// Destruction timeout copied from the conversation at append time.
    pub ephemeral_timeout: Option<DestructionTimeout>,
    /// Fire date, set once the destruction countdown has started.
    pub destruction_date: Option<DateTime<Utc>>,
    /// The author's own copy of a fired ephemeral message: content was
    /// replaced with a placeholder, structure retained.
    pub is_obfuscated: bool,
    /// This message was expired because its send discovered unverified
    /// devices (excluding pure delivery receipts).
    pub caused_degradation: bool,
    /// Removed from the visible timeline (receiver-side destruction).
    pub hidden: bool,
    /// The destruction countdown must not start while a link preview is
    /// still being resolved.
    pub awaiting_link_preview: bool,
}

impl MessageRecord {
    pub fn new(
        id: MessageId,
        conversation: ConversationId,
        sender: UserId,
        content: MessageContent,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            conversation,
            sender,
            content: RecordContent::User(content),
            timestamp,
            delivery_state: DeliveryState::Pending,
            ephemeral_timeout: None,
            destruction_date: None,
            is_obfuscated: false,
            caused_degradation: false,
            hidden: false,
            awaiting_link_preview: false,
        }
    }

    pub fn system(
        id: MessageId,
        conversation: ConversationId,
        sender: UserId,
        record: SystemRecord,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            conversation,
            sender,
            content: RecordContent::System(record),
            timestamp,
            delivery_state: DeliveryState::Delivered,
            ephemeral_timeout: None,
            destruction_date: None,
            is_obfuscated: false,
            caused_degradation: false,
            hidden: false,
            awaiting_link_preview: false,
        }
    }

    pub fn user_content(&self) -> Option<&MessageContent> {
        match &self.content {
            RecordContent::User(content) => Some(content),
            RecordContent::System(_) => None,
        }
    }

    pub fn system_record(&self) -> Option<&SystemRecord> {
        match &self.content {
            RecordContent::System(record) => Some(record),
            RecordContent::User(_) => None,
        }
    }

    pub fn is_confirmation(&self) -> bool {
        self.user_content().is_some_and(MessageContent::is_confirmation)
    }

    /// Whether this message self-destructs.
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_timeout.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destruction_timeout_mapping() {
        assert_eq!(DestructionTimeout::from_seconds(0), None);
        assert_eq!(
            DestructionTimeout::from_seconds(10),
            Some(DestructionTimeout::TenSeconds)
        );
        assert_eq!(
            DestructionTimeout::from_seconds(42),
            Some(DestructionTimeout::Custom(42))
        );
        assert!(!DestructionTimeout::Custom(42).is_known_timeout());
        assert_eq!(DestructionTimeout::FourWeeks.seconds(), 2_419_200);
    }

    #[test]
    fn test_message_record_defaults() {
        let record = MessageRecord::new(
            MessageId::new(),
            ConversationId::new(),
            UserId([1u8; 32]),
            MessageContent::Text {
                body: "salut".into(),
                mentions: vec![],
            },
            Utc::now(),
        );
        assert_eq!(record.delivery_state, DeliveryState::Pending);
        assert!(!record.is_ephemeral());
        assert!(!record.is_confirmation());
        assert!(record.user_content().is_some());
    }
}
