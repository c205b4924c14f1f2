use serde::{Deserialize, Serialize};
use uuid::Uuid;

// User identity = Ed25519 public key (32 bytes)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub [u8; 32]);

impl UserId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Remote identifier of one cryptographic device of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub String);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message nonce, unique per conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the local cryptographic session with one remote device.
///
/// The current form is a stable composite of user identifier and device
/// identifier; the legacy (v1) form was keyed by the device alone and is
/// still understood so that old sessions can be migrated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Composite session identity for the given device of the given user.
    pub fn for_client(user: &UserId, client: &ClientId) -> Self {
        Self(format!("{}_{}", user.to_hex(), client.0))
    }

    /// Legacy (v1) session identity, keyed by the device identifier alone.
    pub fn legacy(client: &ClientId) -> Self {
        Self(client.0.clone())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_hex_roundtrip() {
        let id = UserId([42u8; 32]);
        let restored = UserId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, restored);
    }

    #[test]
    fn test_user_id_from_bad_hex() {
        assert!(UserId::from_hex("abcd").is_err());
        assert!(UserId::from_hex("zz").is_err());
    }

    #[test]
    fn test_session_id_forms_differ() {
        let user = UserId([1u8; 32]);
        let client = ClientId("deadbeef".into());
        assert_ne!(
            SessionId::for_client(&user, &client),
            SessionId::legacy(&client)
        );
    }

    #[test]
    fn test_session_id_is_deterministic() {
        let user = UserId([7u8; 32]);
        let client = ClientId("c1".into());
        assert_eq!(
            SessionId::for_client(&user, &client),
            SessionId::for_client(&user, &client)
        );
    }
}
