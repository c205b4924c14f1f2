use thiserror::Error;

use murmure_shared::types::{ConversationId, MessageId};
use murmure_shared::{CryptoError, MurmureError};

use crate::session::SessionError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Delivery confirmation {0} has no resolvable recipient")]
    ConfirmationNeedsRecipient(MessageId),

    #[error("Button action {0} has no resolvable recipient")]
    ActionNeedsRecipient(MessageId),

    #[error("No local device registered; cannot encrypt")]
    NoSelfClient,

    #[error("Externalized pointer envelope still exceeds the size threshold")]
    ExternalPayloadOversized,

    #[error("System records are never encrypted")]
    SystemRecordNotSendable,

    #[error("Unknown message: {0}")]
    MessageNotFound(MessageId),

    #[error("Unknown conversation: {0}")]
    ConversationNotFound(ConversationId),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<MurmureError> for CoreError {
    fn from(err: MurmureError) -> Self {
        match err {
            MurmureError::Crypto(e) => CoreError::Crypto(e),
            other => CoreError::Serialization(other.to_string()),
        }
    }
}
