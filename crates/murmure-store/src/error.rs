use thiserror::Error;

use murmure_shared::types::{ClientId, ConversationId, MessageId};

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),

    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),

    #[error("Unknown message: {0}")]
    UnknownMessage(MessageId),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
