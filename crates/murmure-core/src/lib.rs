//! # murmure-core
//!
//! The hard center of the Murmure messaging stack: per-device encryption
//! fan-out with oversized-payload externalization, the conversation trust
//! state machine it feeds, and the ephemeral message destruction scheduler
//! sharing its lifecycle.
//!
//! An outgoing message flows through the recipient resolver (who is
//! authorized, how strictly must the backend check completeness), then the
//! fan-out encryptor (one ciphertext per recipient device), which reroutes
//! oversized envelopes through the externalizer after rolling back every
//! ratchet advance made for the discarded attempt. Device discoveries and
//! user trust actions drive the trust machine; sent/read lifecycle events
//! drive the destruction scheduler.

pub mod config;
pub mod ephemeral;
pub mod external;
pub mod fanout;
pub mod resolver;
pub mod session;
pub mod trust;

mod error;

pub use config::CoreConfig;
pub use ephemeral::DestructionTimer;
pub use error::CoreError;
pub use external::decode_external_blob;
pub use fanout::{
    encrypt_for_clients, encrypt_for_transport, recipient_map, EncryptedPayload, RecipientMap,
};
pub use resolver::{resolve_recipients, MissingClientsStrategy, ResolvedRecipients};
pub use session::{
    migrate_legacy_session_if_needed, InMemorySessionStore, SessionError, SessionLock,
    SessionStore,
};
pub use trust::TrustChange;
