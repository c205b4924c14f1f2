//! # murmure-shared
//!
//! Wire types, identifiers and cryptographic primitives shared by every
//! Murmure crate.
//!
//! This crate defines the multi-recipient envelope exchanged with the
//! backend, the per-device plaintext payload that gets encrypted once per
//! recipient device, and the symmetric asset codec (encrypt + digest,
//! decrypt-if-digest-matches) used for binary attachments and externalized
//! payloads.

pub mod constants;
pub mod crypto;
pub mod protocol;
pub mod types;

mod error;

pub use error::{CryptoError, MurmureError};
