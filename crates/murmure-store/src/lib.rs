//! # murmure-store
//!
//! Typed entity store for the Murmure messaging core: users, their
//! cryptographic devices, conversations, the message timeline and the
//! system records interleaved with it.
//!
//! The store is a deliberately thin collaborator. The encryption core,
//! trust machine and destruction scheduler treat it as a key-value object
//! store; durable persistence lives behind it and is out of scope here.

pub mod assets;
pub mod models;
pub mod store;

mod error;

pub use error::{Result, StoreError};
pub use models::*;
pub use store::ObjectStore;
