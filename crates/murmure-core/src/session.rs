//! Cryptographic session store capability.
//!
//! The fan-out encryptor only needs four things from a session layer:
//! session existence, per-device encryption (which irreversibly advances
//! the sending ratchet), identity migration, and a checkpoint/rollback
//! discipline so an encryption attempt that gets discarded (oversized
//! envelope, failed hand-off) does not leave ratchets advanced past state
//! the recipients will ever see.
//!
//! [`InMemorySessionStore`] is the bundled implementation: a symmetric
//! BLAKE3 chain ratchet per session. A real deployment can substitute any
//! store that honors the same contract.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use murmure_shared::constants::{KDF_CONTEXT_SESSION_CHAIN, KDF_CONTEXT_SESSION_MESSAGE};
use murmure_shared::crypto::{self, SymmetricKey};
use murmure_shared::types::{ClientId, SessionId, UserId};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No session: {0}")]
    NoSession(SessionId),

    #[error("Encryption failed for session {0}")]
    EncryptionFailed(SessionId),

    #[error("Decryption failed for session {0}")]
    DecryptionFailed(SessionId),
}

/// What the encryption core requires of a session layer.
///
/// `encrypt` advances the session's sending state; that advance is not
/// reversible by the remote side. Callers that may discard the produced
/// ciphertext must bracket the attempt with `checkpoint` and resolve it
/// with either `commit` (ciphertext handed off) or `rollback` (ciphertext
/// discarded, state restored). Snapshots do not nest: a new `checkpoint`
/// replaces the previous one.
pub trait SessionStore {
    fn has_session(&self, session: &SessionId) -> bool;

    /// Encrypt `plaintext` for one device, advancing the session state.
    fn encrypt(&mut self, plaintext: &[u8], session: &SessionId) -> Result<Vec<u8>, SessionError>;

    /// Re-key a session under a new identity. If the new identity already
    /// has a session, the old one is discarded instead.
    fn migrate_session(&mut self, old: &SessionId, new: &SessionId);

    fn checkpoint(&mut self);
    fn rollback(&mut self);
    fn commit(&mut self);

    /// Human-comparable fingerprint of the current session state, for
    /// device verification UI. `None` if no session exists.
    fn fingerprint(&self, session: &SessionId) -> Option<String>;
}

/// Sending/receiving state of one session: a hash chain plus the index of
/// the next message key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RatchetState {
    chain_key: SymmetricKey,
    counter: u64,
}

fn next_chain_key(chain_key: &SymmetricKey) -> SymmetricKey {
    blake3::derive_key(KDF_CONTEXT_SESSION_CHAIN, chain_key)
}

fn message_key(chain_key: &SymmetricKey, counter: u64) -> SymmetricKey {
    let mut material = [0u8; 40];
    material[..32].copy_from_slice(chain_key);
    material[32..].copy_from_slice(&counter.to_le_bytes());
    blake3::derive_key(KDF_CONTEXT_SESSION_MESSAGE, &material)
}

/// In-memory session store backed by a per-session BLAKE3 chain ratchet.
///
/// Both peers derive the same chain from the shared root key, so a message
/// encrypted at counter `n` decrypts on any peer whose receive state has
/// not moved past `n`. Skipped message keys are not retained: decryption
/// fast-forwards, and older messages are rejected.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: HashMap<SessionId, RatchetState>,
    snapshot: Option<HashMap<SessionId, RatchetState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a session from the shared root key agreed during key
    /// exchange. Replaces any existing session under the same identity.
    pub fn establish_session(&mut self, session: SessionId, root_key: SymmetricKey) {
        self.sessions.insert(
            session,
            RatchetState {
                chain_key: root_key,
                counter: 0,
            },
        );
    }

    pub fn delete_session(&mut self, session: &SessionId) {
        self.sessions.remove(session);
    }

    /// Decrypt a message produced by the peer's chain, fast-forwarding the
    /// local receive state to just past the message's counter.
    pub fn decrypt(&mut self, data: &[u8], session: &SessionId) -> Result<Vec<u8>, SessionError> {
        let state = self
            .sessions
            .get_mut(session)
            .ok_or_else(|| SessionError::NoSession(session.clone()))?;

        if data.len() < 8 {
            return Err(SessionError::DecryptionFailed(session.clone()));
        }
        let (header, ciphertext) = data.split_at(8);
        let mut counter_bytes = [0u8; 8];
        counter_bytes.copy_from_slice(header);
        let counter = u64::from_le_bytes(counter_bytes);

        // Message keys are not retained; anything behind the chain is gone.
        if counter < state.counter {
            return Err(SessionError::DecryptionFailed(session.clone()));
        }

        let mut chain_key = state.chain_key;
        for _ in state.counter..counter {
            chain_key = next_chain_key(&chain_key);
        }
        let key = message_key(&chain_key, counter);
        let plaintext = crypto::decrypt(&key, ciphertext)
            .map_err(|_| SessionError::DecryptionFailed(session.clone()))?;

        state.chain_key = next_chain_key(&chain_key);
        state.counter = counter + 1;
        Ok(plaintext)
    }
}

impl SessionStore for InMemorySessionStore {
    fn has_session(&self, session: &SessionId) -> bool {
        self.sessions.contains_key(session)
    }

    fn encrypt(&mut self, plaintext: &[u8], session: &SessionId) -> Result<Vec<u8>, SessionError> {
        let state = self
            .sessions
            .get_mut(session)
            .ok_or_else(|| SessionError::NoSession(session.clone()))?;

        let key = message_key(&state.chain_key, state.counter);
        let ciphertext = crypto::encrypt(&key, plaintext)
            .map_err(|_| SessionError::EncryptionFailed(session.clone()))?;

        let mut output = Vec::with_capacity(8 + ciphertext.len());
        output.extend_from_slice(&state.counter.to_le_bytes());
        output.extend_from_slice(&ciphertext);

        state.chain_key = next_chain_key(&state.chain_key);
        state.counter += 1;
        Ok(output)
    }

    fn migrate_session(&mut self, old: &SessionId, new: &SessionId) {
        let Some(state) = self.sessions.remove(old) else {
            return;
        };
        self.sessions.entry(new.clone()).or_insert(state);
    }

    fn checkpoint(&mut self) {
        self.snapshot = Some(self.sessions.clone());
    }

    fn rollback(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.sessions = snapshot;
        }
    }

    fn commit(&mut self) {
        self.snapshot = None;
    }

    fn fingerprint(&self, session: &SessionId) -> Option<String> {
        let state = self.sessions.get(session)?;
        let mut material = [0u8; 40];
        material[..32].copy_from_slice(&state.chain_key);
        material[32..].copy_from_slice(&state.counter.to_le_bytes());
        Some(hex::encode(blake3::hash(&material).as_bytes()))
    }
}

/// Upgrade a device-keyed (v1) session to the composite identity, once the
/// owning user of the device is known. No-op when no legacy session exists;
/// an already established composite session wins.
pub fn migrate_legacy_session_if_needed<S: SessionStore>(
    sessions: &mut S,
    user: &UserId,
    client: &ClientId,
) {
    let legacy = SessionId::legacy(client);
    if sessions.has_session(&legacy) {
        sessions.migrate_session(&legacy, &SessionId::for_client(user, client));
    }
}

/// Serializes all session access, mirroring the single-queue discipline the
/// checkpoint/rollback contract assumes. Poisoning is ignored: session
/// state stays consistent under the rollback discipline even if a holder
/// panicked mid-operation.
pub struct SessionLock<S> {
    inner: Mutex<S>,
}

impl<S> SessionLock<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Mutex::new(store),
        }
    }

    pub fn perform<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut store = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut store)
    }

    pub fn into_inner(self) -> S {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
