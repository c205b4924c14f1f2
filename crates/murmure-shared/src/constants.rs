/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// HMAC-SHA256 key size in bytes (legacy asset digest mode)
pub const MAC_KEY_SIZE: usize = 32;

/// SHA-256 / HMAC-SHA256 digest size in bytes
pub const DIGEST_SIZE: usize = 32;

/// Serialized envelope size at or above which the payload is externalized
/// (re-encrypted once under a shared key) instead of fanned out per device.
pub const EXTERNAL_SIZE_THRESHOLD: usize = 128_000;

/// Sentinel ciphertext substituted for devices whose session could not be
/// established. The recipient detects it and recovers by re-keying.
pub const FAILED_SESSION_PAYLOAD: &str = "💣";

/// Placeholder body written over an obfuscated ephemeral message. The
/// record, sender and timestamp stay visible; the content does not.
pub const OBFUSCATED_BODY: &str = "⋯";

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_SESSION_CHAIN: &str = "murmure-session-chain-v1";
pub const KDF_CONTEXT_SESSION_MESSAGE: &str = "murmure-session-message-v1";
