use thiserror::Error;

#[derive(Error, Debug)]
pub enum MurmureError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("Digest does not match ciphertext")]
    DigestMismatch,

    #[error("Invalid key length")]
    InvalidKeyLength,
}
