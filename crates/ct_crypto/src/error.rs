use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid buffer size for {name}: expected {expected}, got {actual}")]
    InvalidBufferSize {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("truncated encrypted buffer")]
    TruncatedBuffer,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed: {0}")]
    DecryptionFailed(&'static str),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("could not remove padding")]
    InvalidPadding,

    #[error("invalid resource id of {0} bytes")]
    InvalidResourceId(usize),
}
