use ct_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EncryptorError {
    /// Malformed input: empty, truncated below the format's overhead, or an
    /// impossible size. Distinct from an authentication failure.
    #[error("invalid encrypted data: {0}")]
    InvalidArgument(&'static str),

    #[error("unhandled format version {0} in encrypted data")]
    UnsupportedVersion(u8),

    #[error("decryption failed: {0}")]
    DecryptionFailed(&'static str),

    /// The resource key lookup itself failed (network, store). The original
    /// error is preserved so callers can recover its kind.
    #[error("resource key lookup failed")]
    KeyLookup(#[source] anyhow::Error),

    #[error("read from input source failed")]
    Io(#[source] anyhow::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CryptoError> for EncryptorError {
    fn from(error: CryptoError) -> Self {
        match error {
            CryptoError::DecryptionFailed(message) => EncryptorError::DecryptionFailed(message),
            CryptoError::TruncatedBuffer => {
                EncryptorError::InvalidArgument("truncated encrypted buffer")
            }
            CryptoError::InvalidPadding => {
                EncryptorError::DecryptionFailed("could not remove padding")
            }
            other => EncryptorError::Internal(other.to_string()),
        }
    }
}

impl EncryptorError {
    /// Authentication/format failures that P-series tests assert on.
    pub fn is_decryption_failed(&self) -> bool {
        matches!(self, EncryptorError::DecryptionFailed(_))
    }
}
