//! The public error taxonomy.
//!
//! Every failure surfaced by the SDK carries exactly one [`ErrorKind`];
//! server failures additionally keep the raw error code so the session
//! layer can react to specific codes (re-authentication, nuke).

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    InternalError,
    NetworkError,
    PreconditionFailed,
    OperationCanceled,
    DecryptionFailed,
    InvalidVerification,
    TooManyAttempts,
    ExpiredVerification,
    IOError,
    DeviceRevoked,
    Conflict,
    UpgradeRequired,
    IdentityAlreadyAttached,
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    /// Raw server error code, when the failure came from the server.
    pub server_code: Option<String>,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            server_code: None,
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            server_code: None,
            source: Some(source.into()),
        }
    }

    pub fn server(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            server_code: Some(code.into()),
            source: None,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<ct_crypto::CryptoError> for Error {
    fn from(error: ct_crypto::CryptoError) -> Self {
        use ct_crypto::CryptoError;
        let kind = match &error {
            CryptoError::DecryptionFailed(_) | CryptoError::InvalidPadding => {
                ErrorKind::DecryptionFailed
            }
            CryptoError::TruncatedBuffer => ErrorKind::InvalidArgument,
            CryptoError::InvalidBufferSize { .. }
            | CryptoError::InvalidKey(_)
            | CryptoError::InvalidResourceId(_) => ErrorKind::InvalidArgument,
            CryptoError::EncryptionFailed => ErrorKind::InternalError,
        };
        Self::with_source(kind, error.to_string(), error)
    }
}

impl From<ct_proto::ProtoError> for Error {
    fn from(error: ct_proto::ProtoError) -> Self {
        Self::with_source(ErrorKind::InvalidArgument, error.to_string(), error)
    }
}

impl From<ct_encryptor::EncryptorError> for Error {
    fn from(error: ct_encryptor::EncryptorError) -> Self {
        use ct_encryptor::EncryptorError;
        match error {
            EncryptorError::KeyLookup(source) => match source.downcast::<Error>() {
                // A lookup failure keeps its original taxonomy (network,
                // internal) instead of degrading to DecryptionFailed.
                Ok(inner) => inner,
                Err(source) => Self::with_source(
                    ErrorKind::InternalError,
                    "resource key lookup failed",
                    source,
                ),
            },
            EncryptorError::DecryptionFailed(message) => {
                Self::new(ErrorKind::DecryptionFailed, message)
            }
            EncryptorError::InvalidArgument(message) => {
                Self::new(ErrorKind::InvalidArgument, message)
            }
            EncryptorError::UnsupportedVersion(version) => Self::new(
                ErrorKind::InvalidArgument,
                format!("unhandled format version {version} in encrypted data"),
            ),
            EncryptorError::Io(source) => {
                Self::with_source(ErrorKind::IOError, "stream read failed", source)
            }
            EncryptorError::Internal(message) => Self::new(ErrorKind::InternalError, message),
        }
    }
}

impl From<ct_store::StoreError> for Error {
    fn from(error: ct_store::StoreError) -> Self {
        Self::with_source(
            ErrorKind::InternalError,
            format!("local store failure: {error}"),
            error,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aead_failures_map_to_decryption_failed() {
        let error: Error = ct_crypto::CryptoError::DecryptionFailed("MAC").into();
        assert_eq!(error.kind, ErrorKind::DecryptionFailed);
    }

    #[test]
    fn truncation_maps_to_invalid_argument() {
        let error: Error = ct_crypto::CryptoError::TruncatedBuffer.into();
        assert_eq!(error.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn key_lookup_failures_keep_their_kind() {
        let inner = Error::new(ErrorKind::NetworkError, "socket closed");
        let encryptor_error = ct_encryptor::EncryptorError::KeyLookup(inner.into());
        let error: Error = encryptor_error.into();
        assert_eq!(error.kind, ErrorKind::NetworkError);
    }

    #[test]
    fn store_corruption_is_internal() {
        let error: Error = ct_store::StoreError::Corrupted("bad record".into()).into();
        assert_eq!(error.kind, ErrorKind::InternalError);
    }
}
