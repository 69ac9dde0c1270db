use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A stored record failed to decrypt or decode. The store is the only
    /// writer, so this means on-disk corruption.
    #[error("corrupted store record: {0}")]
    Corrupted(String),

    #[error("unsupported device blob version {0}")]
    UnsupportedVersion(u64),

    #[error(transparent)]
    Crypto(#[from] ct_crypto::CryptoError),
}

impl From<ct_proto::ProtoError> for StoreError {
    fn from(error: ct_proto::ProtoError) -> Self {
        StoreError::Corrupted(error.to_string())
    }
}

impl From<ct_encryptor::EncryptorError> for StoreError {
    fn from(error: ct_encryptor::EncryptorError) -> Self {
        StoreError::Corrupted(error.to_string())
    }
}
