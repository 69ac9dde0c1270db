use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("input truncated: needed {needed} more bytes")]
    TruncatedInput { needed: usize },

    #[error("{0} bytes of trailing input after deserialization")]
    TrailingInput(usize),

    #[error("varint does not fit in 64 bits")]
    VarintOverflow,

    #[error("varint is not minimally encoded")]
    NonCanonicalVarint,

    #[error("unknown action nature {0}")]
    UnknownNature(u64),

    #[error("unsupported serialization version {0}")]
    UnsupportedVersion(u64),

    #[error(transparent)]
    Crypto(#[from] ct_crypto::CryptoError),
}
