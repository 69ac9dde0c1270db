//! Resource identifiers.
//!
//! A resource is addressed either by a legacy 16-byte id (historically the
//! ciphertext MAC, later a random session id) or by a 33-byte composite id:
//! a type tag, the session id, and the per-resource subkey seed.

use crate::bytes_type;
use crate::error::CryptoError;
use crate::types::SubkeySeed;

bytes_type!(
    /// Legacy 16-byte resource id; also the session id of the transparent
    /// session formats.
    SimpleResourceId, 16
);

bytes_type!(
    /// `type(1) || sessionId(16) || subkeySeed(16)`.
    CompositeResourceId, 33
);

impl CompositeResourceId {
    /// Composite ids carrying a transparent-session key derivation.
    pub const TRANSPARENT_SESSION_TYPE: u8 = 0;

    pub fn transparent_session(session_id: &SimpleResourceId, seed: &SubkeySeed) -> Self {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = Self::TRANSPARENT_SESSION_TYPE;
        bytes[1..17].copy_from_slice(session_id.as_ref());
        bytes[17..33].copy_from_slice(seed.as_ref());
        Self::new(bytes)
    }

    pub fn type_byte(&self) -> u8 {
        self.as_bytes()[0]
    }

    pub fn session_id(&self) -> SimpleResourceId {
        SimpleResourceId::from_slice(&self.as_bytes()[1..17]).expect("fixed 16-byte range")
    }

    /// The seed bytes, viewed as a standalone resource id. Used as the
    /// cache fallback when the session key itself is unknown.
    pub fn individual_resource_id(&self) -> SimpleResourceId {
        SimpleResourceId::from_slice(&self.as_bytes()[17..33]).expect("fixed 16-byte range")
    }

    pub fn subkey_seed(&self) -> SubkeySeed {
        SubkeySeed::from_slice(&self.as_bytes()[17..33]).expect("fixed 16-byte range")
    }
}

/// Either form of resource id, as extracted from a ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceId {
    Simple(SimpleResourceId),
    Composite(CompositeResourceId),
}

impl ResourceId {
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        match slice.len() {
            SimpleResourceId::SIZE => Ok(ResourceId::Simple(SimpleResourceId::from_slice(slice)?)),
            CompositeResourceId::SIZE => {
                Ok(ResourceId::Composite(CompositeResourceId::from_slice(slice)?))
            }
            n => Err(CryptoError::InvalidResourceId(n)),
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        match self {
            ResourceId::Simple(id) => id.to_vec(),
            ResourceId::Composite(id) => id.to_vec(),
        }
    }
}

impl From<SimpleResourceId> for ResourceId {
    fn from(id: SimpleResourceId) -> Self {
        ResourceId::Simple(id)
    }
}

impl From<CompositeResourceId> for ResourceId {
    fn from(id: CompositeResourceId) -> Self {
        ResourceId::Composite(id)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceId::Simple(id) => id.fmt(f),
            ResourceId::Composite(id) => id.fmt(f),
        }
    }
}
