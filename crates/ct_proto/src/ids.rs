//! Trustchain-scoped identifiers.
//!
//! All four are 32 bytes: a trustchain id is the hash of its creation
//! action, a device id is the hash of the device's creation action, a user
//! id is an obfuscated application identifier, and a group id is the
//! group's public signature key.

use ct_crypto::{bytes_type, Hash, PublicSignatureKey};

bytes_type!(
    /// Hash of the trustchain creation action.
    TrustchainId, 32
);
bytes_type!(
    /// Obfuscated application user identifier.
    UserId, 32
);
bytes_type!(
    /// Hash of the device creation action.
    DeviceId, 32
);
bytes_type!(
    /// The group's public signature key.
    GroupId, 32
);

impl From<Hash> for TrustchainId {
    fn from(hash: Hash) -> Self {
        Self::new(*hash.as_bytes())
    }
}

impl From<TrustchainId> for Hash {
    fn from(id: TrustchainId) -> Self {
        Hash::new(*id.as_bytes())
    }
}

impl From<Hash> for DeviceId {
    fn from(hash: Hash) -> Self {
        Self::new(*hash.as_bytes())
    }
}

impl From<DeviceId> for Hash {
    fn from(id: DeviceId) -> Self {
        Hash::new(*id.as_bytes())
    }
}

impl From<PublicSignatureKey> for GroupId {
    fn from(key: PublicSignatureKey) -> Self {
        Self::new(*key.as_bytes())
    }
}

impl From<GroupId> for PublicSignatureKey {
    fn from(id: GroupId) -> Self {
        PublicSignatureKey::new(*id.as_bytes())
    }
}
