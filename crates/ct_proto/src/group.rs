//! Group views derived from a verified group chain.

use ct_crypto::{
    EncryptionKeyPair, Hash, PublicEncryptionKey, PublicSignatureKey,
    SealedPrivateSignatureKey, SignatureKeyPair,
};

use crate::ids::GroupId;

/// The local user holds the group's private keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalGroup {
    pub id: GroupId,
    pub signature_key_pair: SignatureKeyPair,
    pub encryption_key_pair: EncryptionKeyPair,
    pub last_block_hash: Hash,
    pub last_key_rotation_block_hash: Hash,
}

/// The local user is not a member; only public material plus the sealed
/// private signature key (needed if a later addition lets us in).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalGroup {
    pub id: GroupId,
    pub public_signature_key: PublicSignatureKey,
    pub sealed_private_signature_key: SealedPrivateSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    pub last_block_hash: Hash,
    pub last_key_rotation_block_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Group {
    Internal(InternalGroup),
    External(ExternalGroup),
}

impl Group {
    pub fn id(&self) -> GroupId {
        match self {
            Group::Internal(group) => group.id,
            Group::External(group) => group.id,
        }
    }

    pub fn public_signature_key(&self) -> PublicSignatureKey {
        match self {
            Group::Internal(group) => group.signature_key_pair.public_key,
            Group::External(group) => group.public_signature_key,
        }
    }

    pub fn public_encryption_key(&self) -> PublicEncryptionKey {
        match self {
            Group::Internal(group) => group.encryption_key_pair.public_key,
            Group::External(group) => group.public_encryption_key,
        }
    }

    pub fn last_block_hash(&self) -> Hash {
        match self {
            Group::Internal(group) => group.last_block_hash,
            Group::External(group) => group.last_block_hash,
        }
    }

    pub fn last_key_rotation_block_hash(&self) -> Hash {
        match self {
            Group::Internal(group) => group.last_key_rotation_block_hash,
            Group::External(group) => group.last_key_rotation_block_hash,
        }
    }

    pub fn set_last_block_hash(&mut self, hash: Hash) {
        match self {
            Group::Internal(group) => group.last_block_hash = hash,
            Group::External(group) => group.last_block_hash = hash,
        }
    }
}
