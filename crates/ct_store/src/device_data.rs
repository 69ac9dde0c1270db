//! The persisted `DeviceData` blob.
//!
//! Binary layout (version 1):
//!
//! ```text
//! version(varint=1)
//! | trustchainPublicSignatureKey(32)
//! | deviceId(32)
//! | devicePrivateSignatureKey(64) | devicePrivateEncryptionKey(32)
//! | varint(n) | privateUserEncryptionKey(32)^n      (oldest first)
//! ```
//!
//! Public halves are recomputed from the private keys on load.

use ct_crypto::{
    encryption_key_pair_from_private, signature_key_pair_from_private, EncryptionKeyPair,
    PrivateEncryptionKey, PrivateSignatureKey, PublicSignatureKey, SignatureKeyPair,
};
use ct_proto::serialization::{varint_write, Reader};
use ct_proto::DeviceId;

use crate::error::StoreError;

const VERSION: u64 = 1;

/// Everything the local device must remember across sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceData {
    pub trustchain_public_signature_key: PublicSignatureKey,
    pub device_id: DeviceId,
    pub signature_key_pair: SignatureKeyPair,
    pub encryption_key_pair: EncryptionKeyPair,
    /// Every user key pair ever held, oldest first. Old pairs decrypt
    /// resources published before a rotation.
    pub user_key_pairs: Vec<EncryptionKeyPair>,
}

impl DeviceData {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        varint_write(&mut out, VERSION);
        out.extend_from_slice(self.trustchain_public_signature_key.as_ref());
        out.extend_from_slice(self.device_id.as_ref());
        out.extend_from_slice(self.signature_key_pair.private_key.as_ref());
        out.extend_from_slice(self.encryption_key_pair.private_key.as_ref());
        varint_write(&mut out, self.user_key_pairs.len() as u64);
        for key_pair in &self.user_key_pairs {
            out.extend_from_slice(key_pair.private_key.as_ref());
        }
        out
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, StoreError> {
        let mut reader = Reader::new(data);
        let version = reader.read_varint()?;
        if version != VERSION {
            return Err(StoreError::UnsupportedVersion(version));
        }
        let trustchain_public_signature_key = reader.read_value::<PublicSignatureKey>()?;
        let device_id = reader.read_value::<DeviceId>()?;
        let signature_key_pair =
            signature_key_pair_from_private(reader.read_value::<PrivateSignatureKey>()?)?;
        let encryption_key_pair =
            encryption_key_pair_from_private(reader.read_value::<PrivateEncryptionKey>()?);
        let count = reader.read_varint()?;
        // The count is only a claim; a corrupted blob must error, not
        // drive an allocation.
        let mut user_key_pairs =
            Vec::with_capacity(reader.list_capacity(count, PrivateEncryptionKey::SIZE));
        for _ in 0..count {
            user_key_pairs.push(encryption_key_pair_from_private(
                reader.read_value::<PrivateEncryptionKey>()?,
            ));
        }
        reader.expect_end()?;
        Ok(Self {
            trustchain_public_signature_key,
            device_id,
            signature_key_pair,
            encryption_key_pair,
            user_key_pairs,
        })
    }

    /// Current user key pair, if any key was ever created.
    pub fn current_user_key_pair(&self) -> Option<&EncryptionKeyPair> {
        self.user_key_pairs.last()
    }
}
