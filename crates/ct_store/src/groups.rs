//! Group store.
//!
//! Groups are stored by id; every private key pair the local user has ever
//! held for a group is additionally archived under its public encryption
//! key, so resources published to superseded group keys stay decryptable.

use std::sync::Arc;

use ct_crypto::{
    encryption_key_pair_from_private, signature_key_pair_from_private, EncryptionKeyPair, Hash,
    PrivateEncryptionKey, PrivateSignatureKey, PublicEncryptionKey, PublicSignatureKey,
    SealedPrivateSignatureKey, SymmetricKey,
};
use ct_proto::group::{ExternalGroup, Group, InternalGroup};
use ct_proto::serialization::Reader;
use ct_proto::GroupId;
use tracing::debug;

use crate::datastore::{Datastore, RecordType};
use crate::encrypted::{decrypt_value, encrypt_value};
use crate::error::StoreError;

const TAG_INTERNAL: u8 = 1;
const TAG_EXTERNAL: u8 = 2;

pub struct GroupStore {
    datastore: Arc<dyn Datastore>,
    storage_key: SymmetricKey,
}

impl GroupStore {
    pub fn new(datastore: Arc<dyn Datastore>, storage_key: SymmetricKey) -> Self {
        Self {
            datastore,
            storage_key,
        }
    }

    pub async fn put(&self, group: &Group) -> Result<(), StoreError> {
        debug!(group_id = %group.id(), "storing group");
        let encrypted = encrypt_value(&self.storage_key, &serialize_group(group))?;
        self.datastore
            .put(RecordType::Group, group.id().as_ref(), encrypted)
            .await?;
        if let Group::Internal(internal) = group {
            self.archive_key_pair(&internal.encryption_key_pair).await?;
        }
        Ok(())
    }

    /// Archive a group key pair under its public key. Kept even when the
    /// group record itself is later overwritten by a rotation.
    pub async fn archive_key_pair(&self, key_pair: &EncryptionKeyPair) -> Result<(), StoreError> {
        let encrypted = encrypt_value(&self.storage_key, key_pair.private_key.as_ref())?;
        self.datastore
            .put(
                RecordType::GroupKeyPair,
                key_pair.public_key.as_ref(),
                encrypted,
            )
            .await
    }

    pub async fn find_by_id(&self, group_id: &GroupId) -> Result<Option<Group>, StoreError> {
        match self
            .datastore
            .get(RecordType::Group, group_id.as_ref())
            .await?
        {
            None => Ok(None),
            Some(stored) => {
                let clear = decrypt_value(&self.storage_key, &stored)?;
                Ok(Some(deserialize_group(&clear)?))
            }
        }
    }

    /// Any archived key pair whose public half matches, current or not.
    pub async fn find_key_pair(
        &self,
        public_encryption_key: &PublicEncryptionKey,
    ) -> Result<Option<EncryptionKeyPair>, StoreError> {
        match self
            .datastore
            .get(RecordType::GroupKeyPair, public_encryption_key.as_ref())
            .await?
        {
            None => Ok(None),
            Some(stored) => {
                let clear = decrypt_value(&self.storage_key, &stored)?;
                Ok(Some(encryption_key_pair_from_private(
                    PrivateEncryptionKey::from_slice(&clear)?,
                )))
            }
        }
    }
}

fn serialize_group(group: &Group) -> Vec<u8> {
    let mut out = Vec::new();
    match group {
        Group::Internal(internal) => {
            out.push(TAG_INTERNAL);
            out.extend_from_slice(internal.id.as_ref());
            out.extend_from_slice(internal.signature_key_pair.private_key.as_ref());
            out.extend_from_slice(internal.encryption_key_pair.private_key.as_ref());
            out.extend_from_slice(internal.last_block_hash.as_ref());
            out.extend_from_slice(internal.last_key_rotation_block_hash.as_ref());
        }
        Group::External(external) => {
            out.push(TAG_EXTERNAL);
            out.extend_from_slice(external.id.as_ref());
            out.extend_from_slice(external.public_signature_key.as_ref());
            out.extend_from_slice(external.sealed_private_signature_key.as_ref());
            out.extend_from_slice(external.public_encryption_key.as_ref());
            out.extend_from_slice(external.last_block_hash.as_ref());
            out.extend_from_slice(external.last_key_rotation_block_hash.as_ref());
        }
    }
    out
}

fn deserialize_group(data: &[u8]) -> Result<Group, StoreError> {
    let mut reader = Reader::new(data);
    let group = match reader.read_byte()? {
        TAG_INTERNAL => Group::Internal(InternalGroup {
            id: reader.read_value::<GroupId>()?,
            signature_key_pair: signature_key_pair_from_private(
                reader.read_value::<PrivateSignatureKey>()?,
            )?,
            encryption_key_pair: encryption_key_pair_from_private(
                reader.read_value::<PrivateEncryptionKey>()?,
            ),
            last_block_hash: reader.read_value::<Hash>()?,
            last_key_rotation_block_hash: reader.read_value::<Hash>()?,
        }),
        TAG_EXTERNAL => Group::External(ExternalGroup {
            id: reader.read_value::<GroupId>()?,
            public_signature_key: reader.read_value::<PublicSignatureKey>()?,
            sealed_private_signature_key: reader.read_value::<SealedPrivateSignatureKey>()?,
            public_encryption_key: reader.read_value::<PublicEncryptionKey>()?,
            last_block_hash: reader.read_value::<Hash>()?,
            last_key_rotation_block_hash: reader.read_value::<Hash>()?,
        }),
        tag => return Err(StoreError::Corrupted(format!("unknown group tag {tag}"))),
    };
    reader.expect_end()?;
    Ok(group)
}
