//! Claimed provisional-identity key pairs.
//!
//! After a claim, both encryption halves are kept, keyed by the pair of
//! provisional public signature keys, so key publishes and group seals
//! addressed to the provisional identity stay decryptable.

use std::sync::Arc;

use ct_crypto::{
    encryption_key_pair_from_private, EncryptionKeyPair, PrivateEncryptionKey,
    PublicSignatureKey, SymmetricKey,
};
use ct_proto::serialization::Reader;

use crate::datastore::{Datastore, RecordType};
use crate::encrypted::{decrypt_value, encrypt_value};
use crate::error::StoreError;

/// Both halves of a claimed provisional identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalUserKeys {
    pub app_encryption_key_pair: EncryptionKeyPair,
    pub service_encryption_key_pair: EncryptionKeyPair,
}

pub struct ProvisionalUserKeysStore {
    datastore: Arc<dyn Datastore>,
    storage_key: SymmetricKey,
}

impl ProvisionalUserKeysStore {
    pub fn new(datastore: Arc<dyn Datastore>, storage_key: SymmetricKey) -> Self {
        Self {
            datastore,
            storage_key,
        }
    }

    pub async fn put(
        &self,
        app_public_signature_key: &PublicSignatureKey,
        service_public_signature_key: &PublicSignatureKey,
        keys: &ProvisionalUserKeys,
    ) -> Result<(), StoreError> {
        let mut value = Vec::with_capacity(2 * PrivateEncryptionKey::SIZE);
        value.extend_from_slice(keys.app_encryption_key_pair.private_key.as_ref());
        value.extend_from_slice(keys.service_encryption_key_pair.private_key.as_ref());
        let encrypted = encrypt_value(&self.storage_key, &value)?;
        self.datastore
            .put(
                RecordType::ProvisionalUserKeys,
                &record_key(app_public_signature_key, service_public_signature_key),
                encrypted,
            )
            .await
    }

    pub async fn find(
        &self,
        app_public_signature_key: &PublicSignatureKey,
        service_public_signature_key: &PublicSignatureKey,
    ) -> Result<Option<ProvisionalUserKeys>, StoreError> {
        let stored = self
            .datastore
            .get(
                RecordType::ProvisionalUserKeys,
                &record_key(app_public_signature_key, service_public_signature_key),
            )
            .await?;
        match stored {
            None => Ok(None),
            Some(stored) => {
                let clear = decrypt_value(&self.storage_key, &stored)?;
                let mut reader = Reader::new(&clear);
                let app = reader.read_value::<PrivateEncryptionKey>()?;
                let service = reader.read_value::<PrivateEncryptionKey>()?;
                reader.expect_end()?;
                Ok(Some(ProvisionalUserKeys {
                    app_encryption_key_pair: encryption_key_pair_from_private(app),
                    service_encryption_key_pair: encryption_key_pair_from_private(service),
                }))
            }
        }
    }
}

fn record_key(
    app_public_signature_key: &PublicSignatureKey,
    service_public_signature_key: &PublicSignatureKey,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 * PublicSignatureKey::SIZE);
    key.extend_from_slice(app_public_signature_key.as_ref());
    key.extend_from_slice(service_public_signature_key.as_ref());
    key
}
