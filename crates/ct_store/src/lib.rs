//! Encrypted local storage for the Cachet SDK.
//!
//! The persistence backend is a pluggable key-value collaborator; this
//! crate owns the record formats and encrypts every value under a key
//! derived from the user secret.

mod datastore;
mod device_data;
mod encrypted;
mod error;
mod groups;
mod provisional;
mod resource_keys;

pub use datastore::{Datastore, MemoryDatastore, RecordType};
pub use device_data::DeviceData;
pub use encrypted::{decrypt_value, encrypt_value, storage_key_from_user_secret};
pub use error::StoreError;
pub use groups::GroupStore;
pub use provisional::{ProvisionalUserKeys, ProvisionalUserKeysStore};
pub use resource_keys::ResourceKeyStore;

use std::sync::Arc;

use ct_crypto::SymmetricKey;

/// Per-device record identifier for the `DeviceData` blob (one per store).
const DEVICE_DATA_KEY: &[u8] = b"device";

/// Load or persist the `DeviceData` blob.
pub struct DeviceStore {
    datastore: Arc<dyn Datastore>,
    storage_key: SymmetricKey,
}

impl DeviceStore {
    pub fn new(datastore: Arc<dyn Datastore>, storage_key: SymmetricKey) -> Self {
        Self {
            datastore,
            storage_key,
        }
    }

    pub async fn save(&self, device_data: &DeviceData) -> Result<(), StoreError> {
        let encrypted = encrypt_value(&self.storage_key, &device_data.serialize())?;
        self.datastore
            .put(RecordType::DeviceData, DEVICE_DATA_KEY, encrypted)
            .await
    }

    pub async fn load(&self) -> Result<Option<DeviceData>, StoreError> {
        match self
            .datastore
            .get(RecordType::DeviceData, DEVICE_DATA_KEY)
            .await?
        {
            None => Ok(None),
            Some(stored) => {
                let clear = decrypt_value(&self.storage_key, &stored)?;
                Ok(Some(DeviceData::deserialize(&clear)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_proto::DeviceId;

    #[tokio::test]
    async fn device_data_roundtrip() {
        let datastore = Arc::new(MemoryDatastore::new());
        let store = DeviceStore::new(datastore, storage_key_from_user_secret(&[9u8; 32]));
        assert!(store.load().await.unwrap().is_none());

        let data = DeviceData {
            trustchain_public_signature_key: ct_crypto::make_signature_key_pair().public_key,
            device_id: DeviceId::random(),
            signature_key_pair: ct_crypto::make_signature_key_pair(),
            encryption_key_pair: ct_crypto::make_encryption_key_pair(),
            user_key_pairs: vec![ct_crypto::make_encryption_key_pair()],
        };
        store.save(&data).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(data));
    }

    #[tokio::test]
    async fn wrong_user_secret_reads_as_corruption() {
        let datastore = Arc::new(MemoryDatastore::new());
        let store = DeviceStore::new(datastore.clone(), storage_key_from_user_secret(&[1u8; 32]));
        let data = DeviceData {
            trustchain_public_signature_key: ct_crypto::make_signature_key_pair().public_key,
            device_id: DeviceId::random(),
            signature_key_pair: ct_crypto::make_signature_key_pair(),
            encryption_key_pair: ct_crypto::make_encryption_key_pair(),
            user_key_pairs: vec![],
        };
        store.save(&data).await.unwrap();

        let wrong = DeviceStore::new(datastore, storage_key_from_user_secret(&[2u8; 32]));
        assert!(wrong.load().await.is_err());
    }
}
