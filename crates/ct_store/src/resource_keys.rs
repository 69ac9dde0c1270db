//! Resource-key cache: `SimpleResourceId → SymmetricKey`.
//!
//! Idempotent by construction: putting the same key twice is harmless, so
//! cancelled fetches need no rollback.

use std::sync::Arc;

use ct_crypto::{SimpleResourceId, SymmetricKey};
use tracing::debug;

use crate::datastore::{Datastore, RecordType};
use crate::encrypted::{decrypt_value, encrypt_value};
use crate::error::StoreError;

pub struct ResourceKeyStore {
    datastore: Arc<dyn Datastore>,
    storage_key: SymmetricKey,
}

impl ResourceKeyStore {
    pub fn new(datastore: Arc<dyn Datastore>, storage_key: SymmetricKey) -> Self {
        Self {
            datastore,
            storage_key,
        }
    }

    pub async fn put_key(
        &self,
        resource_id: SimpleResourceId,
        key: SymmetricKey,
    ) -> Result<(), StoreError> {
        debug!(resource_id = %resource_id, "storing resource key");
        let encrypted = encrypt_value(&self.storage_key, key.as_ref())?;
        self.datastore
            .put(RecordType::ResourceKey, resource_id.as_ref(), encrypted)
            .await
    }

    pub async fn find_key(
        &self,
        resource_id: &SimpleResourceId,
    ) -> Result<Option<SymmetricKey>, StoreError> {
        match self
            .datastore
            .get(RecordType::ResourceKey, resource_id.as_ref())
            .await?
        {
            None => Ok(None),
            Some(stored) => {
                let clear = decrypt_value(&self.storage_key, &stored)?;
                Ok(Some(SymmetricKey::from_slice(&clear)?))
            }
        }
    }
}
