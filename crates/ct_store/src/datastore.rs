//! Key-value persistence contract.
//!
//! Records are grouped by a one-byte namespace prefix; values reaching the
//! backend are already encrypted under the user secret. The backend is an
//! external collaborator; the in-memory implementation here is what tests
//! and short-lived sessions use.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Record namespaces. The prefix byte keys the backend's flat keyspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    DeviceData = 1,
    ResourceKey = 2,
    Group = 3,
    /// Secondary index: group key pairs by public encryption key.
    GroupKeyPair = 4,
    ProvisionalUserKeys = 5,
}

#[async_trait]
pub trait Datastore: Send + Sync {
    async fn put(
        &self,
        record_type: RecordType,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<(), StoreError>;

    async fn get(
        &self,
        record_type: RecordType,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// Wipe everything. Used by the nuke path on unrecoverable device
    /// errors.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Volatile backend.
#[derive(Default)]
pub struct MemoryDatastore {
    records: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn record_key(record_type: RecordType, key: &[u8]) -> Vec<u8> {
    let mut namespaced = Vec::with_capacity(1 + key.len());
    namespaced.push(record_type as u8);
    namespaced.extend_from_slice(key);
    namespaced
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn put(
        &self,
        record_type: RecordType,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record_key(record_type, key), value);
        Ok(())
    }

    async fn get(
        &self,
        record_type: RecordType,
        key: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(&record_key(record_type, key))
            .cloned())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.records.write().await.clear();
        Ok(())
    }
}
