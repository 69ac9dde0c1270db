//! Resource-key lookup contract for decryption.

use async_trait::async_trait;
use ct_crypto::{ResourceId, SymmetricKey};

/// Resolves a resource id to its symmetric key. `Ok(None)` means the id is
/// simply unknown; decryption then fails with `DecryptionFailed`. An `Err`
/// is an infrastructure failure and propagates as-is.
#[async_trait]
pub trait ResourceKeyFinder: Send + Sync {
    async fn find_resource_key(
        &self,
        resource_id: ResourceId,
    ) -> anyhow::Result<Option<SymmetricKey>>;
}

/// A finder that always answers with the same key, for callers that manage
/// keys themselves.
pub struct FixedKeyFinder(pub SymmetricKey);

#[async_trait]
impl ResourceKeyFinder for FixedKeyFinder {
    async fn find_resource_key(
        &self,
        _resource_id: ResourceId,
    ) -> anyhow::Result<Option<SymmetricKey>> {
        Ok(Some(self.0))
    }
}
