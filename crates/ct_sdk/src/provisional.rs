//! Provisional users: sharing targets that have not registered yet.

use std::sync::Arc;

use ct_crypto::{PublicEncryptionKey, PublicSignatureKey};
use ct_store::{ProvisionalUserKeys, ProvisionalUserKeysStore};

use crate::error::Result;
use crate::identity::SecretProvisionalIdentity;
use crate::transport::ServiceProvisionalKeys;

/// Public halves of a provisional identity, enough to share with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionalUser {
    pub app_public_signature_key: PublicSignatureKey,
    pub app_public_encryption_key: PublicEncryptionKey,
    pub service_public_signature_key: PublicSignatureKey,
    pub service_public_encryption_key: PublicEncryptionKey,
}

/// Claimed provisional key pairs, backed by the encrypted local store.
pub struct ProvisionalUsersAccessor {
    store: Arc<ProvisionalUserKeysStore>,
}

impl ProvisionalUsersAccessor {
    pub fn new(store: Arc<ProvisionalUserKeysStore>) -> Self {
        Self { store }
    }

    pub async fn find_encryption_keys(
        &self,
        app_public_signature_key: &PublicSignatureKey,
        service_public_signature_key: &PublicSignatureKey,
    ) -> Result<Option<ProvisionalUserKeys>> {
        Ok(self
            .store
            .find(app_public_signature_key, service_public_signature_key)
            .await?)
    }

    /// Record key pairs recovered from an existing claim block.
    pub async fn put_keys(
        &self,
        app_public_signature_key: &PublicSignatureKey,
        service_public_signature_key: &PublicSignatureKey,
        keys: &ProvisionalUserKeys,
    ) -> Result<()> {
        self.store
            .put(app_public_signature_key, service_public_signature_key, keys)
            .await?;
        Ok(())
    }

    /// Record a freshly claimed identity's key pairs.
    pub async fn put_claimed(
        &self,
        identity: &SecretProvisionalIdentity,
        service_keys: &ServiceProvisionalKeys,
    ) -> Result<()> {
        self.store
            .put(
                &identity.app_signature_key_pair.public_key,
                &service_keys.signature_key_pair.public_key,
                &ProvisionalUserKeys {
                    app_encryption_key_pair: identity.app_encryption_key_pair,
                    service_encryption_key_pair: service_keys.encryption_key_pair,
                },
            )
            .await?;
        Ok(())
    }
}
