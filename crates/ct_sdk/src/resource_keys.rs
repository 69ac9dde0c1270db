//! The key-resolution pipeline.
//!
//! Resolving a resource id to its symmetric key: local cache, then a
//! coalesced fetch of key-publish actions, each verified and opened with
//! the matching user, group, or provisional key.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use ct_crypto::{seal_decrypt, ResourceId, SimpleResourceId, SymmetricKey};
use ct_encryptor::derive_subkey;
use ct_proto::actions::Payload;
use ct_proto::verif;
use ct_proto::{Action, DeviceId};

use crate::coalescer::TaskCoalescer;
use crate::error::{Error, ErrorKind, Result};
use crate::groups::GroupAccessor;
use crate::local_user::LocalUser;
use crate::provisional::ProvisionalUsersAccessor;
use crate::transport::Backend;
use crate::users::UserAccessor;

pub struct ResourceKeyAccessor {
    backend: Arc<dyn Backend>,
    store: Arc<ct_store::ResourceKeyStore>,
    users: Arc<UserAccessor>,
    groups: Arc<GroupAccessor>,
    provisional_users: Arc<ProvisionalUsersAccessor>,
    coalescer: TaskCoalescer<SimpleResourceId, SymmetricKey>,
}

impl ResourceKeyAccessor {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<ct_store::ResourceKeyStore>,
        users: Arc<UserAccessor>,
        groups: Arc<GroupAccessor>,
        provisional_users: Arc<ProvisionalUsersAccessor>,
    ) -> Self {
        Self {
            backend,
            store,
            users,
            groups,
            provisional_users,
            coalescer: TaskCoalescer::new(),
        }
    }

    /// Seed the cache directly (used right after encrypting).
    pub async fn store_put(
        &self,
        resource_id: SimpleResourceId,
        key: SymmetricKey,
    ) -> Result<()> {
        Ok(self.store.put_key(resource_id, key).await?)
    }

    /// Resolve a resource id to its symmetric key, or `None` if no key
    /// publish addresses us.
    pub async fn find_key(
        &self,
        local_user: &LocalUser,
        resource_id: &ResourceId,
    ) -> Result<Option<SymmetricKey>> {
        match resource_id {
            ResourceId::Simple(id) => self.lookup(local_user, id).await,
            ResourceId::Composite(composite) => {
                // Session key first: one publish unlocks every derived
                // resource. Fall back to a directly published subkey.
                if let Some(session_key) = self.lookup(local_user, &composite.session_id()).await? {
                    return Ok(Some(derive_subkey(&session_key, &composite.subkey_seed())));
                }
                self.lookup(local_user, &composite.individual_resource_id())
                    .await
            }
        }
    }

    async fn lookup(
        &self,
        local_user: &LocalUser,
        resource_id: &SimpleResourceId,
    ) -> Result<Option<SymmetricKey>> {
        if let Some(key) = self.store.find_key(resource_id).await? {
            return Ok(Some(key));
        }
        let keys = self
            .coalescer
            .run(
                |missing: Vec<SimpleResourceId>| async move {
                    self.fetch_keys(local_user, &missing).await
                },
                &[*resource_id],
            )
            .await?;
        Ok(keys.into_iter().next())
    }

    /// Fetch, verify and open key publishes for the missing ids.
    async fn fetch_keys(
        &self,
        local_user: &LocalUser,
        resource_ids: &[SimpleResourceId],
    ) -> Result<Vec<(SimpleResourceId, SymmetricKey)>> {
        let actions = self.backend.get_resource_keys(resource_ids).await?;

        let author_ids: Vec<DeviceId> = {
            let mut ids: Vec<DeviceId> = actions
                .iter()
                .map(|action| DeviceId::from(action.author))
                .collect();
            ids.sort();
            ids.dedup();
            ids
        };
        let author_devices = self.users.pull_devices(&author_ids).await?;

        let mut resolved = Vec::new();
        for action in &actions {
            let Some(author_device) = author_devices.get(&DeviceId::from(action.author)) else {
                error!(action_hash = %action.hash(), "skipping key publish: author not found");
                continue;
            };
            if let Err(verif_error) = verif::verify_key_publish(action, author_device) {
                error!(action_hash = %action.hash(), "skipping invalid key publish: {verif_error}");
                continue;
            }
            match self.open_key_publish(local_user, action).await {
                Ok((resource_id, key)) => {
                    self.store.put_key(resource_id, key).await?;
                    resolved.push((resource_id, key));
                }
                Err(error) if error.kind == ErrorKind::DecryptionFailed => {
                    // Fatal for this resource only.
                    error!(action_hash = %action.hash(), "could not open key publish: {error}");
                }
                Err(error) => return Err(error),
            }
        }
        Ok(resolved)
    }

    async fn open_key_publish(
        &self,
        local_user: &LocalUser,
        action: &Action,
    ) -> Result<(SimpleResourceId, SymmetricKey)> {
        match &action.payload {
            Payload::KeyPublishToUser(publish) => {
                // We should never receive a publish we cannot open.
                let user_key_pair = local_user
                    .find_user_key_pair(&publish.recipient_public_encryption_key)
                    .ok_or_else(|| {
                        Error::internal(format!(
                            "received a key publish for an unknown user key {}",
                            publish.recipient_public_encryption_key
                        ))
                    })?;
                let key = seal_decrypt(publish.sealed_symmetric_key.as_ref(), user_key_pair)?;
                Ok((publish.resource_id, SymmetricKey::from_slice(&key)?))
            }
            Payload::KeyPublishToUserGroup(publish) => {
                let key_pair = self
                    .groups
                    .get_encryption_key_pair(local_user, &publish.recipient_public_encryption_key)
                    .await?
                    .ok_or_else(|| {
                        Error::internal(format!(
                            "received a key publish for a group we are not in ({})",
                            publish.recipient_public_encryption_key
                        ))
                    })?;
                let key = seal_decrypt(publish.sealed_symmetric_key.as_ref(), &key_pair)?;
                Ok((publish.resource_id, SymmetricKey::from_slice(&key)?))
            }
            Payload::KeyPublishToProvisionalUser(publish) => {
                let keys = self
                    .provisional_users
                    .find_encryption_keys(
                        &publish.app_public_signature_key,
                        &publish.service_public_signature_key,
                    )
                    .await?
                    .ok_or_else(|| {
                        Error::internal(
                            "received a key publish for a provisional identity we did not claim",
                        )
                    })?;
                // Service half seals the app-sealed key.
                let once = seal_decrypt(
                    publish.two_times_sealed_symmetric_key.as_ref(),
                    &keys.service_encryption_key_pair,
                )?;
                let key = seal_decrypt(&once, &keys.app_encryption_key_pair)?;
                Ok((publish.resource_id, SymmetricKey::from_slice(&key)?))
            }
            Payload::KeyPublishToDevice(_) => Err(Error::new(
                ErrorKind::DecryptionFailed,
                "legacy device key publishes are not decryptable",
            )),
            _ => Err(Error::internal("not a key publish")),
        }
    }
}

/// Adapter exposing the accessor as the encryptor's key finder.
pub struct AccessorKeyFinder<'a> {
    pub accessor: &'a ResourceKeyAccessor,
    pub local_user: &'a LocalUser,
}

#[async_trait]
impl ct_encryptor::ResourceKeyFinder for AccessorKeyFinder<'_> {
    async fn find_resource_key(
        &self,
        resource_id: ResourceId,
    ) -> anyhow::Result<Option<SymmetricKey>> {
        self.accessor
            .find_key(self.local_user, &resource_id)
            .await
            .map_err(anyhow::Error::new)
    }
}
