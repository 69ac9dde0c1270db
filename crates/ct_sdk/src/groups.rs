//! The group state machine and accessor.
//!
//! A group chain is one creation followed by additions. Applying it with
//! the local user's keys yields an internal view (we hold the private
//! keys) or an external one; an addition that seals the group key to one
//! of our keys upgrades external to internal.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::error;

use ct_crypto::{
    seal_decrypt, EncryptionKeyPair, PrivateEncryptionKey, PublicEncryptionKey,
    SignatureKeyPair,
};
use ct_proto::actions::{GroupMember, GroupProvisionalMember, Payload};
use ct_proto::group::{ExternalGroup, Group, InternalGroup};
use ct_proto::user::Device;
use ct_proto::verif;
use ct_proto::{Action, DeviceId, GroupId};

use crate::coalescer::TaskCoalescer;
use crate::error::{Error, ErrorKind, Result};
use crate::local_user::LocalUser;
use crate::provisional::ProvisionalUsersAccessor;
use crate::transport::Backend;
use crate::users::UserAccessor;

/// Try to recover the group private encryption key from a v2 member list.
fn decrypt_my_member_key(
    local_user: &LocalUser,
    members: &[GroupMember],
) -> Result<Option<PrivateEncryptionKey>> {
    for member in members {
        if member.user_id != local_user.user_id {
            continue;
        }
        let user_key_pair = local_user
            .find_user_key_pair(&member.public_user_encryption_key)
            .ok_or_else(|| {
                Error::internal("group block lists our user id but not our user key")
            })?;
        let private_key = seal_decrypt(
            member.sealed_private_group_encryption_key.as_ref(),
            user_key_pair,
        )?;
        return Ok(Some(PrivateEncryptionKey::from_slice(&private_key)?));
    }
    Ok(None)
}

/// Try to recover the group private key from claimed provisional halves.
async fn decrypt_my_provisional_key(
    provisional_users: &ProvisionalUsersAccessor,
    members: &[GroupProvisionalMember],
) -> Result<Option<PrivateEncryptionKey>> {
    for member in members {
        let Some(keys) = provisional_users
            .find_encryption_keys(
                &member.app_public_signature_key,
                &member.service_public_signature_key,
            )
            .await?
        else {
            continue;
        };
        let once = seal_decrypt(
            member.sealed_private_group_encryption_key.as_ref(),
            &keys.service_encryption_key_pair,
        )?;
        let clear = seal_decrypt(&once, &keys.app_encryption_key_pair)?;
        return Ok(Some(PrivateEncryptionKey::from_slice(&clear)?));
    }
    Ok(None)
}

fn make_internal_group(
    group_public_keys: (ct_crypto::PublicSignatureKey, PublicEncryptionKey),
    sealed_private_signature_key: &ct_crypto::SealedPrivateSignatureKey,
    group_private_encryption_key: PrivateEncryptionKey,
    last_block_hash: ct_crypto::Hash,
    last_key_rotation_block_hash: ct_crypto::Hash,
) -> Result<InternalGroup> {
    let encryption_key_pair = EncryptionKeyPair {
        public_key: group_public_keys.1,
        private_key: group_private_encryption_key,
    };
    let private_signature_key = seal_decrypt(
        sealed_private_signature_key.as_ref(),
        &encryption_key_pair,
    )?;
    Ok(InternalGroup {
        id: GroupId::from(group_public_keys.0),
        signature_key_pair: SignatureKeyPair {
            public_key: group_public_keys.0,
            private_key: ct_crypto::PrivateSignatureKey::from_slice(&private_signature_key)?,
        },
        encryption_key_pair,
        last_block_hash,
        last_key_rotation_block_hash,
    })
}

/// Apply one verified group chain in order. Invalid blocks are logged and
/// skipped; the chain result is whatever the valid prefix produced.
pub async fn apply_group_actions(
    local_user: &LocalUser,
    provisional_users: &ProvisionalUsersAccessor,
    author_devices: &HashMap<DeviceId, Device>,
    mut group: Option<Group>,
    actions: &[Action],
) -> Result<Option<Group>> {
    for action in actions {
        match apply_group_action(local_user, provisional_users, author_devices, group.clone(), action)
            .await
        {
            Ok(applied) => group = applied,
            Err(error) if error.kind == ErrorKind::InvalidArgument => {
                error!(action_hash = %action.hash(), "skipping invalid group block: {error}");
            }
            Err(error) => return Err(error),
        }
    }
    Ok(group)
}

async fn apply_group_action(
    local_user: &LocalUser,
    provisional_users: &ProvisionalUsersAccessor,
    author_devices: &HashMap<DeviceId, Device>,
    group: Option<Group>,
    action: &Action,
) -> Result<Option<Group>> {
    let author_device = author_devices
        .get(&DeviceId::from(action.author))
        .ok_or_else(|| Error::invalid_argument("group block author not found"))?;

    match &action.payload {
        Payload::UserGroupCreation1(creation) => {
            verif::verify_user_group_creation(action, author_device, group.as_ref())
                .map_err(verif_to_invalid)?;
            // v1 members carry no user id; match by public user key.
            let mut private_key = None;
            for (public_user_key, sealed_key) in &creation.sealed_private_encryption_keys_for_users
            {
                if let Some(user_key_pair) = local_user.find_user_key_pair(public_user_key) {
                    let clear = seal_decrypt(sealed_key.as_ref(), user_key_pair)?;
                    private_key = Some(PrivateEncryptionKey::from_slice(&clear)?);
                    break;
                }
            }
            Ok(Some(build_group(
                (creation.public_signature_key, creation.public_encryption_key),
                &creation.sealed_private_signature_key,
                private_key,
                action.hash(),
            )?))
        }
        Payload::UserGroupCreation2(creation) => {
            verif::verify_user_group_creation(action, author_device, group.as_ref())
                .map_err(verif_to_invalid)?;
            let mut private_key = decrypt_my_member_key(local_user, &creation.members)?;
            if private_key.is_none() {
                private_key =
                    decrypt_my_provisional_key(provisional_users, &creation.provisional_members)
                        .await?;
            }
            Ok(Some(build_group(
                (creation.public_signature_key, creation.public_encryption_key),
                &creation.sealed_private_signature_key,
                private_key,
                action.hash(),
            )?))
        }
        Payload::UserGroupAddition1(addition) => {
            verif::verify_user_group_addition(action, author_device, group.as_ref())
                .map_err(verif_to_invalid)?;
            let mut group = group.expect("verified additions have a previous group");
            group.set_last_block_hash(action.hash());
            let Group::External(external) = &group else {
                // Already a member; the addition only advances the chain.
                return Ok(Some(group));
            };
            let mut private_key = None;
            for (public_user_key, sealed_key) in &addition.sealed_private_encryption_keys_for_users
            {
                if let Some(user_key_pair) = local_user.find_user_key_pair(public_user_key) {
                    let clear = seal_decrypt(sealed_key.as_ref(), user_key_pair)?;
                    private_key = Some(PrivateEncryptionKey::from_slice(&clear)?);
                    break;
                }
            }
            upgrade_if_member(external.clone(), private_key)
        }
        Payload::UserGroupAddition2(addition) => {
            verif::verify_user_group_addition(action, author_device, group.as_ref())
                .map_err(verif_to_invalid)?;
            let mut group = group.expect("verified additions have a previous group");
            group.set_last_block_hash(action.hash());
            let Group::External(external) = &group else {
                return Ok(Some(group));
            };
            let mut private_key = decrypt_my_member_key(local_user, &addition.members)?;
            if private_key.is_none() {
                private_key =
                    decrypt_my_provisional_key(provisional_users, &addition.provisional_members)
                        .await?;
            }
            upgrade_if_member(external.clone(), private_key)
        }
        _ => Err(Error::invalid_argument(
            "unexpected nature in a group history",
        )),
    }
}

fn build_group(
    group_public_keys: (ct_crypto::PublicSignatureKey, PublicEncryptionKey),
    sealed_private_signature_key: &ct_crypto::SealedPrivateSignatureKey,
    private_key: Option<PrivateEncryptionKey>,
    block_hash: ct_crypto::Hash,
) -> Result<Group> {
    match private_key {
        Some(private_key) => Ok(Group::Internal(make_internal_group(
            group_public_keys,
            sealed_private_signature_key,
            private_key,
            block_hash,
            block_hash,
        )?)),
        None => Ok(Group::External(ExternalGroup {
            id: GroupId::from(group_public_keys.0),
            public_signature_key: group_public_keys.0,
            sealed_private_signature_key: *sealed_private_signature_key,
            public_encryption_key: group_public_keys.1,
            last_block_hash: block_hash,
            last_key_rotation_block_hash: block_hash,
        })),
    }
}

fn upgrade_if_member(
    external: ExternalGroup,
    private_key: Option<PrivateEncryptionKey>,
) -> Result<Option<Group>> {
    match private_key {
        None => Ok(Some(Group::External(external))),
        Some(private_key) => Ok(Some(Group::Internal(make_internal_group(
            (external.public_signature_key, external.public_encryption_key),
            &external.sealed_private_signature_key,
            private_key,
            external.last_block_hash,
            external.last_key_rotation_block_hash,
        )?))),
    }
}

fn verif_to_invalid(error: verif::VerifError) -> Error {
    Error::invalid_argument(error.to_string())
}

/// Cached, coalesced access to groups.
pub struct GroupAccessor {
    backend: Arc<dyn Backend>,
    store: Arc<ct_store::GroupStore>,
    users: Arc<UserAccessor>,
    provisional_users: Arc<ProvisionalUsersAccessor>,
    key_coalescer: TaskCoalescer<GroupId, PublicEncryptionKey>,
}

/// Pull result for group public keys.
#[derive(Debug, Default)]
pub struct GroupKeysResult {
    pub found: Vec<PublicEncryptionKey>,
    pub not_found: Vec<GroupId>,
}

impl GroupAccessor {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<ct_store::GroupStore>,
        users: Arc<UserAccessor>,
        provisional_users: Arc<ProvisionalUsersAccessor>,
    ) -> Self {
        Self {
            backend,
            store,
            users,
            provisional_users,
            key_coalescer: TaskCoalescer::new(),
        }
    }

    /// Persist a group view built locally (group creation/addition paths).
    pub async fn store_put(&self, group: &Group) -> Result<()> {
        Ok(self.store.put(group).await?)
    }

    /// Fetch and fold a group chain, persisting the derived view.
    pub async fn fetch_group(
        &self,
        local_user: &LocalUser,
        group_id: &GroupId,
    ) -> Result<Option<Group>> {
        let actions = self.backend.get_group_blocks(&[*group_id]).await?;
        self.apply_and_store(local_user, &actions).await
    }

    async fn apply_and_store(
        &self,
        local_user: &LocalUser,
        actions: &[Action],
    ) -> Result<Option<Group>> {
        if actions.is_empty() {
            return Ok(None);
        }
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
        let group = apply_group_actions(
            local_user,
            &self.provisional_users,
            &author_devices,
            None,
            actions,
        )
        .await?;
        if let Some(group) = &group {
            self.store.put(group).await?;
        }
        Ok(group)
    }

    /// Current group view: local store first, then the server.
    pub async fn get_group(
        &self,
        local_user: &LocalUser,
        group_id: &GroupId,
    ) -> Result<Option<Group>> {
        if let Some(group) = self.store.find_by_id(group_id).await? {
            return Ok(Some(group));
        }
        self.fetch_group(local_user, group_id).await
    }

    /// Public encryption keys for sharing, coalesced across callers.
    pub async fn get_public_encryption_keys(
        &self,
        local_user: &LocalUser,
        group_ids: &[GroupId],
    ) -> Result<GroupKeysResult> {
        // The coalescer deduplicates the fetches; the result set is then
        // rebuilt from the store so keys can be matched back to their ids.
        self.key_coalescer
            .run(
                |missing: Vec<GroupId>| async move {
                    let mut resolved = Vec::with_capacity(missing.len());
                    for group_id in missing {
                        if let Some(group) = self.get_group(local_user, &group_id).await? {
                            resolved.push((group_id, group.public_encryption_key()));
                        }
                    }
                    Ok(resolved)
                },
                group_ids,
            )
            .await?;

        let mut result = GroupKeysResult::default();
        for group_id in group_ids {
            match self.store.find_by_id(group_id).await? {
                Some(group) => result.found.push(group.public_encryption_key()),
                None => result.not_found.push(*group_id),
            }
        }
        Ok(result)
    }

    /// The group key pair for a public key: archived locally, or derived
    /// by fetching the owning group's chain.
    pub async fn get_encryption_key_pair(
        &self,
        local_user: &LocalUser,
        public_encryption_key: &PublicEncryptionKey,
    ) -> Result<Option<EncryptionKeyPair>> {
        if let Some(key_pair) = self.store.find_key_pair(public_encryption_key).await? {
            return Ok(Some(key_pair));
        }
        let actions = self
            .backend
            .get_group_blocks_by_public_key(&[*public_encryption_key])
            .await?;
        match self.apply_and_store(local_user, &actions).await? {
            Some(Group::Internal(internal)) => Ok(Some(internal.encryption_key_pair)),
            _ => Ok(self.store.find_key_pair(public_encryption_key).await?),
        }
    }
}
