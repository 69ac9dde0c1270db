//! Session orchestration: the public surface of the SDK.
//!
//! A session owns the store, the caches and the transport; every public
//! operation runs inside the session's cancellation scope. Stop cancels
//! in-flight work and closes; unrecoverable server answers wipe the local
//! store first (nuke). Those two teardowns never interleave.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use ct_crypto::{Padding, ResourceId, SimpleResourceId, SymmetricKey};
use ct_encryptor::stream::InputSource;
use ct_proto::group::Group;
use ct_proto::{GroupId, UserId};
use ct_store::{Datastore, DeviceStore, GroupStore, ProvisionalUserKeysStore, ResourceKeyStore};

use crate::block_generator::{make_delegation, make_device_creation, BlockGenerator};
use crate::encryption_session::EncryptionSession;
use crate::error::{Error, ErrorKind, Result};
use crate::groups::GroupAccessor;
use crate::identity::{
    parse_public_identity, parse_secret_identity, PublicIdentityTarget, SecretIdentity,
    SecretProvisionalIdentity,
};
use crate::local_user::LocalUser;
use crate::provisional::{ProvisionalUser, ProvisionalUsersAccessor};
use crate::resource_keys::{AccessorKeyFinder, ResourceKeyAccessor};
use crate::share::{generate_share_actions, KeyRecipients};
use crate::transport::{is_unrecoverable_code, Backend, UserRegistration};
use crate::users::{process_user_actions, recover_user_key_history, UserAccessor};
use crate::verification::{
    decrypt_verification_key, encrypt_verification_key, GhostDevice, Verification,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    IdentityRegistrationNeeded,
    IdentityVerificationNeeded,
    Ready,
    Stopped,
}

/// Recipients of an encrypt/share call, as identity strings and group ids.
#[derive(Debug, Clone, Default)]
pub struct SharingOptions {
    pub share_with_users: Vec<String>,
    pub share_with_groups: Vec<GroupId>,
}

#[derive(Debug, Clone, Default)]
pub struct EncryptionOptions {
    pub sharing: SharingOptions,
    pub padding: Padding,
}

/// Result of attaching a provisional identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachResult {
    pub status: Status,
    /// The email or phone number to verify, when verification is needed.
    pub verification_target: Option<String>,
}

struct Core {
    local_user: LocalUser,
    generator: BlockGenerator,
    users: Arc<UserAccessor>,
    groups: Arc<GroupAccessor>,
    provisional_users: Arc<ProvisionalUsersAccessor>,
    resource_keys: Arc<ResourceKeyAccessor>,
    attached_provisional: Mutex<Option<SecretProvisionalIdentity>>,
}

pub struct Session {
    identity: SecretIdentity,
    backend: Arc<dyn Backend>,
    datastore: Arc<dyn Datastore>,
    storage_key: SymmetricKey,
    /// The root action's public key, learned from the server at start.
    trustchain_public_key: Option<ct_crypto::PublicSignatureKey>,
    status: Status,
    core: Option<Arc<Core>>,
    cancellation: CancellationToken,
    /// Serializes stop and nuke; neither runs inside the cancel scope.
    teardown: Mutex<()>,
}

impl Session {
    /// Open the local store and decide how far this identity already got.
    pub async fn start(
        identity: &str,
        backend: Arc<dyn Backend>,
        datastore: Arc<dyn Datastore>,
    ) -> Result<Self> {
        let identity = parse_secret_identity(identity)?;
        let storage_key = ct_store::storage_key_from_user_secret(&identity.user_secret);
        let mut session = Self {
            identity,
            backend,
            datastore,
            storage_key,
            trustchain_public_key: None,
            status: Status::Stopped,
            core: None,
            cancellation: CancellationToken::new(),
            teardown: Mutex::new(()),
        };

        let device_store = session.device_store();
        if let Some(device_data) = device_store.load().await? {
            session.install_core(LocalUser::from_device_data(
                session.identity.user_id,
                &device_data,
            ));
            session.status = Status::Ready;
            return Ok(session);
        }

        // No local device: the server knows whether the user exists.
        let actions = session
            .backend
            .get_users(&[session.identity.user_id])
            .await?;
        let processed = process_user_actions(&session.identity.trustchain_id, None, &actions)?;
        session.trustchain_public_key = processed.trustchain_public_key;
        session.status = if processed.users.contains_key(&session.identity.user_id) {
            Status::IdentityVerificationNeeded
        } else {
            Status::IdentityRegistrationNeeded
        };
        Ok(session)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    fn device_store(&self) -> DeviceStore {
        DeviceStore::new(self.datastore.clone(), self.storage_key)
    }

    fn trustchain_public_key(&self) -> Result<ct_crypto::PublicSignatureKey> {
        self.trustchain_public_key
            .ok_or_else(|| Error::internal("the trustchain root has not been seen yet"))
    }

    fn verification_key_cipher(&self) -> SymmetricKey {
        // The verification key is escrowed under the raw user secret, not
        // the derived storage key: holders of the identity alone can
        // recover it.
        SymmetricKey::new(self.identity.user_secret)
    }

    fn install_core(&mut self, local_user: LocalUser) {
        let users = Arc::new(UserAccessor::new(
            self.backend.clone(),
            self.identity.trustchain_id,
        ));
        let provisional_users = Arc::new(ProvisionalUsersAccessor::new(Arc::new(
            ProvisionalUserKeysStore::new(self.datastore.clone(), self.storage_key),
        )));
        let groups = Arc::new(GroupAccessor::new(
            self.backend.clone(),
            Arc::new(GroupStore::new(self.datastore.clone(), self.storage_key)),
            users.clone(),
            provisional_users.clone(),
        ));
        let resource_keys = Arc::new(ResourceKeyAccessor::new(
            self.backend.clone(),
            Arc::new(ResourceKeyStore::new(self.datastore.clone(), self.storage_key)),
            users.clone(),
            groups.clone(),
            provisional_users.clone(),
        ));
        let generator = BlockGenerator::new(
            self.identity.trustchain_id,
            local_user.device_id,
            local_user.device_signature_key_pair,
        );
        self.core = Some(Arc::new(Core {
            local_user,
            generator,
            users,
            groups,
            provisional_users,
            resource_keys,
            attached_provisional: Mutex::new(None),
        }));
    }

    fn core(&self) -> Result<&Arc<Core>> {
        match (&self.core, self.status) {
            (Some(core), Status::Ready) => Ok(core),
            _ => Err(Error::new(
                ErrorKind::PreconditionFailed,
                "session is not ready",
            )),
        }
    }

    /// Run an operation inside the session's cancellation scope.
    async fn cancellable<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            _ = self.cancellation.cancelled() => Err(Error::new(
                ErrorKind::OperationCanceled,
                "the session was stopped",
            )),
            result = operation => match result {
                Err(error) if error.server_code.as_deref().is_some_and(is_unrecoverable_code) => {
                    self.nuke().await?;
                    Err(error)
                }
                other => other,
            },
        }
    }

    // ── Identity lifecycle ───────────────────────────────────────────────

    pub async fn register_identity(&mut self, verification: &Verification) -> Result<()> {
        if self.status != Status::IdentityRegistrationNeeded {
            return Err(Error::new(
                ErrorKind::PreconditionFailed,
                "identity registration is not needed",
            ));
        }

        let ghost = match verification {
            Verification::VerificationKey(key) => GhostDevice::from_verification_key(key)?,
            _ => GhostDevice::generate(),
        };
        let user_key_pair = ct_crypto::make_encryption_key_pair();
        let device_signature_key_pair = ct_crypto::make_signature_key_pair();
        let device_encryption_key_pair = ct_crypto::make_encryption_key_pair();

        // Ghost device: root-delegated through the identity's delegation.
        let ghost_creation = make_device_creation(
            self.identity.trustchain_id,
            self.identity.trustchain_id.into(),
            &self.identity.delegation,
            self.identity.user_id,
            &ghost.signature_key_pair,
            &ghost.encryption_key_pair,
            &user_key_pair,
            true,
        )?;
        let ghost_device_id = ct_proto::DeviceId::from(ghost_creation.hash());

        // First real device, signed into the chain by the ghost.
        let delegation = make_delegation(
            &self.identity.user_id,
            &ghost.signature_key_pair.private_key,
        );
        let first_device_creation = make_device_creation(
            self.identity.trustchain_id,
            ghost_device_id.into(),
            &delegation,
            self.identity.user_id,
            &device_signature_key_pair,
            &device_encryption_key_pair,
            &user_key_pair,
            false,
        )?;
        let device_id = ct_proto::DeviceId::from(first_device_creation.hash());

        let encrypted_verification_key = encrypt_verification_key(
            &self.verification_key_cipher(),
            &ghost.to_verification_key(),
        )?;
        self.backend
            .create_user(UserRegistration {
                user_id: self.identity.user_id,
                ghost_device_creation: ghost_creation,
                first_device_creation,
                encrypted_verification_key,
                verification: verification.to_request(),
            })
            .await?;

        let local_user = LocalUser {
            user_id: self.identity.user_id,
            device_id,
            trustchain_public_signature_key: self.trustchain_public_key()?,
            device_signature_key_pair,
            device_encryption_key_pair,
            user_key_pairs: vec![user_key_pair],
        };
        self.persist_and_ready(local_user).await
    }

    pub async fn verify_identity(&mut self, verification: &Verification) -> Result<()> {
        if self.status != Status::IdentityVerificationNeeded {
            return Err(Error::new(
                ErrorKind::PreconditionFailed,
                "identity verification is not needed",
            ));
        }

        let verification_key = match verification {
            Verification::VerificationKey(key) => key.clone(),
            _ => {
                let encrypted = self
                    .backend
                    .get_verification_key(&self.identity.user_id, &verification.to_request())
                    .await?;
                decrypt_verification_key(&self.verification_key_cipher(), &encrypted)?
            }
        };
        let ghost = GhostDevice::from_verification_key(&verification_key)?;

        // Locate the ghost device in our chain and recover the user keys
        // it can open.
        let actions = self.backend.get_users(&[self.identity.user_id]).await?;
        let processed = process_user_actions(&self.identity.trustchain_id, None, &actions)?;
        if processed.trustchain_public_key.is_some() {
            self.trustchain_public_key = processed.trustchain_public_key;
        }
        let user = processed
            .users
            .get(&self.identity.user_id)
            .ok_or_else(|| Error::internal("our user is missing from its own history"))?;
        let ghost_device = user
            .devices
            .iter()
            .find(|device| device.public_signature_key == ghost.signature_key_pair.public_key)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidVerification,
                    "the verification key does not match any device",
                )
            })?;

        let ghost_local = LocalUser {
            user_id: self.identity.user_id,
            device_id: ghost_device.id,
            trustchain_public_signature_key: self.trustchain_public_key()?,
            device_signature_key_pair: ghost.signature_key_pair,
            device_encryption_key_pair: ghost.encryption_key_pair,
            user_key_pairs: Vec::new(),
        };
        let user_key_pairs = recover_user_key_history(&ghost_local, &actions)?;
        let current_user_key = *user_key_pairs
            .last()
            .ok_or_else(|| Error::internal("no user key recovered from the chain"))?;

        let device_signature_key_pair = ct_crypto::make_signature_key_pair();
        let device_encryption_key_pair = ct_crypto::make_encryption_key_pair();
        let delegation = make_delegation(
            &self.identity.user_id,
            &ghost.signature_key_pair.private_key,
        );
        let device_creation = make_device_creation(
            self.identity.trustchain_id,
            ghost_device.id.into(),
            &delegation,
            self.identity.user_id,
            &device_signature_key_pair,
            &device_encryption_key_pair,
            &current_user_key,
            false,
        )?;
        let device_id = ct_proto::DeviceId::from(device_creation.hash());
        self.backend.create_device(device_creation).await?;

        let local_user = LocalUser {
            user_id: self.identity.user_id,
            device_id,
            trustchain_public_signature_key: self.trustchain_public_key()?,
            device_signature_key_pair,
            device_encryption_key_pair,
            user_key_pairs,
        };
        self.persist_and_ready(local_user).await
    }

    async fn persist_and_ready(&mut self, local_user: LocalUser) -> Result<()> {
        self.device_store().save(&local_user.to_device_data()).await?;
        self.install_core(local_user);
        self.status = Status::Ready;
        Ok(())
    }

    // ── Encryption ───────────────────────────────────────────────────────

    pub async fn encrypt(&self, clear_data: &[u8], options: &EncryptionOptions) -> Result<Vec<u8>> {
        let core = self.core()?.clone();
        self.cancellable(async move {
            let session_id = SimpleResourceId::random();
            let session_key = ct_crypto::make_symmetric_key();
            let (encrypted, _) =
                ct_encryptor::encrypt(clear_data, options.padding, &session_id, &session_key)
                    .await?;

            core.resource_keys_store_put(session_id, session_key).await?;
            self.publish_keys(&core, &[(session_id, session_key)], &options.sharing, true)
                .await?;
            Ok(encrypted)
        })
        .await
    }

    pub async fn decrypt(&self, encrypted_data: &[u8]) -> Result<Vec<u8>> {
        let core = self.core()?.clone();
        self.cancellable(async move {
            let finder = AccessorKeyFinder {
                accessor: &core.resource_keys,
                local_user: &core.local_user,
            };
            Ok(ct_encryptor::decrypt(&finder, encrypted_data).await?)
        })
        .await
    }

    pub fn resource_id_of(&self, encrypted_data: &[u8]) -> Result<ResourceId> {
        Ok(ct_encryptor::extract_resource_id(encrypted_data)?)
    }

    pub async fn share(
        &self,
        resource_ids: &[ResourceId],
        sharing: &SharingOptions,
    ) -> Result<()> {
        let core = self.core()?.clone();
        self.cancellable(async move {
            let mut resource_keys = Vec::with_capacity(resource_ids.len());
            for resource_id in resource_ids {
                let pair = match resource_id {
                    ResourceId::Simple(id) => {
                        let key = core
                            .resource_keys
                            .find_key(&core.local_user, resource_id)
                            .await?;
                        key.map(|key| (*id, key))
                    }
                    ResourceId::Composite(composite) => {
                        // Prefer sharing the session itself; fall back to
                        // the derived per-resource subkey.
                        match core
                            .resource_keys
                            .find_key(&core.local_user, &composite.session_id().into())
                            .await?
                        {
                            Some(session_key) => Some((composite.session_id(), session_key)),
                            None => core
                                .resource_keys
                                .find_key(&core.local_user, resource_id)
                                .await?
                                .map(|subkey| (composite.individual_resource_id(), subkey)),
                        }
                    }
                };
                let (id, key) = pair.ok_or_else(|| {
                    Error::invalid_argument(format!("resource key not found for {resource_id}"))
                })?;
                resource_keys.push((id, key));
            }
            self.publish_keys(&core, &resource_keys, sharing, false).await
        })
        .await
    }

    /// Resolve recipients and post the key publishes as one transaction.
    async fn publish_keys(
        &self,
        core: &Core,
        resource_keys: &[(SimpleResourceId, SymmetricKey)],
        sharing: &SharingOptions,
        include_self: bool,
    ) -> Result<()> {
        let recipients = self.resolve_recipients(core, sharing, include_self).await?;
        if recipients.is_empty() {
            return Ok(());
        }
        let actions = generate_share_actions(&core.generator, resource_keys, &recipients)?;
        self.backend.post_resource_keys(actions).await
    }

    async fn resolve_recipients(
        &self,
        core: &Core,
        sharing: &SharingOptions,
        include_self: bool,
    ) -> Result<KeyRecipients> {
        let mut recipients = KeyRecipients::default();

        let mut user_ids: Vec<UserId> = Vec::new();
        let mut provisional_targets: Vec<(String, SecretProvisionalPublicHalves)> = Vec::new();
        for identity in &sharing.share_with_users {
            let public_identity = parse_public_identity(identity)?;
            if public_identity.trustchain_id != self.identity.trustchain_id {
                return Err(Error::invalid_argument(
                    "recipient identity belongs to another trustchain",
                ));
            }
            match public_identity.target {
                PublicIdentityTarget::User => {
                    let user_id = decode_user_id(&public_identity.value)?;
                    if !user_ids.contains(&user_id) {
                        user_ids.push(user_id);
                    }
                }
                _ => {
                    let halves = SecretProvisionalPublicHalves {
                        app_public_signature_key: public_identity
                            .public_signature_key
                            .ok_or_else(|| {
                                Error::invalid_argument("provisional identity without public keys")
                            })?,
                        app_public_encryption_key: public_identity
                            .public_encryption_key
                            .ok_or_else(|| {
                                Error::invalid_argument("provisional identity without public keys")
                            })?,
                    };
                    provisional_targets.push((public_identity.value, halves));
                }
            }
        }
        if include_self && !user_ids.contains(&core.local_user.user_id) {
            user_ids.push(core.local_user.user_id);
        }

        if !user_ids.is_empty() {
            let pulled = core.users.pull(&user_ids).await?;
            if !pulled.not_found.is_empty() {
                return Err(Error::invalid_argument(format!(
                    "unknown public identities: [{}]",
                    pulled
                        .not_found
                        .iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
            for user in pulled.found {
                let user_key = user.user_key.ok_or_else(|| {
                    Error::internal("sharing with a user without a user key is not supported")
                })?;
                recipients.user_keys.push((user.id, user_key));
            }
        }

        if !provisional_targets.is_empty() {
            let values: Vec<String> = provisional_targets
                .iter()
                .map(|(value, _)| value.clone())
                .collect();
            let service_halves = self.backend.get_provisional_users(&values).await?;
            for (value, halves) in &provisional_targets {
                let (_, service_signature, service_encryption) = service_halves
                    .iter()
                    .find(|(target, _, _)| target == value)
                    .ok_or_else(|| {
                        Error::invalid_argument(format!("unknown provisional identity {value}"))
                    })?;
                recipients.provisional_users.push(ProvisionalUser {
                    app_public_signature_key: halves.app_public_signature_key,
                    app_public_encryption_key: halves.app_public_encryption_key,
                    service_public_signature_key: *service_signature,
                    service_public_encryption_key: *service_encryption,
                });
            }
        }

        if !sharing.share_with_groups.is_empty() {
            let mut group_ids = sharing.share_with_groups.clone();
            group_ids.sort();
            group_ids.dedup();
            let groups = core
                .groups
                .get_public_encryption_keys(&core.local_user, &group_ids)
                .await?;
            if !groups.not_found.is_empty() {
                return Err(Error::invalid_argument(format!(
                    "unknown groups: [{}]",
                    groups
                        .not_found
                        .iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
            recipients.group_keys = groups.found;
        }

        Ok(recipients)
    }

    // ── Groups ───────────────────────────────────────────────────────────

    pub async fn create_group(&self, sharing: &SharingOptions) -> Result<GroupId> {
        let core = self.core()?.clone();
        self.cancellable(async move {
            let recipients = self.resolve_recipients(&core, sharing, false).await?;
            if recipients.is_empty() {
                return Err(Error::invalid_argument("cannot create an empty group"));
            }
            let group_signature_key_pair = ct_crypto::make_signature_key_pair();
            let group_encryption_key_pair = ct_crypto::make_encryption_key_pair();
            let creation = core.generator.user_group_creation(
                &group_signature_key_pair,
                &group_encryption_key_pair,
                &recipients.user_keys,
                &recipients.provisional_users,
            )?;
            let group_id = GroupId::from(group_signature_key_pair.public_key);
            self.backend.post_user_group(creation.clone()).await?;

            // We generated the keys; if we are a member, keep the internal
            // view (and the archived key pair) right away.
            if recipients
                .user_keys
                .iter()
                .any(|(user_id, _)| *user_id == core.local_user.user_id)
            {
                core.groups_store_put(&Group::Internal(ct_proto::group::InternalGroup {
                    id: group_id,
                    signature_key_pair: group_signature_key_pair,
                    encryption_key_pair: group_encryption_key_pair,
                    last_block_hash: creation.hash(),
                    last_key_rotation_block_hash: creation.hash(),
                }))
                .await?;
            }
            Ok(group_id)
        })
        .await
    }

    pub async fn update_group_members(
        &self,
        group_id: &GroupId,
        members_to_add: &SharingOptions,
    ) -> Result<()> {
        let core = self.core()?.clone();
        self.cancellable(async move {
            let recipients = self.resolve_recipients(&core, members_to_add, false).await?;
            if recipients.is_empty() {
                return Err(Error::invalid_argument("no members to add"));
            }
            let group = core
                .groups
                .get_group(&core.local_user, group_id)
                .await?
                .ok_or_else(|| {
                    Error::invalid_argument(format!("unknown group {group_id}"))
                })?;
            let Group::Internal(internal) = group else {
                return Err(Error::new(
                    ErrorKind::PreconditionFailed,
                    "cannot add members to a group you are not in",
                ));
            };
            let addition = core.generator.user_group_addition(
                &internal.signature_key_pair,
                &internal.encryption_key_pair,
                internal.last_key_rotation_block_hash,
                &recipients.user_keys,
                &recipients.provisional_users,
            )?;
            self.backend.patch_user_group(group_id, addition.clone()).await?;

            let mut updated = internal;
            updated.last_block_hash = addition.hash();
            core.groups_store_put(&Group::Internal(updated)).await?;
            Ok(())
        })
        .await
    }

    /// Revoke one of this user's devices, rotating the user key. The new
    /// private key is sealed to every remaining device; the previous one
    /// stays recoverable under the new key.
    pub async fn revoke_device(&mut self, device_id: &ct_proto::DeviceId) -> Result<()> {
        let core = self.core()?.clone();
        let pulled = self
            .cancellable(async { core.users.pull(&[core.local_user.user_id]).await })
            .await?;
        let user = pulled
            .found
            .first()
            .ok_or_else(|| Error::internal("our user is missing from its own history"))?;
        let target = user.find_device(device_id).ok_or_else(|| {
            Error::invalid_argument("cannot revoke a device of another user")
        })?;
        if target.is_revoked() {
            return Err(Error::invalid_argument("device is already revoked"));
        }

        let current = *core.local_user.current_user_key_pair()?;
        let new_user_key_pair = ct_crypto::make_encryption_key_pair();
        let sealed_previous = ct_crypto::SealedPrivateEncryptionKey::from_slice(
            &ct_crypto::seal_encrypt(current.private_key.as_ref(), &new_user_key_pair.public_key)?,
        )?;
        let remaining: Vec<(ct_proto::DeviceId, ct_crypto::PublicEncryptionKey)> = user
            .devices
            .iter()
            .filter(|device| !device.is_revoked() && device.id != *device_id)
            .map(|device| (device.id, device.public_encryption_key))
            .collect();

        let revocation = crate::block_generator::make_device_revocation(
            &core.generator,
            *device_id,
            &current.public_key,
            sealed_previous,
            &new_user_key_pair,
            &remaining,
            &core.local_user.device_signature_key_pair,
        )?;
        self.cancellable(async { self.backend.push_action(revocation).await })
            .await?;

        // Rotate locally: the old pair is archived in the history.
        let mut local_user = core.local_user.clone();
        local_user.push_user_key_pair(new_user_key_pair);
        self.persist_and_ready(local_user).await
    }

    // ── Provisional identities ───────────────────────────────────────────

    pub async fn attach_provisional_identity(&self, identity: &str) -> Result<AttachResult> {
        let core = self.core()?.clone();
        self.cancellable(async move {
            let provisional = crate::identity::parse_secret_provisional_identity(identity)?;

            // A claim from an earlier session makes the attach a no-op:
            // recover the key pairs from our own claim blocks.
            let claims = self.backend.get_claim_blocks(&core.local_user.user_id).await?;
            for action in &claims {
                let ct_proto::actions::Payload::ProvisionalIdentityClaim(claim) = &action.payload
                else {
                    continue;
                };
                if claim.app_public_signature_key != provisional.app_signature_key_pair.public_key
                {
                    continue;
                }
                let user_key_pair = core
                    .local_user
                    .find_user_key_pair(&claim.recipient_user_public_key)
                    .ok_or_else(|| {
                        Error::internal("claim block addressed to an unknown user key")
                    })?;
                let clear = ct_crypto::seal_decrypt(
                    claim.sealed_private_encryption_keys.as_ref(),
                    user_key_pair,
                )?;
                if clear.len() != 64 {
                    return Err(Error::internal("claim block with malformed sealed keys"));
                }
                let keys = ct_store::ProvisionalUserKeys {
                    app_encryption_key_pair: ct_crypto::encryption_key_pair_from_private(
                        ct_crypto::PrivateEncryptionKey::from_slice(&clear[..32])?,
                    ),
                    service_encryption_key_pair: ct_crypto::encryption_key_pair_from_private(
                        ct_crypto::PrivateEncryptionKey::from_slice(&clear[32..])?,
                    ),
                };
                core.provisional_users
                    .put_keys(
                        &claim.app_public_signature_key,
                        &claim.service_public_signature_key,
                        &keys,
                    )
                    .await?;
                return Ok(AttachResult {
                    status: Status::Ready,
                    verification_target: None,
                });
            }

            let target = provisional.value.clone();
            *core.attached_provisional.lock().await = Some(provisional);
            Ok(AttachResult {
                status: Status::IdentityVerificationNeeded,
                verification_target: Some(target),
            })
        })
        .await
    }

    pub async fn verify_provisional_identity(&self, verification: &Verification) -> Result<()> {
        let core = self.core()?.clone();
        self.cancellable(async move {
            let provisional = core
                .attached_provisional
                .lock()
                .await
                .take()
                .ok_or_else(|| {
                    Error::new(
                        ErrorKind::PreconditionFailed,
                        "no provisional identity is attached",
                    )
                })?;
            let service_keys = self
                .backend
                .get_service_provisional_keys(&provisional.value, &verification.to_request())
                .await?;

            let claim = core.generator.provisional_identity_claim(
                core.local_user.user_id,
                &provisional.app_signature_key_pair,
                &provisional.app_encryption_key_pair,
                &service_keys.signature_key_pair,
                &service_keys.encryption_key_pair,
                core.local_user.current_user_key_pair()?,
            )?;
            self.backend.push_action(claim).await?;
            core.provisional_users
                .put_claimed(&provisional, &service_keys)
                .await
        })
        .await
    }

    // ── Encryption sessions and streams ──────────────────────────────────

    pub async fn create_encryption_session(
        &self,
        options: &EncryptionOptions,
    ) -> Result<EncryptionSession> {
        let core = self.core()?.clone();
        self.cancellable(async move {
            let encryption_session = EncryptionSession::new(options.padding);
            core.resource_keys_store_put(
                encryption_session.session_id(),
                encryption_session.session_key(),
            )
            .await?;
            self.publish_keys(
                &core,
                &[(
                    encryption_session.session_id(),
                    encryption_session.session_key(),
                )],
                &options.sharing,
                true,
            )
            .await?;
            Ok(encryption_session)
        })
        .await
    }

    /// Streaming encryption: publishes the (fresh) session first, then
    /// returns the v11 encryption stream over `source`.
    pub async fn encrypt_stream<S>(
        &self,
        source: S,
        options: &EncryptionOptions,
    ) -> Result<ct_encryptor::stream::EncryptionStreamV11<S>>
    where
        S: InputSource,
    {
        let core = self.core()?.clone();
        let session_id = SimpleResourceId::random();
        let session_key = ct_crypto::make_symmetric_key();
        self.cancellable(async {
            core.resource_keys_store_put(session_id, session_key).await?;
            self.publish_keys(&core, &[(session_id, session_key)], &options.sharing, true)
                .await
        })
        .await?;
        Ok(ct_encryptor::stream::EncryptionStreamV11::new(
            source,
            session_id,
            session_key,
            ct_crypto::SubkeySeed::random(),
            options.padding,
            ct_encryptor::stream::DEFAULT_ENCRYPTED_CHUNK_SIZE,
        ))
    }

    /// Streaming decryption over any supported format.
    pub async fn decrypt_stream<S>(&self, source: S) -> Result<Box<dyn InputSource>>
    where
        S: InputSource + 'static,
    {
        let core = self.core()?.clone();
        self.cancellable(async move {
            let finder = AccessorKeyFinder {
                accessor: &core.resource_keys,
                local_user: &core.local_user,
            };
            Ok(crate::streams::open_decryption_stream(source, &finder).await?)
        })
        .await
    }

    // ── Teardown ─────────────────────────────────────────────────────────

    /// Cancel in-flight work, end the server session, close.
    pub async fn stop(&mut self) -> Result<()> {
        let _guard = self.teardown.lock().await;
        self.cancellation.cancel();
        if let Err(error) = self.backend.delete_session().await {
            // 401 and friends are acceptable here.
            warn!("ignoring error while closing the server session: {error}");
        }
        self.core = None;
        self.status = Status::Stopped;
        Ok(())
    }

    /// Wipe the local store and stop. Runs on unrecoverable device errors.
    async fn nuke(&self) -> Result<()> {
        let _guard = self.teardown.lock().await;
        error!("device is unrecoverable, wiping the local store");
        self.cancellation.cancel();
        self.datastore.clear().await?;
        Ok(())
    }
}

/// App-side public halves of a provisional recipient.
struct SecretProvisionalPublicHalves {
    app_public_signature_key: ct_crypto::PublicSignatureKey,
    app_public_encryption_key: ct_crypto::PublicEncryptionKey,
}

impl Core {
    async fn resource_keys_store_put(
        &self,
        resource_id: SimpleResourceId,
        key: SymmetricKey,
    ) -> Result<()> {
        // Route through the accessor's store so later lookups hit the cache.
        self.resource_keys.store_put(resource_id, key).await
    }

    async fn groups_store_put(&self, group: &Group) -> Result<()> {
        self.groups.store_put(group).await
    }
}

fn decode_user_id(value: &str) -> Result<UserId> {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    let bytes = BASE64
        .decode(value)
        .map_err(|_| Error::invalid_argument("public identity value is not base64"))?;
    UserId::from_slice(&bytes)
        .map_err(|_| Error::invalid_argument("public identity value has a bad size"))
}
