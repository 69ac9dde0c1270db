//! User chain application and the user accessor.
//!
//! `process_user_actions` folds a batch of device creations/revocations
//! into verified [`User`] views. Invalid actions are logged and skipped;
//! the rest of the batch still applies.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::error;

use ct_crypto::{
    seal_decrypt, EncryptionKeyPair, PublicSignatureKey,
};
use ct_proto::actions::Payload;
use ct_proto::user::{Device, User};
use ct_proto::verif::{self, DeviceCreationContext};
use ct_proto::{Action, DeviceId, Nature, TrustchainId, UserId};

use crate::coalescer::TaskCoalescer;
use crate::error::{Error, Result};
use crate::local_user::LocalUser;
use crate::transport::Backend;

/// Outcome of folding a batch of user actions.
#[derive(Debug, Default)]
pub struct ProcessedUsers {
    pub trustchain_public_key: Option<PublicSignatureKey>,
    pub users: HashMap<UserId, User>,
    pub device_owners: HashMap<DeviceId, UserId>,
}

impl ProcessedUsers {
    pub fn find_device(&self, device_id: &DeviceId) -> Option<&Device> {
        let user_id = self.device_owners.get(device_id)?;
        self.users.get(user_id)?.find_device(device_id)
    }
}

/// Apply a batch of trustchain/user actions in order, verifying each one.
pub fn process_user_actions(
    trustchain_id: &TrustchainId,
    trustchain_public_key: Option<PublicSignatureKey>,
    actions: &[Action],
) -> Result<ProcessedUsers> {
    let mut state = ProcessedUsers {
        trustchain_public_key,
        ..Default::default()
    };
    let mut chain_index: u64 = 0;

    for action in actions {
        chain_index += 1;
        let outcome = apply_user_action(trustchain_id, &mut state, action, chain_index);
        if let Err(verif_error) = outcome {
            error!(
                action_hash = %action.hash(),
                nature = %action.nature(),
                "skipping invalid block: {verif_error}"
            );
        }
    }
    Ok(state)
}

fn apply_user_action(
    trustchain_id: &TrustchainId,
    state: &mut ProcessedUsers,
    action: &Action,
    chain_index: u64,
) -> std::result::Result<(), verif::VerifError> {
    match action.nature() {
        Nature::TrustchainCreation => {
            verif::verify_trustchain_creation(action, trustchain_id)?;
            if let Payload::TrustchainCreation(creation) = &action.payload {
                state.trustchain_public_key = Some(creation.public_signature_key);
            }
            Ok(())
        }
        nature if nature.is_device_creation() => {
            apply_device_creation(trustchain_id, state, action)
        }
        nature if nature.is_device_revocation() => {
            apply_device_revocation(state, action, chain_index)
        }
        _ => Err(verif::VerifError {
            kind: verif::Errc::InvalidNature,
            message: "unexpected nature in a user history",
        }),
    }
}

fn apply_device_creation(
    trustchain_id: &TrustchainId,
    state: &mut ProcessedUsers,
    action: &Action,
) -> std::result::Result<(), verif::VerifError> {
    let (user_id, device, user_key) = extract_device(action);

    if action.author == (*trustchain_id).into() {
        let trustchain_public_key =
            state.trustchain_public_key.as_ref().ok_or(verif::VerifError {
                kind: verif::Errc::InvalidAuthor,
                message: "root-authored device before the trustchain creation",
            })?;
        verif::verify_device_creation(
            action,
            &DeviceCreationContext::Root {
                trustchain_public_key,
            },
        )?;
    } else {
        let author_id = DeviceId::from(action.author);
        let author_user_id = *state.device_owners.get(&author_id).ok_or(verif::VerifError {
            kind: verif::Errc::InvalidAuthor,
            message: "author device not found",
        })?;
        let user = state.users.get(&author_user_id).ok_or(verif::VerifError {
            kind: verif::Errc::InvalidAuthor,
            message: "author user not found",
        })?;
        let author_device = user.find_device(&author_id).ok_or(verif::VerifError {
            kind: verif::Errc::InvalidAuthor,
            message: "author device not found",
        })?;
        verif::verify_device_creation(
            action,
            &DeviceCreationContext::Device {
                author_device,
                user,
            },
        )?;
    }

    let user = state
        .users
        .entry(user_id)
        .or_insert_with(|| User::new(user_id));
    if let Some(key) = user_key {
        user.user_key = Some(key);
    }
    state.device_owners.insert(device.id, user_id);
    user.devices.push(device);
    Ok(())
}

fn apply_device_revocation(
    state: &mut ProcessedUsers,
    action: &Action,
    chain_index: u64,
) -> std::result::Result<(), verif::VerifError> {
    let author_id = DeviceId::from(action.author);
    let user_id = *state.device_owners.get(&author_id).ok_or(verif::VerifError {
        kind: verif::Errc::InvalidUser,
        message: "a device can only be revoked by another device of its user",
    })?;
    let user = state.users.get_mut(&user_id).ok_or(verif::VerifError {
        kind: verif::Errc::InvalidUser,
        message: "author user not found",
    })?;
    verif::verify_device_revocation(action, user)?;

    match &action.payload {
        Payload::DeviceRevocation1(revocation) => {
            if let Some(device) = user.find_device_mut(&revocation.device_id) {
                device.revoked_at = Some(chain_index);
            }
        }
        Payload::DeviceRevocation2(revocation) => {
            if let Some(device) = user.find_device_mut(&revocation.device_id) {
                device.revoked_at = Some(chain_index);
            }
            user.user_key = Some(revocation.public_encryption_key);
        }
        _ => unreachable!("nature checked by the verifier"),
    }
    Ok(())
}

fn extract_device(
    action: &Action,
) -> (UserId, Device, Option<ct_crypto::PublicEncryptionKey>) {
    match &action.payload {
        Payload::DeviceCreation1(payload) | Payload::DeviceCreation2(payload) => (
            payload.user_id,
            Device {
                id: DeviceId::from(action.hash()),
                user_id: payload.user_id,
                public_signature_key: payload.public_signature_key,
                public_encryption_key: payload.public_encryption_key,
                is_ghost_device: false,
                revoked_at: None,
            },
            None,
        ),
        Payload::DeviceCreation3(payload) => (
            payload.user_id,
            Device {
                id: DeviceId::from(action.hash()),
                user_id: payload.user_id,
                public_signature_key: payload.public_signature_key,
                public_encryption_key: payload.public_encryption_key,
                is_ghost_device: payload.is_ghost_device,
                revoked_at: None,
            },
            Some(payload.public_user_encryption_key),
        ),
        _ => unreachable!("caller checked the nature"),
    }
}

/// Rebuild the local user's full user-key history from its own chain.
///
/// Forward: our device creation seals the then-current key to the device;
/// every later revocation seals the rotated key to each remaining device.
/// Backward: each revocation also seals the *previous* private key under
/// the new one, so older keys recover in reverse.
pub fn recover_user_key_history(
    local_user: &LocalUser,
    actions: &[Action],
) -> Result<Vec<EncryptionKeyPair>> {
    let mut history: Vec<EncryptionKeyPair> = Vec::new();
    let mut earlier_revocations = Vec::new();
    let mut seen_own_device = false;

    for action in actions {
        match &action.payload {
            Payload::DeviceCreation3(payload) => {
                if DeviceId::from(action.hash()) == local_user.device_id {
                    let private_key = seal_decrypt(
                        payload.sealed_private_user_encryption_key.as_ref(),
                        &local_user.device_encryption_key_pair,
                    )?;
                    history.push(EncryptionKeyPair {
                        public_key: payload.public_user_encryption_key,
                        private_key: ct_crypto::PrivateEncryptionKey::from_slice(&private_key)?,
                    });
                    seen_own_device = true;
                }
            }
            Payload::DeviceRevocation2(revocation) => {
                if !seen_own_device {
                    earlier_revocations.push(revocation.clone());
                    continue;
                }
                if revocation.device_id == local_user.device_id {
                    return Err(Error::new(
                        crate::error::ErrorKind::DeviceRevoked,
                        "this device has been revoked",
                    ));
                }
                let sealed = revocation
                    .sealed_user_keys_for_devices
                    .iter()
                    .find(|(device_id, _)| *device_id == local_user.device_id);
                if let Some((_, sealed_key)) = sealed {
                    // The rotated key is sealed to our device key.
                    let private_key = seal_decrypt(
                        sealed_key.as_ref(),
                        &local_user.device_encryption_key_pair,
                    )?;
                    history.push(EncryptionKeyPair {
                        public_key: revocation.public_encryption_key,
                        private_key: ct_crypto::PrivateEncryptionKey::from_slice(&private_key)?,
                    });
                }
            }
            _ => {}
        }
    }

    // Walk earlier rotations backwards: the newest known key opens the
    // seal of the key it replaced.
    for revocation in earlier_revocations.iter().rev() {
        let Some(oldest) = history.first().cloned() else {
            break;
        };
        if revocation.public_encryption_key != oldest.public_key
            || revocation.previous_public_encryption_key.is_null()
        {
            continue;
        }
        let private_key = seal_decrypt(
            revocation.sealed_key_for_previous_user_key.as_ref(),
            &oldest,
        )?;
        history.insert(
            0,
            EncryptionKeyPair {
                public_key: revocation.previous_public_encryption_key,
                private_key: ct_crypto::PrivateEncryptionKey::from_slice(&private_key)?,
            },
        );
    }

    Ok(history)
}

/// Pull result: requested users that exist, and those that do not.
#[derive(Debug, Default)]
pub struct UserPullResult {
    pub found: Vec<User>,
    pub not_found: Vec<UserId>,
}

/// Cached, coalesced access to other users.
pub struct UserAccessor {
    backend: Arc<dyn Backend>,
    trustchain_id: TrustchainId,
    trustchain_public_key: RwLock<Option<PublicSignatureKey>>,
    user_coalescer: TaskCoalescer<UserId, User>,
    device_coalescer: TaskCoalescer<DeviceId, Device>,
}

impl UserAccessor {
    pub fn new(backend: Arc<dyn Backend>, trustchain_id: TrustchainId) -> Self {
        Self {
            backend,
            trustchain_id,
            trustchain_public_key: RwLock::new(None),
            user_coalescer: TaskCoalescer::new(),
            device_coalescer: TaskCoalescer::new(),
        }
    }

    pub async fn pull(&self, user_ids: &[UserId]) -> Result<UserPullResult> {
        let trustchain_public_key = *self.trustchain_public_key.read().await;
        let found = self
            .user_coalescer
            .run(
                |missing: Vec<UserId>| async move {
                    let actions = self.backend.get_users(&missing).await?;
                    let processed =
                        process_user_actions(&self.trustchain_id, trustchain_public_key, &actions)?;
                    if let Some(key) = processed.trustchain_public_key {
                        *self.trustchain_public_key.write().await = Some(key);
                    }
                    Ok(processed
                        .users
                        .into_iter()
                        .filter(|(id, _)| missing.contains(id))
                        .collect())
                },
                user_ids,
            )
            .await?;

        let found_ids: Vec<UserId> = found.iter().map(|user| user.id).collect();
        let not_found = user_ids
            .iter()
            .filter(|id| !found_ids.contains(id))
            .copied()
            .collect();
        Ok(UserPullResult { found, not_found })
    }

    /// Resolve devices (action authors) by id.
    pub async fn pull_devices(&self, device_ids: &[DeviceId]) -> Result<HashMap<DeviceId, Device>> {
        let trustchain_public_key = *self.trustchain_public_key.read().await;
        let devices = self
            .device_coalescer
            .run(
                |missing: Vec<DeviceId>| async move {
                    let actions = self.backend.get_users_by_device(&missing).await?;
                    let processed =
                        process_user_actions(&self.trustchain_id, trustchain_public_key, &actions)?;
                    if let Some(key) = processed.trustchain_public_key {
                        *self.trustchain_public_key.write().await = Some(key);
                    }
                    Ok(missing
                        .iter()
                        .filter_map(|id| processed.find_device(id).cloned().map(|d| (*id, d)))
                        .collect())
                },
                device_ids,
            )
            .await?;
        Ok(devices.into_iter().map(|device| (device.id, device)).collect())
    }
}
