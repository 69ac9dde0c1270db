//! An in-memory server for tests: stores actions, answers the transport
//! contract, and mints identities the way an application server would.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use ct_crypto::{
    EncryptionKeyPair, Hash, PublicEncryptionKey, PublicSignatureKey, SignatureKeyPair,
    SimpleResourceId,
};
use ct_proto::actions::Payload;
use ct_proto::{Action, DeviceId, GroupId, TrustchainId, UserId};

use crate::block_generator::{make_delegation, make_device_creation};
use crate::error::{Error, ErrorKind, Result};
use crate::identity::{
    serialize_secret_identity, Delegation, PublicIdentityTarget, SecretIdentity,
    SecretProvisionalIdentity,
};
use crate::local_user::LocalUser;
use crate::transport::{
    Backend, ServiceProvisionalKeys, ShareActions, UserRegistration,
};
use crate::verification::VerificationRequest;

/// A registered user's client-side material, as tests need it.
pub struct TestUserHandle {
    pub user_id: UserId,
    pub user_key_pair: EncryptionKeyPair,
    pub device_id: DeviceId,
    pub device_signature_key_pair: SignatureKeyPair,
    pub device_encryption_key_pair: EncryptionKeyPair,
    pub trustchain_public_key: PublicSignatureKey,
}

impl TestUserHandle {
    pub fn local_user(&self) -> LocalUser {
        LocalUser {
            user_id: self.user_id,
            device_id: self.device_id,
            trustchain_public_signature_key: self.trustchain_public_key,
            device_signature_key_pair: self.device_signature_key_pair,
            device_encryption_key_pair: self.device_encryption_key_pair,
            user_key_pairs: vec![self.user_key_pair],
        }
    }
}

#[derive(Default)]
struct ServerState {
    actions: Vec<Action>,
    verification_keys: HashMap<UserId, Vec<u8>>,
    group_chains: HashMap<GroupId, Vec<Action>>,
    provisional_service_keys: HashMap<String, (SignatureKeyPair, EncryptionKeyPair)>,
}

pub struct FakeServer {
    trustchain_id: TrustchainId,
    trustchain_key_pair: SignatureKeyPair,
    root: Action,
    state: Mutex<ServerState>,
}

impl FakeServer {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let trustchain_key_pair = ct_crypto::make_signature_key_pair();
        let root = Action::create(
            TrustchainId::default(),
            Hash::default(),
            Payload::TrustchainCreation(ct_proto::actions::TrustchainCreation {
                public_signature_key: trustchain_key_pair.public_key,
            }),
            &trustchain_key_pair.private_key,
        );
        let trustchain_id = TrustchainId::from(root.hash());
        let root = Action {
            trustchain_id,
            ..root
        };
        Self {
            trustchain_id,
            trustchain_key_pair,
            root,
            state: Mutex::new(ServerState::default()),
        }
    }

    pub fn trustchain_id(&self) -> TrustchainId {
        self.trustchain_id
    }

    pub fn actions(&self) -> Vec<Action> {
        let state = self.state.lock().unwrap();
        let mut all = vec![self.root.clone()];
        all.extend(state.actions.iter().cloned());
        all
    }

    /// Mint a secret identity, as the application server would.
    pub fn mint_identity(&self) -> (String, SecretIdentity) {
        let user_id = UserId::random();
        let delegation = make_delegation(&user_id, &self.trustchain_key_pair.private_key);
        let identity = SecretIdentity {
            trustchain_id: self.trustchain_id,
            user_id,
            delegation,
            user_secret: {
                let mut secret = [0u8; 32];
                ct_crypto::random_fill(&mut secret);
                secret
            },
        };
        (serialize_secret_identity(&identity), identity)
    }

    /// Mint a provisional identity for an email: the app half goes to the
    /// caller, the service half stays here until claimed.
    pub fn mint_provisional_identity(&self, email: &str) -> SecretProvisionalIdentity {
        let service_keys = (
            ct_crypto::make_signature_key_pair(),
            ct_crypto::make_encryption_key_pair(),
        );
        self.state
            .lock()
            .unwrap()
            .provisional_service_keys
            .insert(email.to_string(), service_keys);
        SecretProvisionalIdentity {
            trustchain_id: self.trustchain_id,
            target: PublicIdentityTarget::Email,
            value: email.to_string(),
            app_signature_key_pair: ct_crypto::make_signature_key_pair(),
            app_encryption_key_pair: ct_crypto::make_encryption_key_pair(),
        }
    }

    /// Register a user directly (ghost + one device), bypassing a session.
    pub fn register_user(&self) -> TestUserHandle {
        let (_, identity) = self.mint_identity();
        let user_key_pair = ct_crypto::make_encryption_key_pair();
        let ghost_signature = ct_crypto::make_signature_key_pair();
        let ghost_encryption = ct_crypto::make_encryption_key_pair();

        let ghost_creation = make_device_creation(
            self.trustchain_id,
            self.trustchain_id.into(),
            &identity.delegation,
            identity.user_id,
            &ghost_signature,
            &ghost_encryption,
            &user_key_pair,
            true,
        )
        .unwrap();
        let ghost_id = DeviceId::from(ghost_creation.hash());

        let device_signature = ct_crypto::make_signature_key_pair();
        let device_encryption = ct_crypto::make_encryption_key_pair();
        let delegation = make_delegation(&identity.user_id, &ghost_signature.private_key);
        let device_creation = make_device_creation(
            self.trustchain_id,
            ghost_id.into(),
            &delegation,
            identity.user_id,
            &device_signature,
            &device_encryption,
            &user_key_pair,
            false,
        )
        .unwrap();
        let device_id = DeviceId::from(device_creation.hash());

        let mut state = self.state.lock().unwrap();
        state.actions.push(ghost_creation);
        state.actions.push(device_creation);

        TestUserHandle {
            user_id: identity.user_id,
            user_key_pair,
            device_id,
            device_signature_key_pair: device_signature,
            device_encryption_key_pair: device_encryption,
            trustchain_public_key: self.trustchain_key_pair.public_key,
        }
    }

    /// Add another device to a registered user, authored by their device.
    pub fn add_device(&self, owner: &TestUserHandle) -> TestUserHandle {
        let device_signature = ct_crypto::make_signature_key_pair();
        let device_encryption = ct_crypto::make_encryption_key_pair();
        let ephemeral_key_pair = ct_crypto::make_signature_key_pair();
        let delegation = Delegation {
            signature: ct_crypto::sign(
                &ct_proto::actions::DeviceCreationV1::delegation_signature_data(
                    &ephemeral_key_pair.public_key,
                    &owner.user_id,
                ),
                &owner.device_signature_key_pair.private_key,
            ),
            ephemeral_key_pair,
        };
        let creation = make_device_creation(
            self.trustchain_id,
            owner.device_id.into(),
            &delegation,
            owner.user_id,
            &device_signature,
            &device_encryption,
            &owner.user_key_pair,
            false,
        )
        .unwrap();
        let device_id = DeviceId::from(creation.hash());
        self.state.lock().unwrap().actions.push(creation);

        TestUserHandle {
            user_id: owner.user_id,
            user_key_pair: owner.user_key_pair,
            device_id,
            device_signature_key_pair: device_signature,
            device_encryption_key_pair: device_encryption,
            trustchain_public_key: self.trustchain_key_pair.public_key,
        }
    }

    fn user_history(&self, user_ids: &[UserId]) -> Vec<Action> {
        let state = self.state.lock().unwrap();
        let mut all = vec![self.root.clone()];
        for action in &state.actions {
            let owner = match &action.payload {
                Payload::DeviceCreation1(p) | Payload::DeviceCreation2(p) => Some(p.user_id),
                Payload::DeviceCreation3(p) => Some(p.user_id),
                Payload::DeviceRevocation1(_) | Payload::DeviceRevocation2(_) => {
                    self.owner_of_device(&state, &DeviceId::from(action.author))
                }
                _ => None,
            };
            if owner.is_some_and(|id| user_ids.contains(&id)) {
                all.push(action.clone());
            }
        }
        all
    }

    fn owner_of_device(&self, state: &ServerState, device_id: &DeviceId) -> Option<UserId> {
        state.actions.iter().find_map(|action| match &action.payload {
            Payload::DeviceCreation1(p) | Payload::DeviceCreation2(p)
                if DeviceId::from(action.hash()) == *device_id =>
            {
                Some(p.user_id)
            }
            Payload::DeviceCreation3(p) if DeviceId::from(action.hash()) == *device_id => {
                Some(p.user_id)
            }
            _ => None,
        })
    }
}

#[async_trait]
impl Backend for FakeServer {
    async fn get_users(&self, user_ids: &[UserId]) -> Result<Vec<Action>> {
        Ok(self.user_history(user_ids))
    }

    async fn get_users_by_device(&self, device_ids: &[DeviceId]) -> Result<Vec<Action>> {
        let user_ids: Vec<UserId> = {
            let state = self.state.lock().unwrap();
            device_ids
                .iter()
                .filter_map(|id| self.owner_of_device(&state, id))
                .collect()
        };
        Ok(self.user_history(&user_ids))
    }

    async fn create_user(&self, registration: UserRegistration) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.verification_keys.contains_key(&registration.user_id) {
            return Err(Error::server(
                ErrorKind::Conflict,
                "conflict",
                "user already exists",
            ));
        }
        state.actions.push(registration.ghost_device_creation);
        state.actions.push(registration.first_device_creation);
        state
            .verification_keys
            .insert(registration.user_id, registration.encrypted_verification_key);
        Ok(())
    }

    async fn create_device(&self, device_creation: Action) -> Result<()> {
        self.state.lock().unwrap().actions.push(device_creation);
        Ok(())
    }

    async fn get_verification_key(
        &self,
        user_id: &UserId,
        _verification: &VerificationRequest,
    ) -> Result<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .verification_keys
            .get(user_id)
            .cloned()
            .ok_or_else(|| {
                Error::server(
                    ErrorKind::InvalidVerification,
                    "verification_key_not_found",
                    "no verification key",
                )
            })
    }

    async fn get_resource_keys(&self, resource_ids: &[SimpleResourceId]) -> Result<Vec<Action>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .actions
            .iter()
            .filter(|action| match &action.payload {
                Payload::KeyPublishToUser(p) => resource_ids.contains(&p.resource_id),
                Payload::KeyPublishToUserGroup(p) => resource_ids.contains(&p.resource_id),
                Payload::KeyPublishToProvisionalUser(p) => resource_ids.contains(&p.resource_id),
                _ => false,
            })
            .cloned()
            .collect())
    }

    async fn post_resource_keys(&self, actions: ShareActions) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.extend(actions.key_publishes_to_users);
        state.actions.extend(actions.key_publishes_to_user_groups);
        state
            .actions
            .extend(actions.key_publishes_to_provisional_users);
        Ok(())
    }

    async fn post_user_group(&self, group_creation: Action) -> Result<()> {
        let group_id = match &group_creation.payload {
            Payload::UserGroupCreation1(p) => GroupId::from(p.public_signature_key),
            Payload::UserGroupCreation2(p) => GroupId::from(p.public_signature_key),
            _ => return Err(Error::invalid_argument("not a group creation")),
        };
        let mut state = self.state.lock().unwrap();
        state.actions.push(group_creation.clone());
        state.group_chains.entry(group_id).or_default().push(group_creation);
        Ok(())
    }

    async fn patch_user_group(&self, group_id: &GroupId, group_addition: Action) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(group_addition.clone());
        state
            .group_chains
            .entry(*group_id)
            .or_default()
            .push(group_addition);
        Ok(())
    }

    async fn get_group_blocks(&self, group_ids: &[GroupId]) -> Result<Vec<Action>> {
        let state = self.state.lock().unwrap();
        let mut actions = Vec::new();
        for group_id in group_ids {
            if let Some(chain) = state.group_chains.get(group_id) {
                actions.extend(chain.iter().cloned());
            }
        }
        Ok(actions)
    }

    async fn get_group_blocks_by_public_key(
        &self,
        keys: &[PublicEncryptionKey],
    ) -> Result<Vec<Action>> {
        let state = self.state.lock().unwrap();
        let mut actions = Vec::new();
        for chain in state.group_chains.values() {
            let owns_key = chain.iter().any(|action| match &action.payload {
                Payload::UserGroupCreation1(p) => keys.contains(&p.public_encryption_key),
                Payload::UserGroupCreation2(p) => keys.contains(&p.public_encryption_key),
                _ => false,
            });
            if owns_key {
                actions.extend(chain.iter().cloned());
            }
        }
        Ok(actions)
    }

    async fn get_claim_blocks(&self, user_id: &UserId) -> Result<Vec<Action>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .actions
            .iter()
            .filter(|action| match &action.payload {
                Payload::ProvisionalIdentityClaim(claim) => claim.user_id == *user_id,
                _ => false,
            })
            .cloned()
            .collect())
    }

    async fn get_provisional_users(
        &self,
        target_values: &[String],
    ) -> Result<Vec<(String, PublicSignatureKey, PublicEncryptionKey)>> {
        let state = self.state.lock().unwrap();
        target_values
            .iter()
            .map(|value| {
                state
                    .provisional_service_keys
                    .get(value)
                    .map(|(signature, encryption)| {
                        (value.clone(), signature.public_key, encryption.public_key)
                    })
                    .ok_or_else(|| {
                        Error::server(
                            ErrorKind::InvalidArgument,
                            "provisional_identity_not_found",
                            "unknown provisional identity",
                        )
                    })
            })
            .collect()
    }

    async fn get_service_provisional_keys(
        &self,
        target_value: &str,
        _verification: &VerificationRequest,
    ) -> Result<ServiceProvisionalKeys> {
        let state = self.state.lock().unwrap();
        let (signature_key_pair, encryption_key_pair) = state
            .provisional_service_keys
            .get(target_value)
            .ok_or_else(|| {
                Error::server(
                    ErrorKind::InvalidArgument,
                    "provisional_identity_not_found",
                    "unknown provisional identity",
                )
            })?;
        Ok(ServiceProvisionalKeys {
            signature_key_pair: *signature_key_pair,
            encryption_key_pair: *encryption_key_pair,
        })
    }

    async fn push_action(&self, action: Action) -> Result<()> {
        self.state.lock().unwrap().actions.push(action);
        Ok(())
    }

    async fn delete_session(&self) -> Result<()> {
        Ok(())
    }
}
