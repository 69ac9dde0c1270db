//! Signed action generation.
//!
//! Mirrors the verifier's expectations exactly: whatever is produced here
//! must pass the corresponding verification rule.

use ct_crypto::{
    seal_encrypt, sign, EncryptionKeyPair, Hash, PublicEncryptionKey, PublicSignatureKey,
    SealedPrivateEncryptionKey, SealedPrivateSignatureKey, SealedSymmetricKey, Signature,
    SignatureKeyPair, SimpleResourceId, SymmetricKey, TwoTimesSealedPrivateEncryptionKey,
    TwoTimesSealedSymmetricKey,
};
use ct_proto::actions::{
    DeviceCreationV1, DeviceCreationV3, DeviceRevocationV2, GroupMember, GroupProvisionalMember,
    KeyPublishToProvisionalUser, KeyPublishToUser, KeyPublishToUserGroup, Payload,
    ProvisionalIdentityClaim, UserGroupAdditionV2, UserGroupCreationV2,
};
use ct_proto::{Action, DeviceId, TrustchainId, UserId};

use crate::error::Result;
use crate::identity::Delegation;
use crate::provisional::ProvisionalUser;

/// Signs actions on behalf of the current device.
pub struct BlockGenerator {
    trustchain_id: TrustchainId,
    device_id: DeviceId,
    device_signature_key_pair: SignatureKeyPair,
}

impl BlockGenerator {
    pub fn new(
        trustchain_id: TrustchainId,
        device_id: DeviceId,
        device_signature_key_pair: SignatureKeyPair,
    ) -> Self {
        Self {
            trustchain_id,
            device_id,
            device_signature_key_pair,
        }
    }

    pub fn trustchain_id(&self) -> TrustchainId {
        self.trustchain_id
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    fn author(&self) -> Hash {
        Hash::from(self.device_id)
    }

    pub fn key_publish_to_user(
        &self,
        resource_id: SimpleResourceId,
        resource_key: &SymmetricKey,
        recipient_user_key: &PublicEncryptionKey,
    ) -> Result<Action> {
        let sealed =
            SealedSymmetricKey::from_slice(&seal_encrypt(resource_key.as_ref(), recipient_user_key)?)?;
        Ok(Action::create(
            self.trustchain_id,
            self.author(),
            Payload::KeyPublishToUser(KeyPublishToUser {
                recipient_public_encryption_key: *recipient_user_key,
                resource_id,
                sealed_symmetric_key: sealed,
            }),
            &self.device_signature_key_pair.private_key,
        ))
    }

    pub fn key_publish_to_group(
        &self,
        resource_id: SimpleResourceId,
        resource_key: &SymmetricKey,
        recipient_group_key: &PublicEncryptionKey,
    ) -> Result<Action> {
        let sealed =
            SealedSymmetricKey::from_slice(&seal_encrypt(resource_key.as_ref(), recipient_group_key)?)?;
        Ok(Action::create(
            self.trustchain_id,
            self.author(),
            Payload::KeyPublishToUserGroup(KeyPublishToUserGroup {
                recipient_public_encryption_key: *recipient_group_key,
                resource_id,
                sealed_symmetric_key: sealed,
            }),
            &self.device_signature_key_pair.private_key,
        ))
    }

    pub fn key_publish_to_provisional_user(
        &self,
        resource_id: SimpleResourceId,
        resource_key: &SymmetricKey,
        recipient: &ProvisionalUser,
    ) -> Result<Action> {
        // App half first, service half on top: claiming peels them in
        // reverse.
        let once = seal_encrypt(resource_key.as_ref(), &recipient.app_public_encryption_key)?;
        let twice = seal_encrypt(&once, &recipient.service_public_encryption_key)?;
        Ok(Action::create(
            self.trustchain_id,
            self.author(),
            Payload::KeyPublishToProvisionalUser(KeyPublishToProvisionalUser {
                app_public_signature_key: recipient.app_public_signature_key,
                resource_id,
                service_public_signature_key: recipient.service_public_signature_key,
                two_times_sealed_symmetric_key: TwoTimesSealedSymmetricKey::from_slice(&twice)?,
            }),
            &self.device_signature_key_pair.private_key,
        ))
    }

    pub fn user_group_creation(
        &self,
        group_signature_key_pair: &SignatureKeyPair,
        group_encryption_key_pair: &EncryptionKeyPair,
        member_users: &[(UserId, PublicEncryptionKey)],
        member_provisional_users: &[ProvisionalUser],
    ) -> Result<Action> {
        let sealed_private_signature_key = SealedPrivateSignatureKey::from_slice(&seal_encrypt(
            group_signature_key_pair.private_key.as_ref(),
            &group_encryption_key_pair.public_key,
        )?)?;

        let members = member_users
            .iter()
            .map(|(user_id, user_key)| {
                Ok(GroupMember {
                    user_id: *user_id,
                    public_user_encryption_key: *user_key,
                    sealed_private_group_encryption_key: SealedPrivateEncryptionKey::from_slice(
                        &seal_encrypt(group_encryption_key_pair.private_key.as_ref(), user_key)?,
                    )?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let provisional_members =
            self.provisional_members(group_encryption_key_pair, member_provisional_users)?;

        let mut payload = UserGroupCreationV2 {
            public_signature_key: group_signature_key_pair.public_key,
            public_encryption_key: group_encryption_key_pair.public_key,
            sealed_private_signature_key,
            members,
            provisional_members,
            self_signature: Signature::default(),
        };
        payload.self_signature = sign(
            &payload.signature_data(),
            &group_signature_key_pair.private_key,
        );
        Ok(Action::create(
            self.trustchain_id,
            self.author(),
            Payload::UserGroupCreation2(payload),
            &self.device_signature_key_pair.private_key,
        ))
    }

    pub fn user_group_addition(
        &self,
        group_signature_key_pair: &SignatureKeyPair,
        group_encryption_key_pair: &EncryptionKeyPair,
        previous_group_block_hash: Hash,
        member_users: &[(UserId, PublicEncryptionKey)],
        member_provisional_users: &[ProvisionalUser],
    ) -> Result<Action> {
        let members = member_users
            .iter()
            .map(|(user_id, user_key)| {
                Ok(GroupMember {
                    user_id: *user_id,
                    public_user_encryption_key: *user_key,
                    sealed_private_group_encryption_key: SealedPrivateEncryptionKey::from_slice(
                        &seal_encrypt(group_encryption_key_pair.private_key.as_ref(), user_key)?,
                    )?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let provisional_members =
            self.provisional_members(group_encryption_key_pair, member_provisional_users)?;

        let mut payload = UserGroupAdditionV2 {
            group_id: group_signature_key_pair.public_key.into(),
            previous_group_block_hash,
            members,
            provisional_members,
            self_signature: Signature::default(),
        };
        payload.self_signature = sign(
            &payload.signature_data(),
            &group_signature_key_pair.private_key,
        );
        Ok(Action::create(
            self.trustchain_id,
            self.author(),
            Payload::UserGroupAddition2(payload),
            &self.device_signature_key_pair.private_key,
        ))
    }

    fn provisional_members(
        &self,
        group_encryption_key_pair: &EncryptionKeyPair,
        users: &[ProvisionalUser],
    ) -> Result<Vec<GroupProvisionalMember>> {
        users
            .iter()
            .map(|user| {
                let once = seal_encrypt(
                    group_encryption_key_pair.private_key.as_ref(),
                    &user.app_public_encryption_key,
                )?;
                let twice = seal_encrypt(&once, &user.service_public_encryption_key)?;
                Ok(GroupProvisionalMember {
                    app_public_signature_key: user.app_public_signature_key,
                    service_public_signature_key: user.service_public_signature_key,
                    sealed_private_group_encryption_key:
                        TwoTimesSealedPrivateEncryptionKey::from_slice(&twice)?,
                })
            })
            .collect()
    }

    pub fn provisional_identity_claim(
        &self,
        user_id: UserId,
        app_signature_key_pair: &SignatureKeyPair,
        app_encryption_key_pair: &EncryptionKeyPair,
        service_signature_key_pair: &SignatureKeyPair,
        service_encryption_key_pair: &EncryptionKeyPair,
        user_key_pair: &EncryptionKeyPair,
    ) -> Result<Action> {
        let mut keys = Vec::with_capacity(2 * 32);
        keys.extend_from_slice(app_encryption_key_pair.private_key.as_ref());
        keys.extend_from_slice(service_encryption_key_pair.private_key.as_ref());
        let sealed = ct_crypto::SealedPrivateEncryptionKeys::from_slice(&seal_encrypt(
            &keys,
            &user_key_pair.public_key,
        )?)?;

        let mut payload = ProvisionalIdentityClaim {
            user_id,
            app_public_signature_key: app_signature_key_pair.public_key,
            service_public_signature_key: service_signature_key_pair.public_key,
            author_signature_by_app_key: Signature::default(),
            author_signature_by_service_key: Signature::default(),
            recipient_user_public_key: user_key_pair.public_key,
            sealed_private_encryption_keys: sealed,
        };
        let signature_data = payload.signature_data(&self.device_id);
        payload.author_signature_by_app_key =
            sign(&signature_data, &app_signature_key_pair.private_key);
        payload.author_signature_by_service_key =
            sign(&signature_data, &service_signature_key_pair.private_key);
        Ok(Action::create(
            self.trustchain_id,
            self.author(),
            Payload::ProvisionalIdentityClaim(payload),
            &self.device_signature_key_pair.private_key,
        ))
    }
}

/// Build a device creation action (outside [`BlockGenerator`]: the signer
/// is the delegation's ephemeral key, not an existing device).
#[allow(clippy::too_many_arguments)]
pub fn make_device_creation(
    trustchain_id: TrustchainId,
    author: Hash,
    delegation: &Delegation,
    user_id: UserId,
    device_signature_key_pair: &SignatureKeyPair,
    device_encryption_key_pair: &EncryptionKeyPair,
    user_key_pair: &EncryptionKeyPair,
    is_ghost_device: bool,
) -> Result<Action> {
    let sealed_user_key = SealedPrivateEncryptionKey::from_slice(&seal_encrypt(
        user_key_pair.private_key.as_ref(),
        &device_encryption_key_pair.public_key,
    )?)?;
    Ok(Action::create(
        trustchain_id,
        author,
        Payload::DeviceCreation3(DeviceCreationV3 {
            ephemeral_public_signature_key: delegation.ephemeral_key_pair.public_key,
            user_id,
            delegation_signature: delegation.signature,
            public_signature_key: device_signature_key_pair.public_key,
            public_encryption_key: device_encryption_key_pair.public_key,
            public_user_encryption_key: user_key_pair.public_key,
            sealed_private_user_encryption_key: sealed_user_key,
            is_ghost_device,
        }),
        &delegation.ephemeral_key_pair.private_key,
    ))
}

/// Delegation by an existing device (used when the ghost device signs the
/// first real device, or a device adds another).
pub fn make_delegation(
    user_id: &UserId,
    parent_private_signature_key: &ct_crypto::PrivateSignatureKey,
) -> Delegation {
    let ephemeral_key_pair = ct_crypto::make_signature_key_pair();
    let data =
        DeviceCreationV1::delegation_signature_data(&ephemeral_key_pair.public_key, user_id);
    Delegation {
        ephemeral_key_pair,
        signature: sign(&data, parent_private_signature_key),
    }
}

/// Revocation of `device_id`, rotating the user key to `new_user_key_pair`.
pub fn make_device_revocation(
    generator: &BlockGenerator,
    device_id: DeviceId,
    previous_user_key: &PublicEncryptionKey,
    previous_user_private_key_sealed: SealedPrivateEncryptionKey,
    new_user_key_pair: &EncryptionKeyPair,
    remaining_devices: &[(DeviceId, PublicEncryptionKey)],
    device_signature_key_pair: &SignatureKeyPair,
) -> Result<Action> {
    let sealed_user_keys_for_devices = remaining_devices
        .iter()
        .map(|(id, device_key)| {
            Ok((
                *id,
                SealedPrivateEncryptionKey::from_slice(&seal_encrypt(
                    new_user_key_pair.private_key.as_ref(),
                    device_key,
                )?)?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Action::create(
        generator.trustchain_id(),
        Hash::from(generator.device_id()),
        Payload::DeviceRevocation2(DeviceRevocationV2 {
            device_id,
            public_encryption_key: new_user_key_pair.public_key,
            previous_public_encryption_key: *previous_user_key,
            sealed_key_for_previous_user_key: previous_user_private_key_sealed,
            sealed_user_keys_for_devices,
        }),
        &device_signature_key_pair.private_key,
    ))
}
