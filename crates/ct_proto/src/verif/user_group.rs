use ct_crypto::PublicSignatureKey;

use crate::actions::Payload;
use crate::envelope::Action;
use crate::group::Group;
use crate::ids::GroupId;
use crate::user::Device;

use super::{ensures, Errc, VerifError};

pub fn verify_user_group_creation(
    action: &Action,
    author_device: &Device,
    existing_group: Option<&Group>,
) -> Result<(), VerifError> {
    ensures(
        !author_device.is_revoked(),
        Errc::AuthorIsRevoked,
        "author device of a group creation is revoked",
    )?;
    ensures(
        action.verify_signature(&author_device.public_signature_key),
        Errc::InvalidSignature,
        "group creation must be signed by its author device",
    )?;

    let (group_key, signature_data, self_signature, member_count) = match &action.payload {
        Payload::UserGroupCreation1(p) => (
            p.public_signature_key,
            p.signature_data(),
            p.self_signature,
            p.sealed_private_encryption_keys_for_users.len(),
        ),
        Payload::UserGroupCreation2(p) => (
            p.public_signature_key,
            p.signature_data(),
            p.self_signature,
            p.members.len() + p.provisional_members.len(),
        ),
        _ => {
            return Err(VerifError {
                kind: Errc::InvalidNature,
                message: "action is not a group creation",
            })
        }
    };

    // No rotation rule exists yet: a creation for a known group id is
    // rejected rather than rotating keys.
    ensures(
        existing_group.is_none(),
        Errc::InvalidGroupBlock,
        "group creation for a group that already exists",
    )?;
    ensures(
        member_count > 0,
        Errc::InvalidGroupMembers,
        "group creation must seal the group key to at least one member",
    )?;
    ensures(
        ct_crypto::verify(&signature_data, &self_signature, &group_key),
        Errc::InvalidSignature,
        "group creation self-signature does not verify",
    )
}

pub fn verify_user_group_addition(
    action: &Action,
    author_device: &Device,
    group: Option<&Group>,
) -> Result<(), VerifError> {
    ensures(
        !author_device.is_revoked(),
        Errc::AuthorIsRevoked,
        "author device of a group addition is revoked",
    )?;
    ensures(
        action.verify_signature(&author_device.public_signature_key),
        Errc::InvalidSignature,
        "group addition must be signed by its author device",
    )?;

    let (group_id, previous_hash, signature_data, self_signature) = match &action.payload {
        Payload::UserGroupAddition1(p) => (
            p.group_id,
            p.previous_group_block_hash,
            p.signature_data(),
            p.self_signature,
        ),
        Payload::UserGroupAddition2(p) => (
            p.group_id,
            p.previous_group_block_hash,
            p.signature_data(),
            p.self_signature,
        ),
        _ => {
            return Err(VerifError {
                kind: Errc::InvalidNature,
                message: "action is not a group addition",
            })
        }
    };

    let group = group.ok_or(VerifError {
        kind: Errc::InvalidGroup,
        message: "group addition to an unknown group",
    })?;
    ensures(
        group_id == group.id(),
        Errc::InvalidGroup,
        "group addition group id mismatch",
    )?;
    ensures(
        previous_hash == group.last_key_rotation_block_hash(),
        Errc::InvalidGroupBlock,
        "group addition previous block hash does not match the group chain",
    )?;
    ensures(
        ct_crypto::verify(
            &signature_data,
            &self_signature,
            &PublicSignatureKey::from(group.id()),
        ),
        Errc::InvalidSignature,
        "group addition self-signature does not verify",
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{TestTrustchain, TestUser};
    use super::*;
    use crate::actions::{UserGroupAdditionV1, UserGroupCreationV1};
    use crate::group::ExternalGroup;
    use ct_crypto::{
        make_encryption_key_pair, make_signature_key_pair, seal_encrypt, Hash,
        SealedPrivateEncryptionKey, SealedPrivateSignatureKey, SignatureKeyPair,
    };

    struct Fixture {
        trustchain: TestTrustchain,
        user: TestUser,
        group_signature: SignatureKeyPair,
        creation: Action,
    }

    impl Fixture {
        fn new() -> Self {
            let trustchain = TestTrustchain::new();
            let user = TestUser::new(&trustchain, 1);
            let group_signature = make_signature_key_pair();
            let group_encryption = make_encryption_key_pair();

            let sealed_signature_key = SealedPrivateSignatureKey::from_slice(
                &seal_encrypt(
                    group_signature.private_key.as_ref(),
                    &group_encryption.public_key,
                )
                .unwrap(),
            )
            .unwrap();
            let sealed_for_user = SealedPrivateEncryptionKey::from_slice(
                &seal_encrypt(
                    group_encryption.private_key.as_ref(),
                    &user.user_key_pair.public_key,
                )
                .unwrap(),
            )
            .unwrap();

            let mut payload = UserGroupCreationV1 {
                public_signature_key: group_signature.public_key,
                public_encryption_key: group_encryption.public_key,
                sealed_private_signature_key: sealed_signature_key,
                sealed_private_encryption_keys_for_users: vec![(
                    user.user_key_pair.public_key,
                    sealed_for_user,
                )],
                self_signature: Default::default(),
            };
            payload.self_signature =
                ct_crypto::sign(&payload.signature_data(), &group_signature.private_key);
            let creation = Action::create(
                trustchain.id,
                Hash::from(user.devices[0].device.id),
                Payload::UserGroupCreation1(payload),
                &user.devices[0].signature_key_pair.private_key,
            );

            Self {
                trustchain,
                user,
                group_signature,
                creation,
            }
        }

        fn group(&self) -> Group {
            let Payload::UserGroupCreation1(creation) = &self.creation.payload else {
                unreachable!()
            };
            Group::External(ExternalGroup {
                id: GroupId::from(creation.public_signature_key),
                public_signature_key: creation.public_signature_key,
                sealed_private_signature_key: creation.sealed_private_signature_key,
                public_encryption_key: creation.public_encryption_key,
                last_block_hash: self.creation.hash(),
                last_key_rotation_block_hash: self.creation.hash(),
            })
        }

        fn addition(&self) -> Action {
            let mut payload = UserGroupAdditionV1 {
                group_id: self.group().id(),
                previous_group_block_hash: self.creation.hash(),
                sealed_private_encryption_keys_for_users: vec![(
                    make_encryption_key_pair().public_key,
                    SealedPrivateEncryptionKey::random(),
                )],
                self_signature: Default::default(),
            };
            payload.self_signature =
                ct_crypto::sign(&payload.signature_data(), &self.group_signature.private_key);
            Action::create(
                self.trustchain.id,
                Hash::from(self.user.devices[0].device.id),
                Payload::UserGroupAddition1(payload),
                &self.user.devices[0].signature_key_pair.private_key,
            )
        }
    }

    #[test]
    fn accepts_a_valid_group_creation() {
        let fixture = Fixture::new();
        verify_user_group_creation(&fixture.creation, &fixture.user.devices[0].device, None)
            .unwrap();
    }

    #[test]
    fn rejects_a_creation_for_an_existing_group() {
        let fixture = Fixture::new();
        let group = fixture.group();
        let err = verify_user_group_creation(
            &fixture.creation,
            &fixture.user.devices[0].device,
            Some(&group),
        )
        .unwrap_err();
        assert_eq!(err.kind, Errc::InvalidGroupBlock);
    }

    #[test]
    fn rejects_a_creation_with_no_members() {
        let fixture = Fixture::new();
        let Payload::UserGroupCreation1(mut payload) = fixture.creation.payload.clone() else {
            unreachable!()
        };
        payload.sealed_private_encryption_keys_for_users.clear();
        payload.self_signature =
            ct_crypto::sign(&payload.signature_data(), &fixture.group_signature.private_key);
        let action = Action::create(
            fixture.trustchain.id,
            fixture.creation.author,
            Payload::UserGroupCreation1(payload),
            &fixture.user.devices[0].signature_key_pair.private_key,
        );
        let err =
            verify_user_group_creation(&action, &fixture.user.devices[0].device, None).unwrap_err();
        assert_eq!(err.kind, Errc::InvalidGroupMembers);
    }

    #[test]
    fn rejects_a_creation_with_a_bad_self_signature() {
        let fixture = Fixture::new();
        let Payload::UserGroupCreation1(mut payload) = fixture.creation.payload.clone() else {
            unreachable!()
        };
        payload.self_signature = ct_crypto::Signature::random();
        let action = Action::create(
            fixture.trustchain.id,
            fixture.creation.author,
            Payload::UserGroupCreation1(payload),
            &fixture.user.devices[0].signature_key_pair.private_key,
        );
        let err =
            verify_user_group_creation(&action, &fixture.user.devices[0].device, None).unwrap_err();
        assert_eq!(err.kind, Errc::InvalidSignature);
    }

    #[test]
    fn accepts_a_valid_group_addition() {
        let fixture = Fixture::new();
        let group = fixture.group();
        verify_user_group_addition(
            &fixture.addition(),
            &fixture.user.devices[0].device,
            Some(&group),
        )
        .unwrap();
    }

    #[test]
    fn rejects_an_addition_to_an_unknown_group() {
        let fixture = Fixture::new();
        let err =
            verify_user_group_addition(&fixture.addition(), &fixture.user.devices[0].device, None)
                .unwrap_err();
        assert_eq!(err.kind, Errc::InvalidGroup);
    }

    #[test]
    fn rejects_an_addition_with_a_stale_previous_hash() {
        let fixture = Fixture::new();
        let mut group = fixture.group();
        if let Group::External(external) = &mut group {
            external.last_key_rotation_block_hash = Hash::random();
        }
        let err = verify_user_group_addition(
            &fixture.addition(),
            &fixture.user.devices[0].device,
            Some(&group),
        )
        .unwrap_err();
        assert_eq!(err.kind, Errc::InvalidGroupBlock);
    }

    #[test]
    fn rejects_an_addition_with_a_revoked_author() {
        let fixture = Fixture::new();
        let group = fixture.group();
        let mut device = fixture.user.devices[0].device.clone();
        device.revoked_at = Some(7);
        let err =
            verify_user_group_addition(&fixture.addition(), &device, Some(&group)).unwrap_err();
        assert_eq!(err.kind, Errc::AuthorIsRevoked);
    }
}
