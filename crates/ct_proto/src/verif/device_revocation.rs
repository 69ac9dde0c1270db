use crate::actions::Payload;
use crate::envelope::Action;
use crate::ids::DeviceId;
use crate::user::User;

use super::{ensures, Errc, VerifError};

pub fn verify_device_revocation(action: &Action, user: &User) -> Result<(), VerifError> {
    let author_id = DeviceId::from(action.author);
    let author = user.find_device(&author_id).ok_or(VerifError {
        kind: Errc::InvalidUser,
        message: "a device can only be revoked by another device of its user",
    })?;
    ensures(
        !author.is_revoked(),
        Errc::AuthorIsRevoked,
        "author device of a revocation is revoked",
    )?;
    ensures(
        action.verify_signature(&author.public_signature_key),
        Errc::InvalidSignature,
        "device revocation must be signed by its author device",
    )?;

    let target_id = match &action.payload {
        Payload::DeviceRevocation1(p) => p.device_id,
        Payload::DeviceRevocation2(p) => p.device_id,
        _ => {
            return Err(VerifError {
                kind: Errc::InvalidNature,
                message: "action is not a device revocation",
            })
        }
    };
    let target = user.find_device(&target_id).ok_or(VerifError {
        kind: Errc::InvalidUser,
        message: "the target of a revocation must be owned by the author's user",
    })?;
    ensures(
        !target.is_revoked(),
        Errc::InvalidTargetDevice,
        "the target of a revocation is already revoked",
    )?;

    match &action.payload {
        Payload::DeviceRevocation1(_) => ensures(
            user.user_key.is_none(),
            Errc::InvalidUserKey,
            "a revocation v1 cannot target a user with a user key",
        ),
        Payload::DeviceRevocation2(revocation) => {
            match &user.user_key {
                None => {
                    ensures(
                        revocation.previous_public_encryption_key.is_null(),
                        Errc::InvalidEncryptionKey,
                        "revocation v2 of a keyless user must have a null previous key",
                    )?;
                    ensures(
                        revocation.sealed_key_for_previous_user_key.is_null(),
                        Errc::InvalidUserKey,
                        "revocation v2 of a keyless user must have a null sealed previous key",
                    )?;
                }
                Some(user_key) => {
                    ensures(
                        revocation.previous_public_encryption_key == *user_key,
                        Errc::InvalidEncryptionKey,
                        "revocation v2 previous key must equal the user's current key",
                    )?;
                }
            }

            let unrevoked = user.devices.iter().filter(|d| !d.is_revoked()).count();
            ensures(
                revocation.sealed_user_keys_for_devices.len() == unrevoked - 1,
                Errc::InvalidUserKeys,
                "revocation v2 must seal the new key to every remaining device",
            )?;
            for (device_id, _) in &revocation.sealed_user_keys_for_devices {
                ensures(
                    *device_id != target_id,
                    Errc::InvalidUserKeys,
                    "revocation v2 must not seal a key to the revoked device",
                )?;
                ensures(
                    user.find_device(device_id).is_some(),
                    Errc::InvalidUserKeys,
                    "revocation v2 must not seal a key to another user's device",
                )?;
            }
            let mut ids: Vec<_> = revocation
                .sealed_user_keys_for_devices
                .iter()
                .map(|(id, _)| *id)
                .collect();
            ids.sort();
            ids.dedup();
            ensures(
                ids.len() == revocation.sealed_user_keys_for_devices.len(),
                Errc::InvalidUserKeys,
                "revocation v2 must not seal a key to the same device twice",
            )
        }
        _ => unreachable!("nature checked above"),
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{TestTrustchain, TestUser};
    use super::*;
    use crate::actions::DeviceRevocationV2;
    use ct_crypto::{
        make_encryption_key_pair, seal_encrypt, Hash, SealedPrivateEncryptionKey,
    };

    struct Fixture {
        trustchain: TestTrustchain,
        user: TestUser,
    }

    impl Fixture {
        fn new() -> Self {
            let trustchain = TestTrustchain::new();
            let user = TestUser::new(&trustchain, 2);
            Self { trustchain, user }
        }

        /// A valid v2 revocation of device 1 authored by device 0.
        fn revocation(&self) -> Action {
            let new_user_key = make_encryption_key_pair();
            let sealed_previous = SealedPrivateEncryptionKey::from_slice(
                &seal_encrypt(
                    self.user.user_key_pair.private_key.as_ref(),
                    &new_user_key.public_key,
                )
                .unwrap(),
            )
            .unwrap();
            let sealed_for_author = SealedPrivateEncryptionKey::from_slice(
                &seal_encrypt(
                    new_user_key.private_key.as_ref(),
                    &self.user.devices[0].encryption_key_pair.public_key,
                )
                .unwrap(),
            )
            .unwrap();
            Action::create(
                self.trustchain.id,
                Hash::from(self.user.devices[0].device.id),
                Payload::DeviceRevocation2(DeviceRevocationV2 {
                    device_id: self.user.devices[1].device.id,
                    public_encryption_key: new_user_key.public_key,
                    previous_public_encryption_key: self.user.user_key_pair.public_key,
                    sealed_key_for_previous_user_key: sealed_previous,
                    sealed_user_keys_for_devices: vec![(
                        self.user.devices[0].device.id,
                        sealed_for_author,
                    )],
                }),
                &self.user.devices[0].signature_key_pair.private_key,
            )
        }
    }

    #[test]
    fn accepts_a_valid_revocation() {
        let fixture = Fixture::new();
        verify_device_revocation(&fixture.revocation(), &fixture.user.user).unwrap();
    }

    #[test]
    fn rejects_a_foreign_author() {
        let fixture = Fixture::new();
        let other = TestUser::new(&fixture.trustchain, 1);
        let err = verify_device_revocation(&fixture.revocation(), &other.user).unwrap_err();
        assert_eq!(err.kind, Errc::InvalidUser);
    }

    #[test]
    fn rejects_a_revoked_author() {
        let fixture = Fixture::new();
        let action = fixture.revocation();
        let mut user = fixture.user.user.clone();
        user.devices[0].revoked_at = Some(3);
        let err = verify_device_revocation(&action, &user).unwrap_err();
        assert_eq!(err.kind, Errc::AuthorIsRevoked);
    }

    #[test]
    fn rejects_an_already_revoked_target() {
        let fixture = Fixture::new();
        let action = fixture.revocation();
        let mut user = fixture.user.user.clone();
        user.devices[1].revoked_at = Some(3);
        let err = verify_device_revocation(&action, &user).unwrap_err();
        assert_eq!(err.kind, Errc::InvalidTargetDevice);
    }

    #[test]
    fn rejects_a_wrong_previous_key() {
        let fixture = Fixture::new();
        let mut action = fixture.revocation();
        if let Payload::DeviceRevocation2(revocation) = &mut action.payload {
            revocation.previous_public_encryption_key = make_encryption_key_pair().public_key;
        }
        // Re-sign: only the previous-key rule should fire.
        let resigned = Action::create(
            action.trustchain_id,
            action.author,
            action.payload.clone(),
            &fixture.user.devices[0].signature_key_pair.private_key,
        );
        let err = verify_device_revocation(&resigned, &fixture.user.user).unwrap_err();
        assert_eq!(err.kind, Errc::InvalidEncryptionKey);
    }

    #[test]
    fn rejects_a_seal_addressed_to_the_target() {
        let fixture = Fixture::new();
        let mut action = fixture.revocation();
        if let Payload::DeviceRevocation2(revocation) = &mut action.payload {
            let sealed = revocation.sealed_user_keys_for_devices[0].1;
            revocation
                .sealed_user_keys_for_devices
                .push((fixture.user.devices[1].device.id, sealed));
        }
        let resigned = Action::create(
            action.trustchain_id,
            action.author,
            action.payload.clone(),
            &fixture.user.devices[0].signature_key_pair.private_key,
        );
        let err = verify_device_revocation(&resigned, &fixture.user.user).unwrap_err();
        assert_eq!(err.kind, Errc::InvalidUserKeys);
    }

    #[test]
    fn rejects_a_missing_seal() {
        let fixture = Fixture::new();
        let mut action = fixture.revocation();
        if let Payload::DeviceRevocation2(revocation) = &mut action.payload {
            revocation.sealed_user_keys_for_devices.clear();
        }
        let resigned = Action::create(
            action.trustchain_id,
            action.author,
            action.payload.clone(),
            &fixture.user.devices[0].signature_key_pair.private_key,
        );
        let err = verify_device_revocation(&resigned, &fixture.user.user).unwrap_err();
        assert_eq!(err.kind, Errc::InvalidUserKeys);
    }

    #[test]
    fn rejects_a_bad_signature() {
        let fixture = Fixture::new();
        let mut action = fixture.revocation();
        action.signature = ct_crypto::Signature::random();
        let err = verify_device_revocation(&action, &fixture.user.user).unwrap_err();
        assert_eq!(err.kind, Errc::InvalidSignature);
    }
}
