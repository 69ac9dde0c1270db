use crate::envelope::Action;
use crate::user::Device;

use super::{ensures, Errc, VerifError};

/// Key publishes carry their recipient key unverified; a wrong recipient
/// simply fails to decrypt later. Only authorship is checked here.
pub fn verify_key_publish(action: &Action, author_device: &Device) -> Result<(), VerifError> {
    ensures(
        action.nature().is_key_publish(),
        Errc::InvalidNature,
        "action is not a key publish",
    )?;
    ensures(
        !author_device.is_revoked(),
        Errc::AuthorIsRevoked,
        "author device of a key publish is revoked",
    )?;
    ensures(
        action.verify_signature(&author_device.public_signature_key),
        Errc::InvalidSignature,
        "key publish must be signed by its author device",
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_helpers::{TestTrustchain, TestUser};
    use super::*;
    use crate::actions::{KeyPublishToUser, Payload};
    use ct_crypto::{Hash, SealedSymmetricKey, SimpleResourceId};

    fn publish(trustchain: &TestTrustchain, user: &TestUser) -> Action {
        Action::create(
            trustchain.id,
            Hash::from(user.devices[0].device.id),
            Payload::KeyPublishToUser(KeyPublishToUser {
                recipient_public_encryption_key: user.user_key_pair.public_key,
                resource_id: SimpleResourceId::random(),
                sealed_symmetric_key: SealedSymmetricKey::random(),
            }),
            &user.devices[0].signature_key_pair.private_key,
        )
    }

    #[test]
    fn accepts_a_valid_key_publish() {
        let trustchain = TestTrustchain::new();
        let user = TestUser::new(&trustchain, 1);
        verify_key_publish(&publish(&trustchain, &user), &user.devices[0].device).unwrap();
    }

    #[test]
    fn rejects_a_revoked_author() {
        let trustchain = TestTrustchain::new();
        let user = TestUser::new(&trustchain, 1);
        let action = publish(&trustchain, &user);
        let mut device = user.devices[0].device.clone();
        device.revoked_at = Some(1);
        let err = verify_key_publish(&action, &device).unwrap_err();
        assert_eq!(err.kind, Errc::AuthorIsRevoked);
    }

    #[test]
    fn rejects_a_foreign_signature() {
        let trustchain = TestTrustchain::new();
        let user = TestUser::new(&trustchain, 2);
        let mut action = publish(&trustchain, &user);
        action.signature = ct_crypto::sign(
            action.hash().as_ref(),
            &user.devices[1].signature_key_pair.private_key,
        );
        let err = verify_key_publish(&action, &user.devices[0].device).unwrap_err();
        assert_eq!(err.kind, Errc::InvalidSignature);
    }
}
