use ct_crypto::PublicSignatureKey;

use crate::actions::{DeviceCreationV1, Payload};
use crate::envelope::Action;
use crate::user::{Device, User};

use super::{ensures, Errc, VerifError};

/// Who authorized the new device.
pub enum DeviceCreationContext<'a> {
    /// First device of a user: delegated by the trustchain root key.
    Root {
        trustchain_public_key: &'a PublicSignatureKey,
    },
    /// Later device: delegated by an existing device of the same user.
    Device {
        author_device: &'a Device,
        user: &'a User,
    },
}

pub fn verify_device_creation(
    action: &Action,
    context: &DeviceCreationContext<'_>,
) -> Result<(), VerifError> {
    let (common, user_key, is_v1_layout) = match &action.payload {
        Payload::DeviceCreation1(p) | Payload::DeviceCreation2(p) => (p.clone(), None, true),
        Payload::DeviceCreation3(p) => (
            DeviceCreationV1 {
                ephemeral_public_signature_key: p.ephemeral_public_signature_key,
                user_id: p.user_id,
                delegation_signature: p.delegation_signature,
                public_signature_key: p.public_signature_key,
                public_encryption_key: p.public_encryption_key,
            },
            Some(p.public_user_encryption_key),
            false,
        ),
        _ => {
            return Err(VerifError {
                kind: Errc::InvalidNature,
                message: "action is not a device creation",
            })
        }
    };

    let delegation_data = DeviceCreationV1::delegation_signature_data(
        &common.ephemeral_public_signature_key,
        &common.user_id,
    );

    let parent_key = match context {
        DeviceCreationContext::Root {
            trustchain_public_key,
        } => **trustchain_public_key,
        DeviceCreationContext::Device {
            author_device,
            user,
        } => {
            ensures(
                !author_device.is_revoked(),
                Errc::AuthorIsRevoked,
                "author device of a device creation is revoked",
            )?;
            ensures(
                user.id == common.user_id,
                Errc::InvalidUserId,
                "a device can only be created by a device of the same user",
            )?;
            author_device.public_signature_key
        }
    };

    ensures(
        ct_crypto::verify(&delegation_data, &common.delegation_signature, &parent_key),
        Errc::InvalidDelegationSignature,
        "delegation signature does not verify under the parent key",
    )?;
    ensures(
        action.verify_signature(&common.ephemeral_public_signature_key),
        Errc::InvalidSignature,
        "device creation must be signed by its ephemeral key",
    )?;

    match (is_v1_layout, user_key, context) {
        // v1/v2 devices predate user keys; reject them once the user has one.
        (true, _, DeviceCreationContext::Device { user, .. }) => ensures(
            user.user_key.is_none(),
            Errc::InvalidUserKey,
            "legacy device creation on a user that has a user key",
        ),
        (true, _, DeviceCreationContext::Root { .. }) => Ok(()),
        (false, Some(key), context) => {
            ensures(
                !key.is_null(),
                Errc::InvalidUserKey,
                "device creation v3 must carry a user key",
            )?;
            if let DeviceCreationContext::Device { user, .. } = context {
                if let Some(current) = &user.user_key {
                    return ensures(
                        key == *current,
                        Errc::InvalidUserKey,
                        "device creation v3 user key differs from the user's key",
                    );
                }
            }
            Ok(())
        }
        (false, None, _) => unreachable!("v3 always carries a user key"),
    }
}
