use crate::actions::Payload;
use crate::envelope::Action;
use crate::ids::DeviceId;
use crate::user::User;

use super::{ensures, Errc, VerifError};

/// A claim is triple-signed: by the claiming device, by the provisional
/// app key, and by the provisional service key.
pub fn verify_provisional_identity_claim(action: &Action, user: &User) -> Result<(), VerifError> {
    let Payload::ProvisionalIdentityClaim(claim) = &action.payload else {
        return Err(VerifError {
            kind: Errc::InvalidNature,
            message: "action is not a provisional identity claim",
        });
    };

    let author_id = DeviceId::from(action.author);
    let author = user.find_device(&author_id).ok_or(VerifError {
        kind: Errc::InvalidAuthor,
        message: "claim author device not found",
    })?;
    ensures(
        !author.is_revoked(),
        Errc::AuthorIsRevoked,
        "author device of a claim is revoked",
    )?;
    ensures(
        claim.user_id == user.id,
        Errc::InvalidUserId,
        "a claim must target the author's own user",
    )?;
    ensures(
        action.verify_signature(&author.public_signature_key),
        Errc::InvalidSignature,
        "claim must be signed by its author device",
    )?;

    let signature_data = claim.signature_data(&author_id);
    ensures(
        ct_crypto::verify(
            &signature_data,
            &claim.author_signature_by_app_key,
            &claim.app_public_signature_key,
        ),
        Errc::InvalidSignature,
        "claim app signature does not verify",
    )?;
    ensures(
        ct_crypto::verify(
            &signature_data,
            &claim.author_signature_by_service_key,
            &claim.service_public_signature_key,
        ),
        Errc::InvalidSignature,
        "claim service signature does not verify",
    )
}
