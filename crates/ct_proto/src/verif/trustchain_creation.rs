use crate::actions::Payload;
use crate::envelope::Action;
use crate::ids::TrustchainId;

use super::{ensures, Errc, VerifError};

/// The root action: self-signed, and its hash *is* the trustchain id.
pub fn verify_trustchain_creation(
    action: &Action,
    trustchain_id: &TrustchainId,
) -> Result<(), VerifError> {
    let Payload::TrustchainCreation(creation) = &action.payload else {
        return Err(VerifError {
            kind: Errc::InvalidNature,
            message: "root action must be a trustchain creation",
        });
    };
    ensures(
        action.author.is_null(),
        Errc::InvalidAuthor,
        "trustchain creation must not have an author",
    )?;
    ensures(
        action.hash() == (*trustchain_id).into(),
        Errc::InvalidHash,
        "trustchain creation hash must equal the trustchain id",
    )?;
    ensures(
        action.verify_signature(&creation.public_signature_key),
        Errc::InvalidSignature,
        "trustchain creation must be signed by its embedded key",
    )
}
