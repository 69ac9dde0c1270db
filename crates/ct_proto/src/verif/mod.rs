//! Stateless verification rules.
//!
//! Each rule takes a candidate action plus the already-verified prior state
//! it needs (trustchain key, user devices, group view) and answers
//! accept/reject with a precise error kind. Rules never mutate state;
//! applying accepted actions is the accessors' job. A rejected action is
//! fatal to that action only; callers log it and keep going.

mod device_creation;
mod device_revocation;
mod key_publish;
mod provisional_identity_claim;
mod trustchain_creation;
mod user_group;

pub use device_creation::{verify_device_creation, DeviceCreationContext};
pub use device_revocation::verify_device_revocation;
pub use key_publish::verify_key_publish;
pub use provisional_identity_claim::verify_provisional_identity_claim;
pub use trustchain_creation::verify_trustchain_creation;
pub use user_group::{verify_user_group_addition, verify_user_group_creation};

use thiserror::Error;

/// Rule families; every rejection names exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Errc {
    InvalidNature,
    InvalidAuthor,
    InvalidHash,
    InvalidSignature,
    InvalidDelegationSignature,
    InvalidUser,
    InvalidUserId,
    InvalidUserKey,
    InvalidUserKeys,
    InvalidEncryptionKey,
    InvalidTargetDevice,
    AuthorIsRevoked,
    InvalidGroup,
    InvalidGroupBlock,
    InvalidGroupMembers,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct VerifError {
    pub kind: Errc,
    pub message: &'static str,
}

pub(crate) fn ensures(condition: bool, kind: Errc, message: &'static str) -> Result<(), VerifError> {
    if condition {
        Ok(())
    } else {
        Err(VerifError { kind, message })
    }
}
