//! The server collaborator contract.
//!
//! The HTTP machinery itself lives outside the core; this module pins down
//! what the core relies on: the operations, the table mapping server error
//! codes to the local taxonomy, and the authentication challenge rules.

use async_trait::async_trait;
use serde::Deserialize;

use ct_crypto::{sign, Signature, SignatureKeyPair, SimpleResourceId};
use ct_proto::{Action, DeviceId, GroupId, UserId};

use crate::error::{Error, ErrorKind, Result};
use crate::verification::VerificationRequest;

/// Servers prepend this sentinel to every authentication challenge. It is
/// MANDATORY to check it before signing, or the server could get an
/// arbitrary payload signed with the device key.
pub const CHALLENGE_PREFIX: &str = "\u{1F512} Auth Challenge. 1234567890.";

/// Validate the challenge sentinel and sign the challenge bytes.
pub fn sign_challenge(
    challenge: &str,
    device_signature_key_pair: &SignatureKeyPair,
) -> Result<Signature> {
    if !challenge.starts_with(CHALLENGE_PREFIX) {
        return Err(Error::internal(
            "received an invalid challenge prefix from the server",
        ));
    }
    Ok(sign(
        challenge.as_bytes(),
        &device_signature_key_pair.private_key,
    ))
}

/// Wire shape of a server error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerError {
    pub code: String,
    pub status: u32,
    pub message: String,
    pub trace_id: String,
}

impl From<ServerError> for Error {
    fn from(error: ServerError) -> Self {
        Error::server(
            error_kind_for_code(&error.code),
            error.code.clone(),
            format!(
                "server error {} (status {}, trace {}): {}",
                error.code, error.status, error.trace_id, error.message
            ),
        )
    }
}

/// Table-driven mapping from server error codes to the local taxonomy.
/// Unknown codes degrade to `InternalError` and are logged by the caller.
pub fn error_kind_for_code(code: &str) -> ErrorKind {
    match code {
        "internal_error" => ErrorKind::InternalError,
        "invalid_body" | "bad_request" => ErrorKind::InvalidArgument,
        "app_not_found" | "user_not_found" | "device_not_found" => ErrorKind::InvalidArgument,
        "provisional_identity_not_found" => ErrorKind::InvalidArgument,
        "provisional_identity_already_attached" => ErrorKind::IdentityAlreadyAttached,
        "too_many_attempts" => ErrorKind::TooManyAttempts,
        "verification_needed" => ErrorKind::PreconditionFailed,
        "invalid_passphrase" | "invalid_verification_code" | "verification_key_not_found"
        | "verification_method_not_set" | "invalid_delegation_signature" => {
            ErrorKind::InvalidVerification
        }
        "verification_code_expired" | "verification_code_not_found" => {
            ErrorKind::ExpiredVerification
        }
        "group_too_big" | "empty_user_group" | "missing_user_group_members"
        | "not_a_user_group_member" => ErrorKind::InvalidArgument,
        "invalid_token" | "invalid_challenge_signature" | "invalid_challenge_public_key" => {
            ErrorKind::InternalError
        }
        "blocked" => ErrorKind::PreconditionFailed,
        "upgrade_required" => ErrorKind::UpgradeRequired,
        "conflict" => ErrorKind::Conflict,
        _ => ErrorKind::InternalError,
    }
}

/// Server codes that make the local device unrecoverable: the session
/// wipes its store and stops.
pub fn is_unrecoverable_code(code: &str) -> bool {
    matches!(code, "device_not_found" | "invalid_challenge_public_key")
}

/// Retry policy for authenticated calls: one `invalid_token` answer
/// triggers a single re-authentication and retry; a second one surfaces
/// as-is (`InternalError` per the code table). Transport implementations
/// wrap their requests with this.
pub async fn with_reauthentication<T, F, Fut, R, RFut>(
    call: F,
    reauthenticate: R,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
    R: FnOnce() -> RFut,
    RFut: std::future::Future<Output = Result<()>>,
{
    match call().await {
        Err(error) if error.server_code.as_deref() == Some("invalid_token") => {
            reauthenticate().await?;
            call().await
        }
        other => other,
    }
}

/// Everything the user must upload to register: the ghost device, the
/// first device, and the encrypted verification key, accepted atomically.
pub struct UserRegistration {
    pub user_id: UserId,
    pub ghost_device_creation: Action,
    pub first_device_creation: Action,
    pub encrypted_verification_key: Vec<u8>,
    pub verification: VerificationRequest,
}

/// Key publishes of one encrypt/share call, posted as one transaction.
#[derive(Default, Debug)]
pub struct ShareActions {
    pub key_publishes_to_users: Vec<Action>,
    pub key_publishes_to_user_groups: Vec<Action>,
    pub key_publishes_to_provisional_users: Vec<Action>,
}

impl ShareActions {
    pub fn is_empty(&self) -> bool {
        self.key_publishes_to_users.is_empty()
            && self.key_publishes_to_user_groups.is_empty()
            && self.key_publishes_to_provisional_users.is_empty()
    }
}

/// Provisional identity halves held by the service, returned at attach
/// time after verification.
pub struct ServiceProvisionalKeys {
    pub signature_key_pair: SignatureKeyPair,
    pub encryption_key_pair: ct_crypto::EncryptionKeyPair,
}

/// The transport surface the core depends on. Implementations own
/// authentication tokens, retries and wire encoding.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Trustchain root action plus the full device history of the users.
    async fn get_users(&self, user_ids: &[UserId]) -> Result<Vec<Action>>;

    /// Same, addressed by device id (used to resolve action authors).
    async fn get_users_by_device(&self, device_ids: &[DeviceId]) -> Result<Vec<Action>>;

    async fn create_user(&self, registration: UserRegistration) -> Result<()>;

    /// Register a new device signed by the ghost device.
    async fn create_device(&self, device_creation: Action) -> Result<()>;

    /// Fetch the encrypted verification key after proving a verification.
    async fn get_verification_key(&self, user_id: &UserId, verification: &VerificationRequest)
        -> Result<Vec<u8>>;

    async fn get_resource_keys(&self, resource_ids: &[SimpleResourceId]) -> Result<Vec<Action>>;

    async fn post_resource_keys(&self, actions: ShareActions) -> Result<()>;

    async fn post_user_group(&self, group_creation: Action) -> Result<()>;

    async fn patch_user_group(&self, group_id: &GroupId, group_addition: Action) -> Result<()>;

    async fn get_group_blocks(&self, group_ids: &[GroupId]) -> Result<Vec<Action>>;

    /// Group chains owning the given public encryption keys.
    async fn get_group_blocks_by_public_key(
        &self,
        keys: &[ct_crypto::PublicEncryptionKey],
    ) -> Result<Vec<Action>>;

    /// Provisional identity claims published by this user.
    async fn get_claim_blocks(&self, user_id: &UserId) -> Result<Vec<Action>>;

    /// Service-side public halves for provisional recipients, keyed by
    /// the identity's target value.
    async fn get_provisional_users(
        &self,
        target_values: &[String],
    ) -> Result<Vec<(String, ct_crypto::PublicSignatureKey, ct_crypto::PublicEncryptionKey)>>;

    /// Claim flow: the service's halves of a provisional identity, gated
    /// by a verification.
    async fn get_service_provisional_keys(
        &self,
        target_value: &str,
        verification: &VerificationRequest,
    ) -> Result<ServiceProvisionalKeys>;

    async fn push_action(&self, action: Action) -> Result<()>;

    /// End the server session. 401 is as acceptable as 204 here; other
    /// failures are logged and swallowed by the session layer.
    async fn delete_session(&self) -> Result<()>;
}
