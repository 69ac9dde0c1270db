//! Identity parsing.
//!
//! Identities travel as base64 of a UTF-8 JSON object. A secret permanent
//! identity carries the delegation material and the user secret; public
//! identities only name their target; provisional identities carry the two
//! provisional key pairs.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use ct_crypto::{
    signature_key_pair_from_private, EncryptionKeyPair, PrivateEncryptionKey,
    PrivateSignatureKey, PublicEncryptionKey, PublicSignatureKey, Signature, SignatureKeyPair,
};
use ct_proto::{TrustchainId, UserId};

use crate::error::{Error, ErrorKind, Result};

/// The 32-byte secret every identity carries; storage keys derive from it.
pub type UserSecret = [u8; 32];

/// Delegation from the trustchain root to an ephemeral key for this user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub ephemeral_key_pair: SignatureKeyPair,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretIdentity {
    pub trustchain_id: TrustchainId,
    pub user_id: UserId,
    pub delegation: Delegation,
    pub user_secret: UserSecret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicIdentityTarget {
    User,
    Email,
    PhoneNumber,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicIdentity {
    pub trustchain_id: TrustchainId,
    pub target: PublicIdentityTarget,
    /// The user id for permanent identities, the hashed email/phone plus
    /// public keys for provisional ones.
    pub value: String,
    pub public_signature_key: Option<PublicSignatureKey>,
    pub public_encryption_key: Option<PublicEncryptionKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretProvisionalIdentity {
    pub trustchain_id: TrustchainId,
    pub target: PublicIdentityTarget,
    pub value: String,
    pub app_signature_key_pair: SignatureKeyPair,
    pub app_encryption_key_pair: EncryptionKeyPair,
}

#[derive(Serialize, Deserialize)]
struct IdentityJson {
    trustchain_id: String,
    target: String,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    delegation_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ephemeral_public_signature_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ephemeral_private_signature_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_signature_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    private_signature_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_encryption_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    private_encryption_key: Option<String>,
}

fn parse_json(identity: &str) -> Result<IdentityJson> {
    let bytes = BASE64
        .decode(identity.trim())
        .map_err(|_| Error::invalid_argument("identity is not valid base64"))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::invalid_argument(format!("identity is not valid JSON: {e}")))
}

fn decode_field<T>(field: Option<&String>, name: &str) -> Result<T>
where
    T: for<'a> TryFrom<&'a [u8], Error = ct_crypto::CryptoError>,
{
    let value = field
        .ok_or_else(|| Error::invalid_argument(format!("identity is missing field {name}")))?;
    let bytes = BASE64
        .decode(value)
        .map_err(|_| Error::invalid_argument(format!("identity field {name} is not base64")))?;
    T::try_from(bytes.as_slice())
        .map_err(|_| Error::invalid_argument(format!("identity field {name} has a bad size")))
}

fn parse_target(target: &str) -> Result<PublicIdentityTarget> {
    match target {
        "user" => Ok(PublicIdentityTarget::User),
        "email" => Ok(PublicIdentityTarget::Email),
        "phone_number" => Ok(PublicIdentityTarget::PhoneNumber),
        other => Err(Error::invalid_argument(format!(
            "unsupported identity target {other:?}"
        ))),
    }
}

pub fn parse_secret_identity(identity: &str) -> Result<SecretIdentity> {
    let json = parse_json(identity)?;
    if json.target != "user" {
        return Err(Error::invalid_argument(
            "secret identity target must be \"user\"",
        ));
    }
    let private_key: PrivateSignatureKey =
        decode_field(json.ephemeral_private_signature_key.as_ref(), "ephemeral_private_signature_key")?;
    let ephemeral_key_pair = signature_key_pair_from_private(private_key)
        .map_err(|e| Error::invalid_argument(format!("bad ephemeral key: {e}")))?;
    let declared_public: PublicSignatureKey =
        decode_field(json.ephemeral_public_signature_key.as_ref(), "ephemeral_public_signature_key")?;
    if declared_public != ephemeral_key_pair.public_key {
        return Err(Error::invalid_argument(
            "ephemeral signature keys do not match",
        ));
    }
    let user_secret_bytes = BASE64
        .decode(
            json.user_secret
                .as_ref()
                .ok_or_else(|| Error::invalid_argument("identity is missing field user_secret"))?,
        )
        .map_err(|_| Error::invalid_argument("identity field user_secret is not base64"))?;
    let user_secret: UserSecret = user_secret_bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::invalid_argument("user secret must be 32 bytes"))?;

    Ok(SecretIdentity {
        trustchain_id: decode_field(Some(&json.trustchain_id), "trustchain_id")?,
        user_id: decode_field(Some(&json.value), "value")?,
        delegation: Delegation {
            ephemeral_key_pair,
            signature: decode_field(json.delegation_signature.as_ref(), "delegation_signature")?,
        },
        user_secret,
    })
}

pub fn parse_public_identity(identity: &str) -> Result<PublicIdentity> {
    let json = parse_json(identity)?;
    let target = parse_target(&json.target)?;
    let (public_signature_key, public_encryption_key) = match target {
        PublicIdentityTarget::User => (None, None),
        _ => (
            Some(decode_field(
                json.public_signature_key.as_ref(),
                "public_signature_key",
            )?),
            Some(decode_field(
                json.public_encryption_key.as_ref(),
                "public_encryption_key",
            )?),
        ),
    };
    Ok(PublicIdentity {
        trustchain_id: decode_field(Some(&json.trustchain_id), "trustchain_id")?,
        target,
        value: json.value,
        public_signature_key,
        public_encryption_key,
    })
}

pub fn parse_secret_provisional_identity(identity: &str) -> Result<SecretProvisionalIdentity> {
    let json = parse_json(identity)?;
    let target = parse_target(&json.target)?;
    if target == PublicIdentityTarget::User {
        return Err(Error::new(
            ErrorKind::InvalidArgument,
            "a provisional identity cannot target \"user\"",
        ));
    }
    let private_signature_key: PrivateSignatureKey =
        decode_field(json.private_signature_key.as_ref(), "private_signature_key")?;
    let app_signature_key_pair = signature_key_pair_from_private(private_signature_key)
        .map_err(|e| Error::invalid_argument(format!("bad provisional signature key: {e}")))?;
    let private_encryption_key: PrivateEncryptionKey =
        decode_field(json.private_encryption_key.as_ref(), "private_encryption_key")?;
    Ok(SecretProvisionalIdentity {
        trustchain_id: decode_field(Some(&json.trustchain_id), "trustchain_id")?,
        target,
        value: json.value,
        app_signature_key_pair,
        app_encryption_key_pair: ct_crypto::encryption_key_pair_from_private(
            private_encryption_key,
        ),
    })
}

/// The public identity matching a secret permanent identity.
pub fn public_identity_of(identity: &SecretIdentity) -> PublicIdentity {
    PublicIdentity {
        trustchain_id: identity.trustchain_id,
        target: PublicIdentityTarget::User,
        value: BASE64.encode(identity.user_id.as_ref()),
        public_signature_key: None,
        public_encryption_key: None,
    }
}

/// Serialize a public identity to its base64 JSON transport form.
pub fn serialize_public_identity(identity: &PublicIdentity) -> String {
    let json = IdentityJson {
        trustchain_id: BASE64.encode(identity.trustchain_id.as_ref()),
        target: match identity.target {
            PublicIdentityTarget::User => "user",
            PublicIdentityTarget::Email => "email",
            PublicIdentityTarget::PhoneNumber => "phone_number",
        }
        .into(),
        value: identity.value.clone(),
        delegation_signature: None,
        ephemeral_public_signature_key: None,
        ephemeral_private_signature_key: None,
        user_secret: None,
        public_signature_key: identity
            .public_signature_key
            .map(|key| BASE64.encode(key.as_ref())),
        private_signature_key: None,
        public_encryption_key: identity
            .public_encryption_key
            .map(|key| BASE64.encode(key.as_ref())),
        private_encryption_key: None,
    };
    BASE64.encode(serde_json::to_vec(&json).expect("identity JSON serialization cannot fail"))
}

/// Serialize a secret provisional identity (tooling and tests).
pub fn serialize_secret_provisional_identity(identity: &SecretProvisionalIdentity) -> String {
    let json = IdentityJson {
        trustchain_id: BASE64.encode(identity.trustchain_id.as_ref()),
        target: match identity.target {
            PublicIdentityTarget::User => "user",
            PublicIdentityTarget::Email => "email",
            PublicIdentityTarget::PhoneNumber => "phone_number",
        }
        .into(),
        value: identity.value.clone(),
        delegation_signature: None,
        ephemeral_public_signature_key: None,
        ephemeral_private_signature_key: None,
        user_secret: None,
        public_signature_key: Some(
            BASE64.encode(identity.app_signature_key_pair.public_key.as_ref()),
        ),
        private_signature_key: Some(
            BASE64.encode(identity.app_signature_key_pair.private_key.as_ref()),
        ),
        public_encryption_key: Some(
            BASE64.encode(identity.app_encryption_key_pair.public_key.as_ref()),
        ),
        private_encryption_key: Some(
            BASE64.encode(identity.app_encryption_key_pair.private_key.as_ref()),
        ),
    };
    BASE64.encode(serde_json::to_vec(&json).expect("identity JSON serialization cannot fail"))
}

/// The public half of a secret provisional identity.
pub fn public_provisional_identity_of(identity: &SecretProvisionalIdentity) -> PublicIdentity {
    PublicIdentity {
        trustchain_id: identity.trustchain_id,
        target: identity.target.clone(),
        value: identity.value.clone(),
        public_signature_key: Some(identity.app_signature_key_pair.public_key),
        public_encryption_key: Some(identity.app_encryption_key_pair.public_key),
    }
}

/// Serialize a secret identity back to its base64 JSON transport form.
/// Mostly used by tests and tooling that mint identities.
pub fn serialize_secret_identity(identity: &SecretIdentity) -> String {
    let json = IdentityJson {
        trustchain_id: BASE64.encode(identity.trustchain_id.as_ref()),
        target: "user".into(),
        value: BASE64.encode(identity.user_id.as_ref()),
        delegation_signature: Some(BASE64.encode(identity.delegation.signature.as_ref())),
        ephemeral_public_signature_key: Some(
            BASE64.encode(identity.delegation.ephemeral_key_pair.public_key.as_ref()),
        ),
        ephemeral_private_signature_key: Some(
            BASE64.encode(identity.delegation.ephemeral_key_pair.private_key.as_ref()),
        ),
        user_secret: Some(BASE64.encode(identity.user_secret)),
        public_signature_key: None,
        private_signature_key: None,
        public_encryption_key: None,
        private_encryption_key: None,
    };
    BASE64.encode(serde_json::to_vec(&json).expect("identity JSON serialization cannot fail"))
}
