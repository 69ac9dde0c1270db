//! Identity verification material.
//!
//! The verification key encodes the ghost device: whoever holds it can
//! sign new devices into the user's chain. It is stored server-side
//! encrypted under the user secret.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use ct_crypto::{
    encryption_key_pair_from_private, signature_key_pair_from_private, EncryptionKeyPair,
    PrivateEncryptionKey, PrivateSignatureKey, SignatureKeyPair, SymmetricKey,
};

use crate::error::{Error, ErrorKind, Result};

/// How the user proves their identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The raw verification key (base64 JSON of the ghost device).
    VerificationKey(String),
    Passphrase(String),
    EmailVerificationCode { email: String, code: String },
}

/// Wire form of a verification, opaque to the core: the transport encodes
/// it into the server's request bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub method: &'static str,
    pub value: String,
    pub proof: String,
}

impl Verification {
    pub fn to_request(&self) -> VerificationRequest {
        match self {
            Verification::VerificationKey(_) => VerificationRequest {
                method: "verification_key",
                value: String::new(),
                proof: String::new(),
            },
            Verification::Passphrase(passphrase) => VerificationRequest {
                method: "passphrase",
                value: String::new(),
                // The server stores a hash of the passphrase, never the
                // passphrase itself.
                proof: hex::encode(ct_crypto::generic_hash(passphrase.as_bytes())),
            },
            Verification::EmailVerificationCode { email, code } => VerificationRequest {
                method: "email",
                value: email.clone(),
                proof: code.clone(),
            },
        }
    }
}

/// The ghost device key pairs, as serialized inside a verification key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostDevice {
    pub signature_key_pair: SignatureKeyPair,
    pub encryption_key_pair: EncryptionKeyPair,
}

#[derive(Serialize, Deserialize)]
struct GhostDeviceJson {
    #[serde(rename = "privateSignatureKey")]
    private_signature_key: String,
    #[serde(rename = "privateEncryptionKey")]
    private_encryption_key: String,
}

impl GhostDevice {
    pub fn generate() -> Self {
        Self {
            signature_key_pair: ct_crypto::make_signature_key_pair(),
            encryption_key_pair: ct_crypto::make_encryption_key_pair(),
        }
    }

    /// The verification key is the base64 JSON of the ghost private keys.
    pub fn to_verification_key(&self) -> String {
        let json = GhostDeviceJson {
            private_signature_key: BASE64.encode(self.signature_key_pair.private_key.as_ref()),
            private_encryption_key: BASE64.encode(self.encryption_key_pair.private_key.as_ref()),
        };
        BASE64.encode(serde_json::to_vec(&json).expect("ghost device JSON cannot fail"))
    }

    pub fn from_verification_key(verification_key: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(verification_key.trim())
            .map_err(|_| invalid("verification key is not valid base64"))?;
        let json: GhostDeviceJson =
            serde_json::from_slice(&bytes).map_err(|_| invalid("verification key is not valid JSON"))?;
        let private_signature_key = PrivateSignatureKey::from_slice(
            &BASE64
                .decode(&json.private_signature_key)
                .map_err(|_| invalid("bad ghost signature key encoding"))?,
        )
        .map_err(|_| invalid("bad ghost signature key size"))?;
        let private_encryption_key = PrivateEncryptionKey::from_slice(
            &BASE64
                .decode(&json.private_encryption_key)
                .map_err(|_| invalid("bad ghost encryption key encoding"))?,
        )
        .map_err(|_| invalid("bad ghost encryption key size"))?;
        Ok(Self {
            signature_key_pair: signature_key_pair_from_private(private_signature_key)
                .map_err(|_| invalid("inconsistent ghost signature key"))?,
            encryption_key_pair: encryption_key_pair_from_private(private_encryption_key),
        })
    }
}

fn invalid(message: &'static str) -> Error {
    Error::new(ErrorKind::InvalidVerification, message)
}

/// Encrypt the verification key under the user secret for server escrow.
pub fn encrypt_verification_key(
    storage_key: &SymmetricKey,
    verification_key: &str,
) -> Result<Vec<u8>> {
    Ok(ct_encryptor::v2::encrypt(
        verification_key.as_bytes(),
        storage_key,
    )?)
}

pub fn decrypt_verification_key(
    storage_key: &SymmetricKey,
    encrypted: &[u8],
) -> Result<String> {
    let clear = ct_encryptor::v2::decrypt(storage_key, encrypted)
        .map_err(|_| invalid("could not decrypt the verification key"))?;
    String::from_utf8(clear).map_err(|_| invalid("verification key is not valid UTF-8"))
}
