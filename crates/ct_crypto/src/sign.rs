//! Ed25519 detached signatures.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::CryptoError;
use crate::types::{PrivateSignatureKey, PublicSignatureKey, Signature, SignatureKeyPair};

pub fn make_signature_key_pair() -> SignatureKeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    SignatureKeyPair {
        public_key: PublicSignatureKey::new(signing_key.verifying_key().to_bytes()),
        private_key: PrivateSignatureKey::new(signing_key.to_keypair_bytes()),
    }
}

/// Rebuild the full key pair from the 64-byte private encoding.
pub fn signature_key_pair_from_private(
    private_key: PrivateSignatureKey,
) -> Result<SignatureKeyPair, CryptoError> {
    let signing_key = signing_key(&private_key)?;
    Ok(SignatureKeyPair {
        public_key: PublicSignatureKey::new(signing_key.verifying_key().to_bytes()),
        private_key,
    })
}

pub fn sign(data: &[u8], private_key: &PrivateSignatureKey) -> Signature {
    // The keypair bytes were validated at construction, and a seed alone
    // can always sign.
    let signing_key = SigningKey::from_bytes(
        private_key.as_bytes()[..32]
            .try_into()
            .expect("keypair bytes hold a 32-byte seed"),
    );
    Signature::new(signing_key.sign(data).to_bytes())
}

pub fn verify(data: &[u8], signature: &Signature, public_key: &PublicSignatureKey) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key.as_bytes()) else {
        return false;
    };
    let signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    verifying_key.verify(data, &signature).is_ok()
}

fn signing_key(private_key: &PrivateSignatureKey) -> Result<SigningKey, CryptoError> {
    SigningKey::from_keypair_bytes(private_key.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}
