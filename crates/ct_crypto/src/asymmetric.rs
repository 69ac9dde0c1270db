//! Curve25519 public-key encryption: authenticated box and anonymous seal.
//!
//! Box wire format: `ciphertext || mac || nonce(24)`; the random nonce
//! trails the ciphertext.
//!
//! Seal wire format: `ephemeral_pk(32) || ciphertext || mac`. The nonce is
//! implicit: BLAKE2b-24 of `ephemeral_pk || recipient_pk`. Overhead is a
//! constant 48 bytes regardless of plaintext length.

use crypto_box::aead::{Aead, Payload};
use crypto_box::{ChaChaBox, Nonce, PublicKey, SecretKey};
use rand::rngs::OsRng;
use x25519_dalek::StaticSecret;

use crate::error::CryptoError;
use crate::hash::blake2b;
use crate::types::{
    AeadIv, EncryptionKeyPair, Mac, PrivateEncryptionKey, PublicEncryptionKey,
};

/// Extra bytes added by one `seal_encrypt`: ephemeral public key + MAC.
pub const SEAL_OVERHEAD: usize = PublicEncryptionKey::SIZE + Mac::SIZE;

/// Extra bytes added by one `box_encrypt`: MAC + trailing nonce.
pub const BOX_OVERHEAD: usize = Mac::SIZE + AeadIv::SIZE;

pub fn make_encryption_key_pair() -> EncryptionKeyPair {
    let secret = StaticSecret::random_from_rng(OsRng);
    EncryptionKeyPair {
        public_key: PublicEncryptionKey::new(x25519_dalek::PublicKey::from(&secret).to_bytes()),
        private_key: PrivateEncryptionKey::new(secret.to_bytes()),
    }
}

/// Recompute the public half of an X25519 secret.
pub fn encryption_key_pair_from_private(private_key: PrivateEncryptionKey) -> EncryptionKeyPair {
    let secret = StaticSecret::from(*private_key.as_bytes());
    EncryptionKeyPair {
        public_key: PublicEncryptionKey::new(x25519_dalek::PublicKey::from(&secret).to_bytes()),
        private_key,
    }
}

pub fn box_encrypt(
    clear_data: &[u8],
    sender_key: &PrivateEncryptionKey,
    recipient_key: &PublicEncryptionKey,
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaChaBox::new(
        &PublicKey::from(*recipient_key.as_bytes()),
        &SecretKey::from(*sender_key.as_bytes()),
    );
    let nonce = AeadIv::random();
    let mut out = cipher
        .encrypt(
            Nonce::from_slice(nonce.as_ref()),
            Payload {
                msg: clear_data,
                aad: &[],
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;
    out.extend_from_slice(nonce.as_ref());
    Ok(out)
}

pub fn box_decrypt(
    encrypted_data: &[u8],
    recipient_key: &PrivateEncryptionKey,
    sender_key: &PublicEncryptionKey,
) -> Result<Vec<u8>, CryptoError> {
    if encrypted_data.len() < BOX_OVERHEAD {
        return Err(CryptoError::TruncatedBuffer);
    }
    let (cipher_text, nonce) = encrypted_data.split_at(encrypted_data.len() - AeadIv::SIZE);
    let cipher = ChaChaBox::new(
        &PublicKey::from(*sender_key.as_bytes()),
        &SecretKey::from(*recipient_key.as_bytes()),
    );
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: cipher_text,
                aad: &[],
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed("asymmetric decryption failed"))
}

/// Anonymous one-shot encryption to a public key.
pub fn seal_encrypt(
    clear_data: &[u8],
    recipient_key: &PublicEncryptionKey,
) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral);
    let nonce = seal_nonce(&ephemeral_public.to_bytes(), recipient_key.as_bytes());
    let cipher = ChaChaBox::new(
        &PublicKey::from(*recipient_key.as_bytes()),
        &SecretKey::from(ephemeral.to_bytes()),
    );
    let cipher_text = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: clear_data,
                aad: &[],
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut out = Vec::with_capacity(clear_data.len() + SEAL_OVERHEAD);
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&cipher_text);
    Ok(out)
}

pub fn seal_decrypt(
    encrypted_data: &[u8],
    recipient_key_pair: &EncryptionKeyPair,
) -> Result<Vec<u8>, CryptoError> {
    if encrypted_data.len() < SEAL_OVERHEAD {
        return Err(CryptoError::TruncatedBuffer);
    }
    let (ephemeral_public, cipher_text) = encrypted_data.split_at(PublicEncryptionKey::SIZE);
    let ephemeral_bytes: [u8; 32] = ephemeral_public
        .try_into()
        .expect("split_at yields exactly 32 bytes");
    let nonce = seal_nonce(&ephemeral_bytes, recipient_key_pair.public_key.as_bytes());
    let cipher = ChaChaBox::new(
        &PublicKey::from(ephemeral_bytes),
        &SecretKey::from(*recipient_key_pair.private_key.as_bytes()),
    );
    cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: cipher_text,
                aad: &[],
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed("asymmetric decryption failed"))
}

fn seal_nonce(ephemeral_public: &[u8; 32], recipient_public: &[u8; 32]) -> [u8; 24] {
    blake2b::<24>(&[ephemeral_public, recipient_public])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_roundtrip() {
        let alice = make_encryption_key_pair();
        let bob = make_encryption_key_pair();
        let encrypted = box_encrypt(b"hello bob", &alice.private_key, &bob.public_key).unwrap();
        assert_eq!(encrypted.len(), 9 + BOX_OVERHEAD);
        let clear = box_decrypt(&encrypted, &bob.private_key, &alice.public_key).unwrap();
        assert_eq!(clear, b"hello bob");
    }

    #[test]
    fn box_rejects_wrong_sender() {
        let alice = make_encryption_key_pair();
        let bob = make_encryption_key_pair();
        let eve = make_encryption_key_pair();
        let encrypted = box_encrypt(b"hello bob", &alice.private_key, &bob.public_key).unwrap();
        assert!(box_decrypt(&encrypted, &bob.private_key, &eve.public_key).is_err());
    }

    #[test]
    fn seal_roundtrip() {
        let bob = make_encryption_key_pair();
        let sealed = seal_encrypt(b"anonymous tip", &bob.public_key).unwrap();
        assert_eq!(sealed.len(), 13 + SEAL_OVERHEAD);
        let clear = seal_decrypt(&sealed, &bob).unwrap();
        assert_eq!(clear, b"anonymous tip");
    }

    #[test]
    fn seal_rejects_wrong_recipient() {
        let bob = make_encryption_key_pair();
        let eve = make_encryption_key_pair();
        let sealed = seal_encrypt(b"anonymous tip", &bob.public_key).unwrap();
        assert!(seal_decrypt(&sealed, &eve).is_err());
    }

    #[test]
    fn truncated_seal_is_an_argument_error() {
        let bob = make_encryption_key_pair();
        assert!(matches!(
            seal_decrypt(&[0u8; 47], &bob),
            Err(CryptoError::TruncatedBuffer)
        ));
    }

    #[test]
    fn key_pair_from_private_matches() {
        let pair = make_encryption_key_pair();
        assert_eq!(encryption_key_pair_from_private(pair.private_key), pair);
    }
}
