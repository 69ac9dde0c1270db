//! XChaCha20-Poly1305 authenticated encryption.
//!
//! Output layout is `ciphertext || mac`; the IV is *not* prepended here.
//! Envelope formats place the IV themselves (random, derived, or implicit),
//! so this module takes it as an explicit argument.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};

use crate::error::CryptoError;
use crate::hash::blake2b;
use crate::types::{AeadIv, Mac, SymmetricKey};

/// Ciphertext length for a clear length.
pub fn encrypted_size(clear_size: usize) -> usize {
    clear_size + Mac::SIZE
}

/// Clear length for a ciphertext length; fails on inputs shorter than a MAC.
pub fn decrypted_size(encrypted_size: usize) -> Result<usize, CryptoError> {
    encrypted_size
        .checked_sub(Mac::SIZE)
        .ok_or(CryptoError::TruncatedBuffer)
}

pub fn aead_encrypt(
    key: &SymmetricKey,
    iv: &AeadIv,
    clear_data: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
    cipher
        .encrypt(
            XNonce::from_slice(iv.as_ref()),
            Payload {
                msg: clear_data,
                aad: associated_data,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)
}

pub fn aead_decrypt(
    key: &SymmetricKey,
    iv: &AeadIv,
    encrypted_data: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if encrypted_data.len() < Mac::SIZE {
        return Err(CryptoError::TruncatedBuffer);
    }
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key.as_ref()));
    cipher
        .decrypt(
            XNonce::from_slice(iv.as_ref()),
            Payload {
                msg: encrypted_data,
                aad: associated_data,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed("MAC verification failed"))
}

/// The authentication tag of a `ciphertext || mac` buffer.
pub fn extract_mac(encrypted_data: &[u8]) -> Result<Mac, CryptoError> {
    if encrypted_data.len() < Mac::SIZE {
        return Err(CryptoError::TruncatedBuffer);
    }
    Mac::from_slice(&encrypted_data[encrypted_data.len() - Mac::SIZE..])
}

/// Per-chunk IV of the streaming formats: BLAKE2b-24 of the stream's IV
/// seed and the chunk index (little endian).
pub fn derive_iv(seed: &AeadIv, counter: u64) -> AeadIv {
    AeadIv::new(blake2b::<24>(&[seed.as_ref(), &counter.to_le_bytes()]))
}
