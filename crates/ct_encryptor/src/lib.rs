//! Versioned envelope codecs.
//!
//! Every ciphertext starts with a one-byte format version; this module is
//! the authoritative dispatch over versions 2 through 11. New data is
//! written with the transparent-session formats (v9 plain, v10 padded,
//! v11 streaming) while all older formats stay decryptable.

mod error;
mod key_finder;
pub mod stream;
mod transparent;
pub mod v10;
pub mod v11;
pub mod v2;
pub mod v3;
pub mod v4;
pub mod v5;
pub mod v6;
pub mod v7;
pub mod v8;
pub mod v9;

pub use error::EncryptorError;
pub use key_finder::{FixedKeyFinder, ResourceKeyFinder};
pub use transparent::{derive_subkey, transparent_session_iv};

use ct_crypto::{padded_from_clear_size, Padding, ResourceId, SimpleResourceId, SymmetricKey};

/// Ciphertexts at least this large (after padding) stream as v11.
pub const STREAM_THRESHOLD: u64 = 1024 * 1024;

/// What the caller must remember (and publish) after an encryption: the
/// session id and session key the ciphertext was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionMetadata {
    pub session_id: SimpleResourceId,
    pub session_key: SymmetricKey,
}

pub fn is_huge_clear_data(clear_size: u64, padding: Padding) -> bool {
    padded_from_clear_size(clear_size, padding) >= STREAM_THRESHOLD
}

/// Size of the ciphertext `encrypt` will produce.
pub fn encrypted_size(clear_size: u64, padding: Padding) -> u64 {
    if is_huge_clear_data(clear_size, padding) {
        v11::encrypted_size(clear_size, padding)
    } else if padding == Padding::Off {
        v9::encrypted_size(clear_size)
    } else {
        v10::encrypted_size(clear_size, padding)
    }
}

/// Clear size of a ciphertext (an upper bound for padded formats).
pub fn decrypted_size(encrypted_data: &[u8]) -> Result<u64, EncryptorError> {
    match version(encrypted_data)? {
        v2::VERSION => v2::decrypted_size(encrypted_data),
        v3::VERSION => v3::decrypted_size(encrypted_data),
        v4::VERSION => v4::decrypted_size(encrypted_data),
        v5::VERSION => v5::decrypted_size(encrypted_data),
        v6::VERSION => v6::decrypted_size(encrypted_data),
        v7::VERSION => v7::decrypted_size(encrypted_data),
        v8::VERSION => v8::decrypted_size(encrypted_data),
        v9::VERSION => v9::decrypted_size(encrypted_data),
        v10::VERSION => v10::decrypted_size(encrypted_data),
        v11::VERSION => v11::decrypted_size(encrypted_data),
        other => Err(EncryptorError::UnsupportedVersion(other)),
    }
}

/// Encrypt under a session. Format choice: v11 for huge data, v9 when
/// padding is off, v10 otherwise. A fresh subkey seed is drawn per call.
pub async fn encrypt(
    clear_data: &[u8],
    padding: Padding,
    session_id: &SimpleResourceId,
    session_key: &SymmetricKey,
) -> Result<(Vec<u8>, EncryptionMetadata), EncryptorError> {
    let seed = ct_crypto::SubkeySeed::random();
    let metadata = EncryptionMetadata {
        session_id: *session_id,
        session_key: *session_key,
    };
    let encrypted = if is_huge_clear_data(clear_data.len() as u64, padding) {
        v11::encrypt(clear_data, session_id, session_key, &seed, padding).await?
    } else if padding == Padding::Off {
        v9::encrypt(clear_data, session_id, session_key, &seed)?
    } else {
        v10::encrypt(clear_data, session_id, session_key, &seed, padding)?
    };
    Ok((encrypted, metadata))
}

/// Decrypt any supported version, resolving keys through `key_finder`.
pub async fn decrypt(
    key_finder: &dyn ResourceKeyFinder,
    encrypted_data: &[u8],
) -> Result<Vec<u8>, EncryptorError> {
    match version(encrypted_data)? {
        v2::VERSION | v3::VERSION | v5::VERSION | v6::VERSION | v7::VERSION => {
            let resource_id = extract_resource_id(encrypted_data)?;
            let key = key_finder
                .find_resource_key(resource_id)
                .await
                .map_err(EncryptorError::KeyLookup)?
                .ok_or(EncryptorError::DecryptionFailed("resource key not found"))?;
            match encrypted_data[0] {
                v2::VERSION => v2::decrypt(&key, encrypted_data),
                v3::VERSION => v3::decrypt(&key, encrypted_data),
                v5::VERSION => v5::decrypt(&key, encrypted_data),
                v6::VERSION => v6::decrypt(&key, encrypted_data),
                _ => v7::decrypt(&key, encrypted_data),
            }
        }
        v4::VERSION => v4::decrypt(key_finder, encrypted_data).await,
        v8::VERSION => v8::decrypt(key_finder, encrypted_data).await,
        v9::VERSION => v9::decrypt(key_finder, encrypted_data).await,
        v10::VERSION => v10::decrypt(key_finder, encrypted_data).await,
        v11::VERSION => v11::decrypt(key_finder, encrypted_data).await,
        other => Err(EncryptorError::UnsupportedVersion(other)),
    }
}

/// Decrypt with a caller-held key (the session key for v9/v10/v11).
pub async fn decrypt_with_key(
    key: &SymmetricKey,
    encrypted_data: &[u8],
) -> Result<Vec<u8>, EncryptorError> {
    decrypt(&FixedKeyFinder(*key), encrypted_data).await
}

/// The id under which the key of this ciphertext is published.
pub fn extract_resource_id(encrypted_data: &[u8]) -> Result<ResourceId, EncryptorError> {
    match version(encrypted_data)? {
        v2::VERSION => v2::extract_resource_id(encrypted_data),
        v3::VERSION => v3::extract_resource_id(encrypted_data),
        v4::VERSION => v4::extract_resource_id(encrypted_data),
        v5::VERSION => v5::extract_resource_id(encrypted_data),
        v6::VERSION => v6::extract_resource_id(encrypted_data),
        v7::VERSION => v7::extract_resource_id(encrypted_data),
        v8::VERSION => v8::extract_resource_id(encrypted_data),
        v9::VERSION => v9::extract_resource_id(encrypted_data),
        v10::VERSION => v10::extract_resource_id(encrypted_data),
        v11::VERSION => v11::extract_resource_id(encrypted_data),
        other => Err(EncryptorError::UnsupportedVersion(other)),
    }
}

fn version(encrypted_data: &[u8]) -> Result<u8, EncryptorError> {
    encrypted_data
        .first()
        .copied()
        .ok_or(EncryptorError::InvalidArgument("encrypted data is empty"))
}
