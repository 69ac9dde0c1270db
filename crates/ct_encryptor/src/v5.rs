//! Format v5: `version(1) | resourceId(16) | iv(24) | ciphertext | mac(16)`.
//!
//! Single-shot format for callers that hold a `(resourceId, key)` pair
//! directly, such as legacy encryption sessions.

use ct_crypto::{aead_decrypt, aead_encrypt, AeadIv, Mac, ResourceId, SimpleResourceId, SymmetricKey};

use crate::error::EncryptorError;

pub const VERSION: u8 = 5;

const HEADER: usize = 1 + SimpleResourceId::SIZE + AeadIv::SIZE;
const OVERHEAD: usize = HEADER + Mac::SIZE;

pub fn encrypted_size(clear_size: u64) -> u64 {
    clear_size + OVERHEAD as u64
}

pub fn decrypted_size(encrypted_data: &[u8]) -> Result<u64, EncryptorError> {
    check_format(encrypted_data)?;
    Ok((encrypted_data.len() - OVERHEAD) as u64)
}

pub fn encrypt(
    clear_data: &[u8],
    resource_id: &SimpleResourceId,
    key: &SymmetricKey,
) -> Result<Vec<u8>, EncryptorError> {
    let iv = AeadIv::random();
    let mut out = Vec::with_capacity(clear_data.len() + OVERHEAD);
    out.push(VERSION);
    out.extend_from_slice(resource_id.as_ref());
    out.extend_from_slice(iv.as_ref());
    out.extend_from_slice(&aead_encrypt(key, &iv, clear_data, &[])?);
    Ok(out)
}

pub fn decrypt(key: &SymmetricKey, encrypted_data: &[u8]) -> Result<Vec<u8>, EncryptorError> {
    check_format(encrypted_data)?;
    let iv = AeadIv::from_slice(&encrypted_data[1 + SimpleResourceId::SIZE..HEADER])
        .expect("fixed range");
    Ok(aead_decrypt(key, &iv, &encrypted_data[HEADER..], &[])?)
}

pub fn extract_resource_id(encrypted_data: &[u8]) -> Result<ResourceId, EncryptorError> {
    check_format(encrypted_data)?;
    Ok(ResourceId::Simple(
        SimpleResourceId::from_slice(&encrypted_data[1..1 + SimpleResourceId::SIZE])
            .expect("fixed range"),
    ))
}

fn check_format(encrypted_data: &[u8]) -> Result<(), EncryptorError> {
    if encrypted_data.len() < OVERHEAD {
        return Err(EncryptorError::InvalidArgument("truncated encrypted buffer"));
    }
    debug_assert_eq!(encrypted_data[0], VERSION);
    Ok(())
}
