//! Format v7: v5 with padded plaintext.
//!
//! Layout `version(1) | resourceId(16) | iv(24) | ciphertext | mac(16)`,
//! plaintext padded with the 0x80 boundary convention.

use ct_crypto::{
    aead_decrypt, aead_encrypt, pad_clear_data, padded_from_clear_size, unpadded_size, AeadIv,
    Mac, Padding, ResourceId, SimpleResourceId, SymmetricKey,
};

use crate::error::EncryptorError;

pub const VERSION: u8 = 7;

const HEADER: usize = 1 + SimpleResourceId::SIZE + AeadIv::SIZE;
const OVERHEAD: usize = HEADER + Mac::SIZE;

pub fn encrypted_size(clear_size: u64, padding: Padding) -> u64 {
    padded_from_clear_size(clear_size, padding) + OVERHEAD as u64
}

/// Upper bound: the padding boundary is only known after decryption.
pub fn decrypted_size(encrypted_data: &[u8]) -> Result<u64, EncryptorError> {
    check_format(encrypted_data)?;
    Ok((encrypted_data.len() - OVERHEAD) as u64)
}

pub fn encrypt(
    clear_data: &[u8],
    resource_id: &SimpleResourceId,
    key: &SymmetricKey,
    padding: Padding,
) -> Result<Vec<u8>, EncryptorError> {
    let padded = pad_clear_data(clear_data, padding);
    let iv = AeadIv::random();
    let mut out = Vec::with_capacity(padded.len() + OVERHEAD);
    out.push(VERSION);
    out.extend_from_slice(resource_id.as_ref());
    out.extend_from_slice(iv.as_ref());
    out.extend_from_slice(&aead_encrypt(key, &iv, &padded, &[])?);
    Ok(out)
}

pub fn decrypt(key: &SymmetricKey, encrypted_data: &[u8]) -> Result<Vec<u8>, EncryptorError> {
    check_format(encrypted_data)?;
    let iv = AeadIv::from_slice(&encrypted_data[1 + SimpleResourceId::SIZE..HEADER])
        .expect("fixed range");
    let mut padded = aead_decrypt(key, &iv, &encrypted_data[HEADER..], &[])?;
    let size = unpadded_size(&padded)?;
    padded.truncate(size);
    Ok(padded)
}

pub fn extract_resource_id(encrypted_data: &[u8]) -> Result<ResourceId, EncryptorError> {
    check_format(encrypted_data)?;
    Ok(ResourceId::Simple(
        SimpleResourceId::from_slice(&encrypted_data[1..1 + SimpleResourceId::SIZE])
            .expect("fixed range"),
    ))
}

fn check_format(encrypted_data: &[u8]) -> Result<(), EncryptorError> {
    if encrypted_data.len() < OVERHEAD + 1 {
        return Err(EncryptorError::InvalidArgument("truncated encrypted buffer"));
    }
    debug_assert_eq!(encrypted_data[0], VERSION);
    Ok(())
}
