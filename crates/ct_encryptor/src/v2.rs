//! Format v2: `version(1) | iv(24) | ciphertext | mac(16)`.
//!
//! Legacy small-buffer format with an explicit random IV; still produced
//! for utility encryption of persisted metadata where the caller manages
//! the key. The resource id is the trailing MAC.

use ct_crypto::{aead_decrypt, aead_encrypt, extract_mac, AeadIv, Mac, ResourceId, SimpleResourceId, SymmetricKey};

use crate::error::EncryptorError;

pub const VERSION: u8 = 2;

const OVERHEAD: usize = 1 + AeadIv::SIZE + Mac::SIZE;

pub fn encrypted_size(clear_size: u64) -> u64 {
    clear_size + OVERHEAD as u64
}

pub fn decrypted_size(encrypted_data: &[u8]) -> Result<u64, EncryptorError> {
    check_format(encrypted_data)?;
    Ok((encrypted_data.len() - OVERHEAD) as u64)
}

pub fn encrypt(clear_data: &[u8], key: &SymmetricKey) -> Result<Vec<u8>, EncryptorError> {
    let iv = AeadIv::random();
    let mut out = Vec::with_capacity(clear_data.len() + OVERHEAD);
    out.push(VERSION);
    out.extend_from_slice(iv.as_ref());
    out.extend_from_slice(&aead_encrypt(key, &iv, clear_data, &[])?);
    Ok(out)
}

pub fn decrypt(key: &SymmetricKey, encrypted_data: &[u8]) -> Result<Vec<u8>, EncryptorError> {
    check_format(encrypted_data)?;
    let iv = AeadIv::from_slice(&encrypted_data[1..1 + AeadIv::SIZE]).expect("fixed range");
    Ok(aead_decrypt(key, &iv, &encrypted_data[1 + AeadIv::SIZE..], &[])?)
}

pub fn extract_resource_id(encrypted_data: &[u8]) -> Result<ResourceId, EncryptorError> {
    check_format(encrypted_data)?;
    let mac = extract_mac(encrypted_data)?;
    Ok(ResourceId::Simple(SimpleResourceId::new(*mac.as_bytes())))
}

fn check_format(encrypted_data: &[u8]) -> Result<(), EncryptorError> {
    if encrypted_data.len() < OVERHEAD {
        return Err(EncryptorError::InvalidArgument("truncated encrypted buffer"));
    }
    debug_assert_eq!(encrypted_data[0], VERSION);
    Ok(())
}
