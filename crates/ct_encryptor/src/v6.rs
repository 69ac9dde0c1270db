//! Format v6: v3 with padded plaintext.
//!
//! Layout `version(1) | ciphertext | mac(16)` where the plaintext is
//! `data || 0x80 || zeros` per the padding policy.

use ct_crypto::{
    aead_decrypt, aead_encrypt, extract_mac, pad_clear_data, padded_from_clear_size,
    unpadded_size, AeadIv, Mac, Padding, ResourceId, SimpleResourceId, SymmetricKey,
};

use crate::error::EncryptorError;

pub const VERSION: u8 = 6;

const OVERHEAD: usize = 1 + Mac::SIZE;

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
    key: &SymmetricKey,
    padding: Padding,
) -> Result<Vec<u8>, EncryptorError> {
    let padded = pad_clear_data(clear_data, padding);
    let mut out = Vec::with_capacity(padded.len() + OVERHEAD);
    out.push(VERSION);
    out.extend_from_slice(&aead_encrypt(key, &AeadIv::default(), &padded, &[])?);
    Ok(out)
}

pub fn decrypt(key: &SymmetricKey, encrypted_data: &[u8]) -> Result<Vec<u8>, EncryptorError> {
    check_format(encrypted_data)?;
    let mut padded = aead_decrypt(key, &AeadIv::default(), &encrypted_data[1..], &[])?;
    let size = unpadded_size(&padded)?;
    padded.truncate(size);
    Ok(padded)
}

pub fn extract_resource_id(encrypted_data: &[u8]) -> Result<ResourceId, EncryptorError> {
    check_format(encrypted_data)?;
    let mac = extract_mac(encrypted_data)?;
    Ok(ResourceId::Simple(SimpleResourceId::new(*mac.as_bytes())))
}

fn check_format(encrypted_data: &[u8]) -> Result<(), EncryptorError> {
    // The padding boundary byte guarantees at least one plaintext byte.
    if encrypted_data.len() < OVERHEAD + 1 {
        return Err(EncryptorError::InvalidArgument("truncated encrypted buffer"));
    }
    debug_assert_eq!(encrypted_data[0], VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_auto_padding() {
        let key = ct_crypto::make_symmetric_key();
        let encrypted = encrypt(b"my clear data!", &key, Padding::Auto).unwrap();
        assert_eq!(encrypted.len() as u64, encrypted_size(14, Padding::Auto));
        assert_eq!(decrypt(&key, &encrypted).unwrap(), b"my clear data!");
    }

    #[test]
    fn auto_padding_hides_close_lengths() {
        let key = ct_crypto::make_symmetric_key();
        let a = encrypt(&[1u8; 20], &key, Padding::Auto).unwrap();
        let b = encrypt(&[1u8; 24], &key, Padding::Auto).unwrap();
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn roundtrip_with_a_step() {
        let key = ct_crypto::make_symmetric_key();
        let step = Padding::step(500).unwrap();
        let encrypted = encrypt(b"short", &key, step).unwrap();
        assert_eq!(encrypted.len() as u64, 500 + OVERHEAD as u64);
        assert_eq!(decrypt(&key, &encrypted).unwrap(), b"short");
    }

    #[test]
    fn corrupted_buffer_fails() {
        let key = ct_crypto::make_symmetric_key();
        let mut encrypted = encrypt(b"data", &key, Padding::Auto).unwrap();
        encrypted[3] ^= 1;
        assert!(decrypt(&key, &encrypted).unwrap_err().is_decryption_failed());
    }
}
