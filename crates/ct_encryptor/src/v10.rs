//! Format v10: v9 with padded plaintext.

use ct_crypto::{
    aead_decrypt, aead_encrypt, pad_clear_data, padded_from_clear_size, unpadded_size, Mac,
    Padding, ResourceId, SimpleResourceId, SubkeySeed, SymmetricKey,
};

use crate::error::EncryptorError;
use crate::key_finder::ResourceKeyFinder;
use crate::transparent::{derive_subkey, transparent_session_iv};
use crate::v9::{find_subkey, mac_data};

pub const VERSION: u8 = 10;

const HEADER: usize = 1 + SimpleResourceId::SIZE + SubkeySeed::SIZE;
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
    session_id: &SimpleResourceId,
    session_key: &SymmetricKey,
    subkey_seed: &SubkeySeed,
    padding: Padding,
) -> Result<Vec<u8>, EncryptorError> {
    let padded = pad_clear_data(clear_data, padding);
    let key = derive_subkey(session_key, subkey_seed);
    let iv = transparent_session_iv(session_id);
    let associated_data = mac_data(VERSION, session_id, subkey_seed);

    let mut out = Vec::with_capacity(padded.len() + OVERHEAD);
    out.push(VERSION);
    out.extend_from_slice(session_id.as_ref());
    out.extend_from_slice(subkey_seed.as_ref());
    out.extend_from_slice(&aead_encrypt(&key, &iv, &padded, &associated_data)?);
    Ok(out)
}

pub async fn decrypt(
    key_finder: &dyn ResourceKeyFinder,
    encrypted_data: &[u8],
) -> Result<Vec<u8>, EncryptorError> {
    check_format(encrypted_data)?;
    let ResourceId::Composite(composite) = extract_resource_id(encrypted_data)? else {
        unreachable!("v10 resource ids are composite");
    };
    let key = find_subkey(key_finder, &composite).await?;
    let iv = transparent_session_iv(&composite.session_id());
    let associated_data = mac_data(VERSION, &composite.session_id(), &composite.subkey_seed());
    let mut padded = aead_decrypt(&key, &iv, &encrypted_data[HEADER..], &associated_data)?;
    let size = unpadded_size(&padded)?;
    padded.truncate(size);
    Ok(padded)
}

pub fn extract_resource_id(encrypted_data: &[u8]) -> Result<ResourceId, EncryptorError> {
    check_format(encrypted_data)?;
    let session_id = SimpleResourceId::from_slice(&encrypted_data[1..17]).expect("fixed range");
    let seed = SubkeySeed::from_slice(&encrypted_data[17..33]).expect("fixed range");
    Ok(ResourceId::Composite(
        ct_crypto::CompositeResourceId::transparent_session(&session_id, &seed),
    ))
}

fn check_format(encrypted_data: &[u8]) -> Result<(), EncryptorError> {
    if encrypted_data.len() < OVERHEAD + 1 {
        return Err(EncryptorError::InvalidArgument("truncated encrypted buffer"));
    }
    debug_assert_eq!(encrypted_data[0], VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_finder::FixedKeyFinder;

    #[tokio::test]
    async fn roundtrip_with_auto_padding() {
        let session_id = SimpleResourceId::random();
        let session_key = ct_crypto::make_symmetric_key();
        let seed = SubkeySeed::random();
        let clear = b"hide my length";
        let encrypted = encrypt(clear, &session_id, &session_key, &seed, Padding::Auto).unwrap();
        assert_eq!(
            encrypted.len() as u64,
            encrypted_size(clear.len() as u64, Padding::Auto)
        );
        assert_eq!(
            decrypt(&FixedKeyFinder(session_key), &encrypted).await.unwrap(),
            clear
        );
    }

    #[tokio::test]
    async fn padded_sizes_collide_for_close_lengths() {
        let session_id = SimpleResourceId::random();
        let session_key = ct_crypto::make_symmetric_key();
        let a = encrypt(&[1u8; 17], &session_id, &session_key, &SubkeySeed::random(), Padding::Auto)
            .unwrap();
        let b = encrypt(&[1u8; 31], &session_id, &session_key, &SubkeySeed::random(), Padding::Auto)
            .unwrap();
        assert_eq!(a.len(), b.len());
    }

    #[tokio::test]
    async fn corrupted_buffer_fails() {
        let session_id = SimpleResourceId::random();
        let session_key = ct_crypto::make_symmetric_key();
        let mut encrypted = encrypt(
            b"payload",
            &session_id,
            &session_key,
            &SubkeySeed::random(),
            Padding::Auto,
        )
        .unwrap();
        *encrypted.last_mut().unwrap() ^= 1;
        assert!(decrypt(&FixedKeyFinder(session_key), &encrypted)
            .await
            .unwrap_err()
            .is_decryption_failed());
    }
}
