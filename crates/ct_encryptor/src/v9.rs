//! Format v9: transparent session, single shot, no padding.
//!
//! ```text
//! version(1)=9 | sessionId(16) | subkeySeed(16) | ciphertext | mac(16)
//! ```
//!
//! IV is `sessionId || zeros(8)`; the key is the session subkey; the
//! associated data is `version || sessionId || subkeySeed`, binding the
//! ciphertext to its session and seed.

use ct_crypto::{
    aead_decrypt, aead_encrypt, CompositeResourceId, Mac, ResourceId, SimpleResourceId,
    SubkeySeed, SymmetricKey,
};

use crate::error::EncryptorError;
use crate::key_finder::ResourceKeyFinder;
use crate::transparent::{derive_subkey, transparent_session_iv};

pub const VERSION: u8 = 9;

const HEADER: usize = 1 + SimpleResourceId::SIZE + SubkeySeed::SIZE;
const OVERHEAD: usize = HEADER + Mac::SIZE;

pub fn encrypted_size(clear_size: u64) -> u64 {
    clear_size + OVERHEAD as u64
}

pub fn decrypted_size(encrypted_data: &[u8]) -> Result<u64, EncryptorError> {
    check_format(encrypted_data)?;
    Ok((encrypted_data.len() - OVERHEAD) as u64)
}

pub(crate) fn mac_data(
    version: u8,
    session_id: &SimpleResourceId,
    subkey_seed: &SubkeySeed,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(HEADER);
    data.push(version);
    data.extend_from_slice(session_id.as_ref());
    data.extend_from_slice(subkey_seed.as_ref());
    data
}

pub fn encrypt(
    clear_data: &[u8],
    session_id: &SimpleResourceId,
    session_key: &SymmetricKey,
    subkey_seed: &SubkeySeed,
) -> Result<Vec<u8>, EncryptorError> {
    let key = derive_subkey(session_key, subkey_seed);
    let iv = transparent_session_iv(session_id);
    let associated_data = mac_data(VERSION, session_id, subkey_seed);

    let mut out = Vec::with_capacity(clear_data.len() + OVERHEAD);
    out.push(VERSION);
    out.extend_from_slice(session_id.as_ref());
    out.extend_from_slice(subkey_seed.as_ref());
    out.extend_from_slice(&aead_encrypt(&key, &iv, clear_data, &associated_data)?);
    Ok(out)
}

/// Resolve the key through the session id (deriving the subkey) or fall
/// back to a directly published per-resource subkey.
pub(crate) async fn find_subkey(
    key_finder: &dyn ResourceKeyFinder,
    composite: &CompositeResourceId,
) -> Result<SymmetricKey, EncryptorError> {
    let session_id = composite.session_id();
    let seed = composite.subkey_seed();
    match key_finder
        .find_resource_key(ResourceId::Simple(session_id))
        .await
        .map_err(EncryptorError::KeyLookup)?
    {
        Some(session_key) => Ok(derive_subkey(&session_key, &seed)),
        None => key_finder
            .find_resource_key(ResourceId::Simple(composite.individual_resource_id()))
            .await
            .map_err(EncryptorError::KeyLookup)?
            .ok_or(EncryptorError::DecryptionFailed("resource key not found")),
    }
}

pub async fn decrypt(
    key_finder: &dyn ResourceKeyFinder,
    encrypted_data: &[u8],
) -> Result<Vec<u8>, EncryptorError> {
    check_format(encrypted_data)?;
    let ResourceId::Composite(composite) = extract_resource_id(encrypted_data)? else {
        unreachable!("v9 resource ids are composite");
    };
    let key = find_subkey(key_finder, &composite).await?;
    let iv = transparent_session_iv(&composite.session_id());
    let associated_data = mac_data(VERSION, &composite.session_id(), &composite.subkey_seed());
    Ok(aead_decrypt(&key, &iv, &encrypted_data[HEADER..], &associated_data)?)
}

pub fn extract_resource_id(encrypted_data: &[u8]) -> Result<ResourceId, EncryptorError> {
    check_format(encrypted_data)?;
    let session_id =
        SimpleResourceId::from_slice(&encrypted_data[1..17]).expect("fixed range");
    let seed = SubkeySeed::from_slice(&encrypted_data[17..33]).expect("fixed range");
    Ok(ResourceId::Composite(CompositeResourceId::transparent_session(
        &session_id,
        &seed,
    )))
}

fn check_format(encrypted_data: &[u8]) -> Result<(), EncryptorError> {
    if encrypted_data.len() < OVERHEAD {
        return Err(EncryptorError::InvalidArgument("truncated encrypted buffer"));
    }
    debug_assert_eq!(encrypted_data[0], VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_finder::FixedKeyFinder;

    fn fixed_inputs() -> (SimpleResourceId, SymmetricKey, SubkeySeed) {
        (
            SimpleResourceId::new([0x01; 16]),
            SymmetricKey::new([0x02; 32]),
            SubkeySeed::new([0x03; 16]),
        )
    }

    #[tokio::test]
    async fn deterministic_layout_and_roundtrip() {
        let (session_id, session_key, seed) = fixed_inputs();
        let clear = b"this is a secret";
        let encrypted = encrypt(clear, &session_id, &session_key, &seed).unwrap();

        assert_eq!(encrypted.len() as u64, encrypted_size(clear.len() as u64));
        // Header: version || sessionId || subkeySeed.
        assert_eq!(encrypted[0], 0x09);
        assert_eq!(&encrypted[1..17], &[0x01; 16]);
        assert_eq!(&encrypted[17..33], &[0x03; 16]);
        // The associated data equals the header bytes.
        assert_eq!(mac_data(VERSION, &session_id, &seed), encrypted[..33].to_vec());

        let decrypted = decrypt(&FixedKeyFinder(session_key), &encrypted)
            .await
            .unwrap();
        assert_eq!(decrypted, clear);
    }

    #[tokio::test]
    async fn same_session_same_seed_is_deterministic_but_seeds_differ() {
        let (session_id, session_key, seed) = fixed_inputs();
        let a = encrypt(b"data", &session_id, &session_key, &seed).unwrap();
        let b = encrypt(b"data", &session_id, &session_key, &seed).unwrap();
        assert_eq!(a, b);
        let c = encrypt(b"data", &session_id, &session_key, &SubkeySeed::random()).unwrap();
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn composite_resource_id_carries_session_and_seed() {
        let (session_id, session_key, seed) = fixed_inputs();
        let encrypted = encrypt(b"x", &session_id, &session_key, &seed).unwrap();
        let ResourceId::Composite(id) = extract_resource_id(&encrypted).unwrap() else {
            panic!("expected a composite id");
        };
        assert_eq!(id.session_id(), session_id);
        assert_eq!(id.subkey_seed(), seed);
    }

    #[tokio::test]
    async fn tampered_seed_fails_authentication() {
        let (session_id, session_key, seed) = fixed_inputs();
        let mut encrypted = encrypt(b"payload", &session_id, &session_key, &seed).unwrap();
        encrypted[20] ^= 1; // inside the seed, which is bound via the AD
        assert!(decrypt(&FixedKeyFinder(session_key), &encrypted)
            .await
            .unwrap_err()
            .is_decryption_failed());
    }

    #[tokio::test]
    async fn roundtrip_empty() {
        let (session_id, session_key, seed) = fixed_inputs();
        let encrypted = encrypt(b"", &session_id, &session_key, &seed).unwrap();
        assert_eq!(
            decrypt(&FixedKeyFinder(session_key), &encrypted).await.unwrap(),
            b""
        );
    }
}
