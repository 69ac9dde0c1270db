//! Record encryption under the user secret.
//!
//! Every value handed to the datastore goes through the v2 utility
//! envelope with a key derived from the user secret, so a stolen backend
//! leaks nothing without the identity.

use ct_crypto::{blake2b, SymmetricKey};
use ct_encryptor::v2;

use crate::error::StoreError;

/// Domain-separated storage key derived from the 32-byte user secret.
pub fn storage_key_from_user_secret(user_secret: &[u8; 32]) -> SymmetricKey {
    SymmetricKey::new(blake2b::<32>(&[b"cachet-store-v1", user_secret]))
}

pub fn encrypt_value(key: &SymmetricKey, value: &[u8]) -> Result<Vec<u8>, StoreError> {
    Ok(v2::encrypt(value, key)?)
}

pub fn decrypt_value(key: &SymmetricKey, stored: &[u8]) -> Result<Vec<u8>, StoreError> {
    v2::decrypt(key, stored).map_err(|e| StoreError::Corrupted(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = storage_key_from_user_secret(&[7u8; 32]);
        let encrypted = encrypt_value(&key, b"record").unwrap();
        assert_eq!(decrypt_value(&key, &encrypted).unwrap(), b"record");
    }

    #[test]
    fn distinct_secrets_produce_distinct_keys() {
        assert_ne!(
            storage_key_from_user_secret(&[1u8; 32]),
            storage_key_from_user_secret(&[2u8; 32])
        );
    }

    #[test]
    fn tampered_record_reads_as_corruption() {
        let key = storage_key_from_user_secret(&[7u8; 32]);
        let mut encrypted = encrypt_value(&key, b"record").unwrap();
        *encrypted.last_mut().unwrap() ^= 1;
        assert!(matches!(
            decrypt_value(&key, &encrypted),
            Err(StoreError::Corrupted(_))
        ));
    }
}
