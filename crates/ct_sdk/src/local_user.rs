//! The local user: this device's keys plus the ordered user key history.

use ct_crypto::{EncryptionKeyPair, PublicEncryptionKey, PublicSignatureKey, SignatureKeyPair};
use ct_proto::{DeviceId, UserId};
use ct_store::DeviceData;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub trustchain_public_signature_key: PublicSignatureKey,
    pub device_signature_key_pair: SignatureKeyPair,
    pub device_encryption_key_pair: EncryptionKeyPair,
    /// Oldest first. Old pairs keep pre-rotation resources decryptable.
    pub user_key_pairs: Vec<EncryptionKeyPair>,
}

impl LocalUser {
    pub fn from_device_data(user_id: UserId, data: &DeviceData) -> Self {
        Self {
            user_id,
            device_id: data.device_id,
            trustchain_public_signature_key: data.trustchain_public_signature_key,
            device_signature_key_pair: data.signature_key_pair,
            device_encryption_key_pair: data.encryption_key_pair,
            user_key_pairs: data.user_key_pairs.clone(),
        }
    }

    pub fn to_device_data(&self) -> DeviceData {
        DeviceData {
            trustchain_public_signature_key: self.trustchain_public_signature_key,
            device_id: self.device_id,
            signature_key_pair: self.device_signature_key_pair,
            encryption_key_pair: self.device_encryption_key_pair,
            user_key_pairs: self.user_key_pairs.clone(),
        }
    }

    pub fn current_user_key_pair(&self) -> Result<&EncryptionKeyPair> {
        self.user_key_pairs
            .last()
            .ok_or_else(|| Error::internal("local user has no user key"))
    }

    /// The key pair whose public half matches, from any point in history.
    pub fn find_user_key_pair(
        &self,
        public_key: &PublicEncryptionKey,
    ) -> Option<&EncryptionKeyPair> {
        self.user_key_pairs
            .iter()
            .find(|key_pair| key_pair.public_key == *public_key)
    }

    /// Append a rotated user key.
    pub fn push_user_key_pair(&mut self, key_pair: EncryptionKeyPair) {
        self.user_key_pairs.push(key_pair);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LocalUser {
        LocalUser {
            user_id: UserId::random(),
            device_id: DeviceId::random(),
            trustchain_public_signature_key: ct_crypto::make_signature_key_pair().public_key,
            device_signature_key_pair: ct_crypto::make_signature_key_pair(),
            device_encryption_key_pair: ct_crypto::make_encryption_key_pair(),
            user_key_pairs: vec![
                ct_crypto::make_encryption_key_pair(),
                ct_crypto::make_encryption_key_pair(),
            ],
        }
    }

    #[test]
    fn device_data_roundtrip() {
        let local_user = sample();
        let rebuilt =
            LocalUser::from_device_data(local_user.user_id, &local_user.to_device_data());
        assert_eq!(rebuilt, local_user);
    }

    #[test]
    fn historical_keys_stay_reachable() {
        let local_user = sample();
        let old = &local_user.user_key_pairs[0];
        assert_eq!(local_user.find_user_key_pair(&old.public_key), Some(old));
        assert_eq!(
            local_user.current_user_key_pair().unwrap(),
            &local_user.user_key_pairs[1]
        );
    }
}
