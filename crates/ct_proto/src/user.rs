//! Verified views of users and their devices.

use ct_crypto::{PublicEncryptionKey, PublicSignatureKey};

use crate::ids::{DeviceId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Hash of the device's creation action.
    pub id: DeviceId,
    pub user_id: UserId,
    pub public_signature_key: PublicSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    /// Immutable after creation: ghost devices exist only to sign the first
    /// real device into existence.
    pub is_ghost_device: bool,
    /// Position in the applied chain at which the device was revoked.
    pub revoked_at: Option<u64>,
}

impl Device {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct User {
    pub id: UserId,
    /// Current public user encryption key. Null only on legacy chains whose
    /// users never got a v3 device.
    pub user_key: Option<PublicEncryptionKey>,
    pub devices: Vec<Device>,
}

impl User {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            user_key: None,
            devices: Vec::new(),
        }
    }

    pub fn find_device(&self, device_id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|device| device.id == *device_id)
    }

    pub fn find_device_mut(&mut self, device_id: &DeviceId) -> Option<&mut Device> {
        self.devices
            .iter_mut()
            .find(|device| device.id == *device_id)
    }
}
