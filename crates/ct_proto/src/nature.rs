//! Action nature tags.
//!
//! Wire values are frozen; gaps are retired natures that this
//! implementation never produced.

use crate::error::ProtoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Nature {
    TrustchainCreation = 1,
    DeviceCreation1 = 2,
    /// Legacy, accepted on read but never produced.
    KeyPublishToDevice = 3,
    DeviceRevocation1 = 4,
    DeviceCreation2 = 6,
    DeviceCreation3 = 7,
    KeyPublishToUser = 8,
    DeviceRevocation2 = 9,
    UserGroupCreation1 = 10,
    KeyPublishToUserGroup = 11,
    UserGroupAddition1 = 12,
    KeyPublishToProvisionalUser = 13,
    ProvisionalIdentityClaim = 14,
    UserGroupCreation2 = 15,
    UserGroupAddition2 = 16,
}

impl Nature {
    pub fn from_wire(value: u64) -> Result<Self, ProtoError> {
        Ok(match value {
            1 => Nature::TrustchainCreation,
            2 => Nature::DeviceCreation1,
            3 => Nature::KeyPublishToDevice,
            4 => Nature::DeviceRevocation1,
            6 => Nature::DeviceCreation2,
            7 => Nature::DeviceCreation3,
            8 => Nature::KeyPublishToUser,
            9 => Nature::DeviceRevocation2,
            10 => Nature::UserGroupCreation1,
            11 => Nature::KeyPublishToUserGroup,
            12 => Nature::UserGroupAddition1,
            13 => Nature::KeyPublishToProvisionalUser,
            14 => Nature::ProvisionalIdentityClaim,
            15 => Nature::UserGroupCreation2,
            16 => Nature::UserGroupAddition2,
            other => return Err(ProtoError::UnknownNature(other)),
        })
    }

    pub fn to_wire(self) -> u64 {
        self as u32 as u64
    }

    pub fn is_device_creation(self) -> bool {
        matches!(
            self,
            Nature::DeviceCreation1 | Nature::DeviceCreation2 | Nature::DeviceCreation3
        )
    }

    pub fn is_device_revocation(self) -> bool {
        matches!(self, Nature::DeviceRevocation1 | Nature::DeviceRevocation2)
    }

    pub fn is_key_publish(self) -> bool {
        matches!(
            self,
            Nature::KeyPublishToDevice
                | Nature::KeyPublishToUser
                | Nature::KeyPublishToUserGroup
                | Nature::KeyPublishToProvisionalUser
        )
    }

    pub fn is_group_action(self) -> bool {
        matches!(
            self,
            Nature::UserGroupCreation1
                | Nature::UserGroupCreation2
                | Nature::UserGroupAddition1
                | Nature::UserGroupAddition2
        )
    }
}

impl std::fmt::Display for Nature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_roundtrip() {
        for value in (1..=16).filter(|v| *v != 5) {
            assert_eq!(Nature::from_wire(value).unwrap().to_wire(), value);
        }
    }

    #[test]
    fn retired_and_unknown_values_are_rejected() {
        assert!(Nature::from_wire(0).is_err());
        assert!(Nature::from_wire(5).is_err());
        assert!(Nature::from_wire(17).is_err());
    }
}
