//! Action payloads and their canonical encodings.
//!
//! Every nature has a fixed field order (see the wire reference in the
//! project documentation); serialization walks the fields in that order and
//! nothing else. Self-signed payloads (groups, claims) sign their canonical
//! encoding up to, but excluding, the trailing signature field(s).

use ct_crypto::{
    PublicEncryptionKey, PublicSignatureKey, SealedPrivateEncryptionKey,
    SealedPrivateEncryptionKeys, SealedPrivateSignatureKey, SealedSymmetricKey, Signature,
    SimpleResourceId, TwoTimesSealedPrivateEncryptionKey, TwoTimesSealedSymmetricKey,
};

use crate::error::ProtoError;
use crate::ids::{DeviceId, GroupId, UserId};
use crate::nature::Nature;
use crate::serialization::{varint_write, Reader};

// ── Trustchain creation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustchainCreation {
    pub public_signature_key: PublicSignatureKey,
}

impl TrustchainCreation {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.public_signature_key.as_ref());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        Ok(Self {
            public_signature_key: reader.read_value()?,
        })
    }
}

// ── Device creation ──────────────────────────────────────────────────────────

/// Shared layout of device creation v1 and v2 (v2 only differs by nature,
/// kept for legacy chains that used it during account resets).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCreationV1 {
    pub ephemeral_public_signature_key: PublicSignatureKey,
    pub user_id: UserId,
    pub delegation_signature: Signature,
    pub public_signature_key: PublicSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
}

impl DeviceCreationV1 {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.ephemeral_public_signature_key.as_ref());
        out.extend_from_slice(self.user_id.as_ref());
        out.extend_from_slice(self.delegation_signature.as_ref());
        out.extend_from_slice(self.public_signature_key.as_ref());
        out.extend_from_slice(self.public_encryption_key.as_ref());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        Ok(Self {
            ephemeral_public_signature_key: reader.read_value()?,
            user_id: reader.read_value()?,
            delegation_signature: reader.read_value()?,
            public_signature_key: reader.read_value()?,
            public_encryption_key: reader.read_value()?,
        })
    }

    /// Bytes covered by the parent's delegation signature.
    pub fn delegation_signature_data(
        ephemeral_public_signature_key: &PublicSignatureKey,
        user_id: &UserId,
    ) -> Vec<u8> {
        let mut data =
            Vec::with_capacity(PublicSignatureKey::SIZE + UserId::SIZE);
        data.extend_from_slice(ephemeral_public_signature_key.as_ref());
        data.extend_from_slice(user_id.as_ref());
        data
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCreationV3 {
    pub ephemeral_public_signature_key: PublicSignatureKey,
    pub user_id: UserId,
    pub delegation_signature: Signature,
    pub public_signature_key: PublicSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    pub public_user_encryption_key: PublicEncryptionKey,
    pub sealed_private_user_encryption_key: SealedPrivateEncryptionKey,
    pub is_ghost_device: bool,
}

impl DeviceCreationV3 {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.ephemeral_public_signature_key.as_ref());
        out.extend_from_slice(self.user_id.as_ref());
        out.extend_from_slice(self.delegation_signature.as_ref());
        out.extend_from_slice(self.public_signature_key.as_ref());
        out.extend_from_slice(self.public_encryption_key.as_ref());
        out.extend_from_slice(self.public_user_encryption_key.as_ref());
        out.extend_from_slice(self.sealed_private_user_encryption_key.as_ref());
        out.push(u8::from(self.is_ghost_device));
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        Ok(Self {
            ephemeral_public_signature_key: reader.read_value()?,
            user_id: reader.read_value()?,
            delegation_signature: reader.read_value()?,
            public_signature_key: reader.read_value()?,
            public_encryption_key: reader.read_value()?,
            public_user_encryption_key: reader.read_value()?,
            sealed_private_user_encryption_key: reader.read_value()?,
            is_ghost_device: reader.read_byte()? != 0,
        })
    }
}

// ── Device revocation ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRevocationV1 {
    pub device_id: DeviceId,
}

impl DeviceRevocationV1 {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.device_id.as_ref());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        Ok(Self {
            device_id: reader.read_value()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRevocationV2 {
    pub device_id: DeviceId,
    pub public_encryption_key: PublicEncryptionKey,
    pub previous_public_encryption_key: PublicEncryptionKey,
    pub sealed_key_for_previous_user_key: SealedPrivateEncryptionKey,
    /// One entry per remaining unrevoked device: the new private user key
    /// sealed to that device's encryption key.
    pub sealed_user_keys_for_devices: Vec<(DeviceId, SealedPrivateEncryptionKey)>,
}

impl DeviceRevocationV2 {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.device_id.as_ref());
        out.extend_from_slice(self.public_encryption_key.as_ref());
        out.extend_from_slice(self.previous_public_encryption_key.as_ref());
        out.extend_from_slice(self.sealed_key_for_previous_user_key.as_ref());
        varint_write(out, self.sealed_user_keys_for_devices.len() as u64);
        for (device_id, sealed_key) in &self.sealed_user_keys_for_devices {
            out.extend_from_slice(device_id.as_ref());
            out.extend_from_slice(sealed_key.as_ref());
        }
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        let device_id = reader.read_value()?;
        let public_encryption_key = reader.read_value()?;
        let previous_public_encryption_key = reader.read_value()?;
        let sealed_key_for_previous_user_key = reader.read_value()?;
        let count = reader.read_varint()?;
        let mut sealed_user_keys_for_devices = Vec::with_capacity(
            reader.list_capacity(count, DeviceId::SIZE + SealedPrivateEncryptionKey::SIZE),
        );
        for _ in 0..count {
            sealed_user_keys_for_devices.push((reader.read_value()?, reader.read_value()?));
        }
        Ok(Self {
            device_id,
            public_encryption_key,
            previous_public_encryption_key,
            sealed_key_for_previous_user_key,
            sealed_user_keys_for_devices,
        })
    }
}

// ── Key publishes ────────────────────────────────────────────────────────────

/// Legacy publish addressed to a single device. Read-only: modern chains
/// never produce it, old ones still contain it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPublishToDevice {
    pub recipient: DeviceId,
    pub resource_id: SimpleResourceId,
    pub encrypted_symmetric_key: Vec<u8>,
}

impl KeyPublishToDevice {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.recipient.as_ref());
        out.extend_from_slice(self.resource_id.as_ref());
        out.extend_from_slice(&self.encrypted_symmetric_key);
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        let recipient = reader.read_value()?;
        let resource_id = reader.read_value()?;
        // The key is the rest of the payload; its width varied historically.
        let encrypted_symmetric_key = reader.read(reader.remaining())?.to_vec();
        Ok(Self {
            recipient,
            resource_id,
            encrypted_symmetric_key,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPublishToUser {
    pub recipient_public_encryption_key: PublicEncryptionKey,
    pub resource_id: SimpleResourceId,
    pub sealed_symmetric_key: SealedSymmetricKey,
}

impl KeyPublishToUser {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.recipient_public_encryption_key.as_ref());
        out.extend_from_slice(self.resource_id.as_ref());
        out.extend_from_slice(self.sealed_symmetric_key.as_ref());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        Ok(Self {
            recipient_public_encryption_key: reader.read_value()?,
            resource_id: reader.read_value()?,
            sealed_symmetric_key: reader.read_value()?,
        })
    }
}

/// Same shape as [`KeyPublishToUser`]; the recipient is a group's public
/// encryption key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPublishToUserGroup {
    pub recipient_public_encryption_key: PublicEncryptionKey,
    pub resource_id: SimpleResourceId,
    pub sealed_symmetric_key: SealedSymmetricKey,
}

impl KeyPublishToUserGroup {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.recipient_public_encryption_key.as_ref());
        out.extend_from_slice(self.resource_id.as_ref());
        out.extend_from_slice(self.sealed_symmetric_key.as_ref());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        Ok(Self {
            recipient_public_encryption_key: reader.read_value()?,
            resource_id: reader.read_value()?,
            sealed_symmetric_key: reader.read_value()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPublishToProvisionalUser {
    pub app_public_signature_key: PublicSignatureKey,
    pub resource_id: SimpleResourceId,
    pub service_public_signature_key: PublicSignatureKey,
    /// Resource key sealed to the app half, then to the service half.
    pub two_times_sealed_symmetric_key: TwoTimesSealedSymmetricKey,
}

impl KeyPublishToProvisionalUser {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.app_public_signature_key.as_ref());
        out.extend_from_slice(self.resource_id.as_ref());
        out.extend_from_slice(self.service_public_signature_key.as_ref());
        out.extend_from_slice(self.two_times_sealed_symmetric_key.as_ref());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        Ok(Self {
            app_public_signature_key: reader.read_value()?,
            resource_id: reader.read_value()?,
            service_public_signature_key: reader.read_value()?,
            two_times_sealed_symmetric_key: reader.read_value()?,
        })
    }
}

// ── User groups ──────────────────────────────────────────────────────────────

/// v2 member record: the group private encryption key sealed to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub user_id: UserId,
    pub public_user_encryption_key: PublicEncryptionKey,
    pub sealed_private_group_encryption_key: SealedPrivateEncryptionKey,
}

impl GroupMember {
    const WIRE_SIZE: usize =
        UserId::SIZE + PublicEncryptionKey::SIZE + SealedPrivateEncryptionKey::SIZE;

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.user_id.as_ref());
        out.extend_from_slice(self.public_user_encryption_key.as_ref());
        out.extend_from_slice(self.sealed_private_group_encryption_key.as_ref());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        Ok(Self {
            user_id: reader.read_value()?,
            public_user_encryption_key: reader.read_value()?,
            sealed_private_group_encryption_key: reader.read_value()?,
        })
    }
}

/// v2 provisional member record: the group private encryption key sealed
/// to the app half, then to the service half.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupProvisionalMember {
    pub app_public_signature_key: PublicSignatureKey,
    pub service_public_signature_key: PublicSignatureKey,
    pub sealed_private_group_encryption_key: TwoTimesSealedPrivateEncryptionKey,
}

impl GroupProvisionalMember {
    const WIRE_SIZE: usize =
        2 * PublicSignatureKey::SIZE + TwoTimesSealedPrivateEncryptionKey::SIZE;

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.app_public_signature_key.as_ref());
        out.extend_from_slice(self.service_public_signature_key.as_ref());
        out.extend_from_slice(self.sealed_private_group_encryption_key.as_ref());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        Ok(Self {
            app_public_signature_key: reader.read_value()?,
            service_public_signature_key: reader.read_value()?,
            sealed_private_group_encryption_key: reader.read_value()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupCreationV1 {
    pub public_signature_key: PublicSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    pub sealed_private_signature_key: SealedPrivateSignatureKey,
    pub sealed_private_encryption_keys_for_users:
        Vec<(PublicEncryptionKey, SealedPrivateEncryptionKey)>,
    pub self_signature: Signature,
}

impl UserGroupCreationV1 {
    fn write(&self, out: &mut Vec<u8>) {
        self.write_signed_fields(out);
        out.extend_from_slice(self.self_signature.as_ref());
    }

    fn write_signed_fields(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.public_signature_key.as_ref());
        out.extend_from_slice(self.public_encryption_key.as_ref());
        out.extend_from_slice(self.sealed_private_signature_key.as_ref());
        varint_write(out, self.sealed_private_encryption_keys_for_users.len() as u64);
        for (user_key, sealed_key) in &self.sealed_private_encryption_keys_for_users {
            out.extend_from_slice(user_key.as_ref());
            out.extend_from_slice(sealed_key.as_ref());
        }
    }

    pub fn signature_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        self.write_signed_fields(&mut data);
        data
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        let public_signature_key = reader.read_value()?;
        let public_encryption_key = reader.read_value()?;
        let sealed_private_signature_key = reader.read_value()?;
        let count = reader.read_varint()?;
        let mut sealed_private_encryption_keys_for_users = Vec::with_capacity(
            reader.list_capacity(count, PublicEncryptionKey::SIZE + SealedPrivateEncryptionKey::SIZE),
        );
        for _ in 0..count {
            sealed_private_encryption_keys_for_users
                .push((reader.read_value()?, reader.read_value()?));
        }
        Ok(Self {
            public_signature_key,
            public_encryption_key,
            sealed_private_signature_key,
            sealed_private_encryption_keys_for_users,
            self_signature: reader.read_value()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupCreationV2 {
    pub public_signature_key: PublicSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    pub sealed_private_signature_key: SealedPrivateSignatureKey,
    pub members: Vec<GroupMember>,
    pub provisional_members: Vec<GroupProvisionalMember>,
    pub self_signature: Signature,
}

impl UserGroupCreationV2 {
    fn write(&self, out: &mut Vec<u8>) {
        self.write_signed_fields(out);
        out.extend_from_slice(self.self_signature.as_ref());
    }

    fn write_signed_fields(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.public_signature_key.as_ref());
        out.extend_from_slice(self.public_encryption_key.as_ref());
        out.extend_from_slice(self.sealed_private_signature_key.as_ref());
        varint_write(out, self.members.len() as u64);
        for member in &self.members {
            member.write(out);
        }
        varint_write(out, self.provisional_members.len() as u64);
        for member in &self.provisional_members {
            member.write(out);
        }
    }

    pub fn signature_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        self.write_signed_fields(&mut data);
        data
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        let public_signature_key = reader.read_value()?;
        let public_encryption_key = reader.read_value()?;
        let sealed_private_signature_key = reader.read_value()?;
        let count = reader.read_varint()?;
        let mut members = Vec::with_capacity(reader.list_capacity(count, GroupMember::WIRE_SIZE));
        for _ in 0..count {
            members.push(GroupMember::read(reader)?);
        }
        let count = reader.read_varint()?;
        let mut provisional_members =
            Vec::with_capacity(reader.list_capacity(count, GroupProvisionalMember::WIRE_SIZE));
        for _ in 0..count {
            provisional_members.push(GroupProvisionalMember::read(reader)?);
        }
        Ok(Self {
            public_signature_key,
            public_encryption_key,
            sealed_private_signature_key,
            members,
            provisional_members,
            self_signature: reader.read_value()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupAdditionV1 {
    pub group_id: GroupId,
    pub previous_group_block_hash: ct_crypto::Hash,
    pub sealed_private_encryption_keys_for_users:
        Vec<(PublicEncryptionKey, SealedPrivateEncryptionKey)>,
    pub self_signature: Signature,
}

impl UserGroupAdditionV1 {
    fn write(&self, out: &mut Vec<u8>) {
        self.write_signed_fields(out);
        out.extend_from_slice(self.self_signature.as_ref());
    }

    fn write_signed_fields(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.group_id.as_ref());
        out.extend_from_slice(self.previous_group_block_hash.as_ref());
        varint_write(out, self.sealed_private_encryption_keys_for_users.len() as u64);
        for (user_key, sealed_key) in &self.sealed_private_encryption_keys_for_users {
            out.extend_from_slice(user_key.as_ref());
            out.extend_from_slice(sealed_key.as_ref());
        }
    }

    pub fn signature_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        self.write_signed_fields(&mut data);
        data
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        let group_id = reader.read_value()?;
        let previous_group_block_hash = reader.read_value()?;
        let count = reader.read_varint()?;
        let mut sealed_private_encryption_keys_for_users = Vec::with_capacity(
            reader.list_capacity(count, PublicEncryptionKey::SIZE + SealedPrivateEncryptionKey::SIZE),
        );
        for _ in 0..count {
            sealed_private_encryption_keys_for_users
                .push((reader.read_value()?, reader.read_value()?));
        }
        Ok(Self {
            group_id,
            previous_group_block_hash,
            sealed_private_encryption_keys_for_users,
            self_signature: reader.read_value()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupAdditionV2 {
    pub group_id: GroupId,
    pub previous_group_block_hash: ct_crypto::Hash,
    pub members: Vec<GroupMember>,
    pub provisional_members: Vec<GroupProvisionalMember>,
    pub self_signature: Signature,
}

impl UserGroupAdditionV2 {
    fn write(&self, out: &mut Vec<u8>) {
        self.write_signed_fields(out);
        out.extend_from_slice(self.self_signature.as_ref());
    }

    fn write_signed_fields(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.group_id.as_ref());
        out.extend_from_slice(self.previous_group_block_hash.as_ref());
        varint_write(out, self.members.len() as u64);
        for member in &self.members {
            member.write(out);
        }
        varint_write(out, self.provisional_members.len() as u64);
        for member in &self.provisional_members {
            member.write(out);
        }
    }

    pub fn signature_data(&self) -> Vec<u8> {
        let mut data = Vec::new();
        self.write_signed_fields(&mut data);
        data
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        let group_id = reader.read_value()?;
        let previous_group_block_hash = reader.read_value()?;
        let count = reader.read_varint()?;
        let mut members = Vec::with_capacity(reader.list_capacity(count, GroupMember::WIRE_SIZE));
        for _ in 0..count {
            members.push(GroupMember::read(reader)?);
        }
        let count = reader.read_varint()?;
        let mut provisional_members =
            Vec::with_capacity(reader.list_capacity(count, GroupProvisionalMember::WIRE_SIZE));
        for _ in 0..count {
            provisional_members.push(GroupProvisionalMember::read(reader)?);
        }
        Ok(Self {
            group_id,
            previous_group_block_hash,
            members,
            provisional_members,
            self_signature: reader.read_value()?,
        })
    }
}

// ── Provisional identity claim ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalIdentityClaim {
    pub user_id: UserId,
    pub app_public_signature_key: PublicSignatureKey,
    pub service_public_signature_key: PublicSignatureKey,
    pub author_signature_by_app_key: Signature,
    pub author_signature_by_service_key: Signature,
    pub recipient_user_public_key: PublicEncryptionKey,
    pub sealed_private_encryption_keys: SealedPrivateEncryptionKeys,
}

impl ProvisionalIdentityClaim {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.user_id.as_ref());
        out.extend_from_slice(self.app_public_signature_key.as_ref());
        out.extend_from_slice(self.service_public_signature_key.as_ref());
        out.extend_from_slice(self.author_signature_by_app_key.as_ref());
        out.extend_from_slice(self.author_signature_by_service_key.as_ref());
        out.extend_from_slice(self.recipient_user_public_key.as_ref());
        out.extend_from_slice(self.sealed_private_encryption_keys.as_ref());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ProtoError> {
        Ok(Self {
            user_id: reader.read_value()?,
            app_public_signature_key: reader.read_value()?,
            service_public_signature_key: reader.read_value()?,
            author_signature_by_app_key: reader.read_value()?,
            author_signature_by_service_key: reader.read_value()?,
            recipient_user_public_key: reader.read_value()?,
            sealed_private_encryption_keys: reader.read_value()?,
        })
    }

    /// Bytes covered by the app and service provisional signatures; bound
    /// to the claiming device so a claim cannot be replayed elsewhere.
    pub fn signature_data(&self, author: &DeviceId) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(author.as_ref());
        data.extend_from_slice(self.user_id.as_ref());
        data.extend_from_slice(self.app_public_signature_key.as_ref());
        data.extend_from_slice(self.service_public_signature_key.as_ref());
        data.extend_from_slice(self.recipient_user_public_key.as_ref());
        data.extend_from_slice(self.sealed_private_encryption_keys.as_ref());
        data
    }
}

// ── Payload sum type ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    TrustchainCreation(TrustchainCreation),
    DeviceCreation1(DeviceCreationV1),
    DeviceCreation2(DeviceCreationV1),
    DeviceCreation3(DeviceCreationV3),
    DeviceRevocation1(DeviceRevocationV1),
    DeviceRevocation2(DeviceRevocationV2),
    KeyPublishToDevice(KeyPublishToDevice),
    KeyPublishToUser(KeyPublishToUser),
    KeyPublishToUserGroup(KeyPublishToUserGroup),
    KeyPublishToProvisionalUser(KeyPublishToProvisionalUser),
    UserGroupCreation1(UserGroupCreationV1),
    UserGroupCreation2(UserGroupCreationV2),
    UserGroupAddition1(UserGroupAdditionV1),
    UserGroupAddition2(UserGroupAdditionV2),
    ProvisionalIdentityClaim(ProvisionalIdentityClaim),
}

impl Payload {
    pub fn nature(&self) -> Nature {
        match self {
            Payload::TrustchainCreation(_) => Nature::TrustchainCreation,
            Payload::DeviceCreation1(_) => Nature::DeviceCreation1,
            Payload::DeviceCreation2(_) => Nature::DeviceCreation2,
            Payload::DeviceCreation3(_) => Nature::DeviceCreation3,
            Payload::DeviceRevocation1(_) => Nature::DeviceRevocation1,
            Payload::DeviceRevocation2(_) => Nature::DeviceRevocation2,
            Payload::KeyPublishToDevice(_) => Nature::KeyPublishToDevice,
            Payload::KeyPublishToUser(_) => Nature::KeyPublishToUser,
            Payload::KeyPublishToUserGroup(_) => Nature::KeyPublishToUserGroup,
            Payload::KeyPublishToProvisionalUser(_) => Nature::KeyPublishToProvisionalUser,
            Payload::UserGroupCreation1(_) => Nature::UserGroupCreation1,
            Payload::UserGroupCreation2(_) => Nature::UserGroupCreation2,
            Payload::UserGroupAddition1(_) => Nature::UserGroupAddition1,
            Payload::UserGroupAddition2(_) => Nature::UserGroupAddition2,
            Payload::ProvisionalIdentityClaim(_) => Nature::ProvisionalIdentityClaim,
        }
    }

    /// Canonical payload encoding for the wire and for hashing.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Payload::TrustchainCreation(p) => p.write(&mut out),
            Payload::DeviceCreation1(p) | Payload::DeviceCreation2(p) => p.write(&mut out),
            Payload::DeviceCreation3(p) => p.write(&mut out),
            Payload::DeviceRevocation1(p) => p.write(&mut out),
            Payload::DeviceRevocation2(p) => p.write(&mut out),
            Payload::KeyPublishToDevice(p) => p.write(&mut out),
            Payload::KeyPublishToUser(p) => p.write(&mut out),
            Payload::KeyPublishToUserGroup(p) => p.write(&mut out),
            Payload::KeyPublishToProvisionalUser(p) => p.write(&mut out),
            Payload::UserGroupCreation1(p) => p.write(&mut out),
            Payload::UserGroupCreation2(p) => p.write(&mut out),
            Payload::UserGroupAddition1(p) => p.write(&mut out),
            Payload::UserGroupAddition2(p) => p.write(&mut out),
            Payload::ProvisionalIdentityClaim(p) => p.write(&mut out),
        }
        out
    }

    /// Decode a payload of the given nature. The reader must hold exactly
    /// the payload bytes; trailing input is rejected.
    pub fn from_bytes(nature: Nature, payload: &[u8]) -> Result<Self, ProtoError> {
        let mut reader = Reader::new(payload);
        let decoded = match nature {
            Nature::TrustchainCreation => {
                Payload::TrustchainCreation(TrustchainCreation::read(&mut reader)?)
            }
            Nature::DeviceCreation1 => {
                Payload::DeviceCreation1(DeviceCreationV1::read(&mut reader)?)
            }
            Nature::DeviceCreation2 => {
                Payload::DeviceCreation2(DeviceCreationV1::read(&mut reader)?)
            }
            Nature::DeviceCreation3 => {
                Payload::DeviceCreation3(DeviceCreationV3::read(&mut reader)?)
            }
            Nature::DeviceRevocation1 => {
                Payload::DeviceRevocation1(DeviceRevocationV1::read(&mut reader)?)
            }
            Nature::DeviceRevocation2 => {
                Payload::DeviceRevocation2(DeviceRevocationV2::read(&mut reader)?)
            }
            Nature::KeyPublishToDevice => {
                Payload::KeyPublishToDevice(KeyPublishToDevice::read(&mut reader)?)
            }
            Nature::KeyPublishToUser => {
                Payload::KeyPublishToUser(KeyPublishToUser::read(&mut reader)?)
            }
            Nature::KeyPublishToUserGroup => {
                Payload::KeyPublishToUserGroup(KeyPublishToUserGroup::read(&mut reader)?)
            }
            Nature::KeyPublishToProvisionalUser => {
                Payload::KeyPublishToProvisionalUser(KeyPublishToProvisionalUser::read(&mut reader)?)
            }
            Nature::UserGroupCreation1 => {
                Payload::UserGroupCreation1(UserGroupCreationV1::read(&mut reader)?)
            }
            Nature::UserGroupCreation2 => {
                Payload::UserGroupCreation2(UserGroupCreationV2::read(&mut reader)?)
            }
            Nature::UserGroupAddition1 => {
                Payload::UserGroupAddition1(UserGroupAdditionV1::read(&mut reader)?)
            }
            Nature::UserGroupAddition2 => {
                Payload::UserGroupAddition2(UserGroupAdditionV2::read(&mut reader)?)
            }
            Nature::ProvisionalIdentityClaim => {
                Payload::ProvisionalIdentityClaim(ProvisionalIdentityClaim::read(&mut reader)?)
            }
        };
        reader.expect_end()?;
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make<T: for<'a> TryFrom<&'a [u8], Error = ct_crypto::CryptoError>>(
        text: &str,
        size: usize,
    ) -> T {
        let mut bytes = vec![0u8; size];
        bytes[..text.len()].copy_from_slice(text.as_bytes());
        T::try_from(bytes.as_slice()).unwrap()
    }

    #[test]
    fn user_group_addition_v1_test_vector() {
        // Byte-for-byte reference encoding from the production wire format.
        let mut expected = Vec::new();
        expected.extend_from_slice(make::<GroupId>("group id", 32).as_ref());
        expected.extend_from_slice(make::<ct_crypto::Hash>("prev group block", 32).as_ref());
        expected.push(0x02);
        expected.extend_from_slice(make::<PublicEncryptionKey>("pub user key", 32).as_ref());
        expected.extend_from_slice(
            make::<SealedPrivateEncryptionKey>("encrypted group priv key", 80).as_ref(),
        );
        expected
            .extend_from_slice(make::<PublicEncryptionKey>("second pub user key", 32).as_ref());
        expected.extend_from_slice(
            make::<SealedPrivateEncryptionKey>("second encrypted group priv key", 80).as_ref(),
        );
        expected.extend_from_slice(make::<Signature>("self signature", 64).as_ref());

        let uga = UserGroupAdditionV1 {
            group_id: make("group id", 32),
            previous_group_block_hash: make("prev group block", 32),
            sealed_private_encryption_keys_for_users: vec![
                (
                    make("pub user key", 32),
                    make("encrypted group priv key", 80),
                ),
                (
                    make("second pub user key", 32),
                    make("second encrypted group priv key", 80),
                ),
            ],
            self_signature: make("self signature", 64),
        };

        let payload = Payload::UserGroupAddition1(uga.clone());
        assert_eq!(payload.to_bytes(), expected);
        assert_eq!(
            Payload::from_bytes(Nature::UserGroupAddition1, &expected).unwrap(),
            payload
        );
        // The self signature covers everything before itself.
        assert_eq!(uga.signature_data(), expected[..expected.len() - 64].to_vec());
    }

    #[test]
    fn provisional_identity_claim_roundtrip() {
        let claim = ProvisionalIdentityClaim {
            user_id: make("the user id", 32),
            app_public_signature_key: make("the app sig pub key", 32),
            service_public_signature_key: make("the service sig pub key", 32),
            author_signature_by_app_key: make("the author sig by app key", 64),
            author_signature_by_service_key: make("the author sig by service key", 64),
            recipient_user_public_key: make("user pub key", 32),
            sealed_private_encryption_keys: make("both encrypted private keys", 112),
        };
        let payload = Payload::ProvisionalIdentityClaim(claim);
        let bytes = payload.to_bytes();
        assert_eq!(bytes.len(), 32 + 32 + 32 + 64 + 64 + 32 + 112);
        assert_eq!(
            Payload::from_bytes(Nature::ProvisionalIdentityClaim, &bytes).unwrap(),
            payload
        );
    }

    #[test]
    fn device_revocation_v2_roundtrip() {
        let revocation = DeviceRevocationV2 {
            device_id: make("revoked device", 32),
            public_encryption_key: make("new user key", 32),
            previous_public_encryption_key: make("previous user key", 32),
            sealed_key_for_previous_user_key: make("sealed previous key", 80),
            sealed_user_keys_for_devices: vec![
                (make("remaining device", 32), make("sealed new key", 80)),
            ],
        };
        let payload = Payload::DeviceRevocation2(revocation);
        let bytes = payload.to_bytes();
        assert_eq!(bytes.len(), 32 + 32 + 32 + 80 + 1 + 112);
        assert_eq!(
            Payload::from_bytes(Nature::DeviceRevocation2, &bytes).unwrap(),
            payload
        );
    }

    #[test]
    fn huge_declared_counts_error_instead_of_allocating() {
        // A revocation v2 payload whose member count claims ~2^63 entries
        // but carries none. The decode must fail on the bounds-checked
        // reads, never reserve for the declared count.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(make::<DeviceId>("revoked device", 32).as_ref());
        bytes.extend_from_slice(make::<PublicEncryptionKey>("new user key", 32).as_ref());
        bytes.extend_from_slice(make::<PublicEncryptionKey>("previous user key", 32).as_ref());
        bytes.extend_from_slice(
            make::<SealedPrivateEncryptionKey>("sealed previous key", 80).as_ref(),
        );
        varint_write(&mut bytes, u64::MAX >> 1);
        assert!(matches!(
            Payload::from_bytes(Nature::DeviceRevocation2, &bytes),
            Err(ProtoError::TruncatedInput { .. })
        ));

        // Same shape for a v2 group creation's member vectors.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(make::<PublicSignatureKey>("group sig key", 32).as_ref());
        bytes.extend_from_slice(make::<PublicEncryptionKey>("group enc key", 32).as_ref());
        bytes.extend_from_slice(
            make::<SealedPrivateSignatureKey>("sealed group sig key", 112).as_ref(),
        );
        varint_write(&mut bytes, u64::MAX >> 1);
        assert!(matches!(
            Payload::from_bytes(Nature::UserGroupCreation2, &bytes),
            Err(ProtoError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn trailing_payload_bytes_are_rejected() {
        let payload = Payload::DeviceRevocation1(DeviceRevocationV1 {
            device_id: make("some device", 32),
        });
        let mut bytes = payload.to_bytes();
        bytes.push(0x00);
        assert!(matches!(
            Payload::from_bytes(Nature::DeviceRevocation1, &bytes),
            Err(ProtoError::TrailingInput(1))
        ));
    }

    #[test]
    fn key_publish_to_device_keeps_opaque_key_bytes() {
        let publish = KeyPublishToDevice {
            recipient: make("recipient device", 32),
            resource_id: make("resource", 16),
            encrypted_symmetric_key: vec![0xab; 72],
        };
        let payload = Payload::KeyPublishToDevice(publish);
        let bytes = payload.to_bytes();
        assert_eq!(
            Payload::from_bytes(Nature::KeyPublishToDevice, &bytes).unwrap(),
            payload
        );
    }
}
