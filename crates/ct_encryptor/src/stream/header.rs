//! Stream headers.
//!
//! v4/v8 repeat a full header in front of every chunk:
//!
//! ```text
//! version(1) | encryptedChunkSize(u32 LE) | resourceId(16) | ivSeed(24)
//! ```
//!
//! v11 writes a single 37-byte header for the whole stream:
//!
//! ```text
//! version(1)=11 | sessionId(16) | subkeySeed(16) | encryptedChunkSize(u32 LE)
//! ```

use ct_crypto::{AeadIv, Mac, SimpleResourceId, SubkeySeed};

use crate::error::EncryptorError;

pub const DEFAULT_ENCRYPTED_CHUNK_SIZE: u32 = 1024 * 1024;

/// Per-chunk header of the v4/v8 formats (45 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub encrypted_chunk_size: u32,
    pub resource_id: SimpleResourceId,
    pub iv_seed: AeadIv,
}

impl Header {
    pub const SERIALIZED_SIZE: usize = 1 + 4 + SimpleResourceId::SIZE + AeadIv::SIZE;

    /// Whole-chunk overhead: header plus MAC.
    pub const CHUNK_OVERHEAD: usize = Self::SERIALIZED_SIZE + Mac::SIZE;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SERIALIZED_SIZE);
        out.push(self.version);
        out.extend_from_slice(&self.encrypted_chunk_size.to_le_bytes());
        out.extend_from_slice(self.resource_id.as_ref());
        out.extend_from_slice(self.iv_seed.as_ref());
        out
    }

    /// Parse a header; `DecryptionFailed` on any shortfall, since inside a
    /// stream a missing header means a truncated or reordered ciphertext.
    pub fn from_bytes(data: &[u8]) -> Result<Self, EncryptorError> {
        if data.len() < Self::SERIALIZED_SIZE {
            return Err(EncryptorError::DecryptionFailed("truncated chunk header"));
        }
        let version = data[0];
        let encrypted_chunk_size =
            u32::from_le_bytes(data[1..5].try_into().expect("fixed 4-byte range"));
        let resource_id =
            SimpleResourceId::from_slice(&data[5..21]).expect("fixed 16-byte range");
        let iv_seed = AeadIv::from_slice(&data[21..45]).expect("fixed 24-byte range");
        let header = Self {
            version,
            encrypted_chunk_size,
            resource_id,
            iv_seed,
        };
        // Below this, a chunk cannot even hold its own header and MAC.
        if (header.encrypted_chunk_size as usize) < Self::CHUNK_OVERHEAD {
            return Err(EncryptorError::DecryptionFailed(
                "declared encryptedChunkSize below the minimum",
            ));
        }
        Ok(header)
    }
}

/// Single stream header of the v11 format (37 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransparentSessionHeader {
    pub version: u8,
    pub session_id: SimpleResourceId,
    pub subkey_seed: SubkeySeed,
    pub encrypted_chunk_size: u32,
}

impl TransparentSessionHeader {
    pub const SERIALIZED_SIZE: usize = 1 + SimpleResourceId::SIZE + SubkeySeed::SIZE + 4;

    /// Per-chunk overhead: the in-chunk padding-size field plus MAC.
    pub const CHUNK_OVERHEAD: usize = 4 + Mac::SIZE;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::SERIALIZED_SIZE);
        out.push(self.version);
        out.extend_from_slice(self.session_id.as_ref());
        out.extend_from_slice(self.subkey_seed.as_ref());
        out.extend_from_slice(&self.encrypted_chunk_size.to_le_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, EncryptorError> {
        if data.len() < Self::SERIALIZED_SIZE {
            return Err(EncryptorError::InvalidArgument("truncated encrypted buffer"));
        }
        let version = data[0];
        let session_id = SimpleResourceId::from_slice(&data[1..17]).expect("fixed 16-byte range");
        let subkey_seed = SubkeySeed::from_slice(&data[17..33]).expect("fixed 16-byte range");
        let encrypted_chunk_size =
            u32::from_le_bytes(data[33..37].try_into().expect("fixed 4-byte range"));
        let header = Self {
            version,
            session_id,
            subkey_seed,
            encrypted_chunk_size,
        };
        if (header.encrypted_chunk_size as usize) <= Self::CHUNK_OVERHEAD {
            return Err(EncryptorError::DecryptionFailed(
                "declared encryptedChunkSize below the minimum",
            ));
        }
        Ok(header)
    }
}
