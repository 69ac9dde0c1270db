//! Format v11: transparent session, streaming. One-shot entry points over
//! the v11 stream machines.

use ct_crypto::{
    padded_from_clear_size, Padding, ResourceId, SimpleResourceId, SubkeySeed, SymmetricKey,
};

use crate::error::EncryptorError;
use crate::key_finder::ResourceKeyFinder;
use crate::stream::{
    read_all, BufferSource, DecryptionStreamV11, EncryptionStreamV11, TransparentSessionHeader,
    DEFAULT_ENCRYPTED_CHUNK_SIZE,
};

pub const VERSION: u8 = 11;

pub fn encrypted_size(clear_size: u64, padding: Padding) -> u64 {
    encrypted_size_with_chunk_size(clear_size, padding, DEFAULT_ENCRYPTED_CHUNK_SIZE)
}

pub fn encrypted_size_with_chunk_size(
    clear_size: u64,
    padding: Padding,
    encrypted_chunk_size: u32,
) -> u64 {
    // No boundary byte on this format: the per-chunk padding-size fields
    // replace the 0x80 marker.
    let padded = padded_from_clear_size(clear_size, padding) - 1;
    let clear_chunk_size =
        (encrypted_chunk_size as usize - TransparentSessionHeader::CHUNK_OVERHEAD) as u64;
    let full_chunks = padded / clear_chunk_size;
    let last_clear = padded % clear_chunk_size;
    TransparentSessionHeader::SERIALIZED_SIZE as u64
        + full_chunks * encrypted_chunk_size as u64
        + last_clear
        + TransparentSessionHeader::CHUNK_OVERHEAD as u64
}

/// Upper bound: includes padding that only decryption can measure.
pub fn decrypted_size(encrypted_data: &[u8]) -> Result<u64, EncryptorError> {
    let header = TransparentSessionHeader::from_bytes(encrypted_data)?;
    let chunk_size = header.encrypted_chunk_size as u64;
    let overhead = TransparentSessionHeader::CHUNK_OVERHEAD as u64;
    let remaining = (encrypted_data.len() - TransparentSessionHeader::SERIALIZED_SIZE) as u64;
    if remaining < overhead {
        return Err(EncryptorError::InvalidArgument("truncated encrypted buffer"));
    }
    let full_chunks = remaining / chunk_size;
    let last_chunk = remaining % chunk_size;
    if last_chunk != 0 && last_chunk < overhead {
        return Err(EncryptorError::InvalidArgument("truncated encrypted buffer"));
    }
    Ok(full_chunks * (chunk_size - overhead) + last_chunk.saturating_sub(overhead))
}

pub async fn encrypt(
    clear_data: &[u8],
    session_id: &SimpleResourceId,
    session_key: &SymmetricKey,
    subkey_seed: &SubkeySeed,
    padding: Padding,
) -> Result<Vec<u8>, EncryptorError> {
    encrypt_with_chunk_size(
        clear_data,
        session_id,
        session_key,
        subkey_seed,
        padding,
        DEFAULT_ENCRYPTED_CHUNK_SIZE,
    )
    .await
}

pub async fn encrypt_with_chunk_size(
    clear_data: &[u8],
    session_id: &SimpleResourceId,
    session_key: &SymmetricKey,
    subkey_seed: &SubkeySeed,
    padding: Padding,
    encrypted_chunk_size: u32,
) -> Result<Vec<u8>, EncryptorError> {
    let mut stream = EncryptionStreamV11::new(
        BufferSource::new(clear_data),
        *session_id,
        *session_key,
        *subkey_seed,
        padding,
        encrypted_chunk_size,
    );
    read_all(&mut stream).await
}

pub async fn decrypt(
    key_finder: &dyn ResourceKeyFinder,
    encrypted_data: &[u8],
) -> Result<Vec<u8>, EncryptorError> {
    let mut stream =
        DecryptionStreamV11::create(BufferSource::new(encrypted_data), key_finder).await?;
    read_all(&mut stream).await
}

pub fn extract_resource_id(encrypted_data: &[u8]) -> Result<ResourceId, EncryptorError> {
    let header = TransparentSessionHeader::from_bytes(encrypted_data)?;
    Ok(ResourceId::Composite(
        ct_crypto::CompositeResourceId::transparent_session(
            &header.session_id,
            &header.subkey_seed,
        ),
    ))
}
