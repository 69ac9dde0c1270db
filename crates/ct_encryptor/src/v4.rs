//! Format v4: chunked stream, one 45-byte header per chunk.
//!
//! ```text
//! chunk := version(1)=4 | encryptedChunkSize(u32 LE) | resourceId(16)
//!          | ivSeed(24) | aead(plaintext_i, iv = derive_iv(ivSeed, i))
//! ```
//!
//! All chunks of a stream repeat the same header; the per-chunk IV binds
//! each chunk to its index.

use ct_crypto::{ResourceId, SymmetricKey};

use crate::error::EncryptorError;
use crate::key_finder::{FixedKeyFinder, ResourceKeyFinder};
use crate::stream::{
    read_all, BufferSource, DecryptionStream, EncryptionStream, Header,
    DEFAULT_ENCRYPTED_CHUNK_SIZE,
};

pub const VERSION: u8 = 4;

/// Key and id under which a one-shot v4 encryption must be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub resource_id: ResourceId,
    pub key: SymmetricKey,
}

pub fn encrypted_size(clear_size: u64) -> u64 {
    encrypted_size_with_chunk_size(clear_size, DEFAULT_ENCRYPTED_CHUNK_SIZE)
}

pub fn encrypted_size_with_chunk_size(clear_size: u64, encrypted_chunk_size: u32) -> u64 {
    let clear_chunk_size = (encrypted_chunk_size as usize - Header::CHUNK_OVERHEAD) as u64;
    let full_chunks = clear_size / clear_chunk_size;
    // The terminal chunk always exists, possibly empty (the sentinel).
    clear_size + (full_chunks + 1) * Header::CHUNK_OVERHEAD as u64
}

pub fn decrypted_size(encrypted_data: &[u8]) -> Result<u64, EncryptorError> {
    let header = Header::from_bytes(encrypted_data)
        .map_err(|_| EncryptorError::InvalidArgument("truncated encrypted buffer"))?;
    let chunk_size = header.encrypted_chunk_size as u64;
    let total = encrypted_data.len() as u64;
    let full_chunks = total / chunk_size;
    let last_chunk = total % chunk_size;
    if last_chunk != 0 && last_chunk < Header::CHUNK_OVERHEAD as u64 {
        return Err(EncryptorError::InvalidArgument("truncated encrypted buffer"));
    }
    let last_clear = last_chunk.saturating_sub(Header::CHUNK_OVERHEAD as u64);
    Ok(full_chunks * (chunk_size - Header::CHUNK_OVERHEAD as u64) + last_clear)
}

pub async fn encrypt(clear_data: &[u8]) -> Result<(Vec<u8>, Metadata), EncryptorError> {
    encrypt_with_chunk_size(clear_data, DEFAULT_ENCRYPTED_CHUNK_SIZE).await
}

pub async fn encrypt_with_chunk_size(
    clear_data: &[u8],
    encrypted_chunk_size: u32,
) -> Result<(Vec<u8>, Metadata), EncryptorError> {
    let mut stream = EncryptionStream::new(
        BufferSource::new(clear_data),
        VERSION,
        encrypted_chunk_size,
    );
    let encrypted = read_all(&mut stream).await?;
    Ok((
        encrypted,
        Metadata {
            resource_id: ResourceId::Simple(stream.resource_id()),
            key: stream.symmetric_key(),
        },
    ))
}

pub async fn decrypt(
    key_finder: &dyn ResourceKeyFinder,
    encrypted_data: &[u8],
) -> Result<Vec<u8>, EncryptorError> {
    let mut stream =
        DecryptionStream::create(BufferSource::new(encrypted_data), key_finder).await?;
    read_all(&mut stream).await
}

pub async fn decrypt_with_key(
    key: &SymmetricKey,
    encrypted_data: &[u8],
) -> Result<Vec<u8>, EncryptorError> {
    decrypt(&FixedKeyFinder(*key), encrypted_data).await
}

pub fn extract_resource_id(encrypted_data: &[u8]) -> Result<ResourceId, EncryptorError> {
    let header = Header::from_bytes(encrypted_data)
        .map_err(|_| EncryptorError::InvalidArgument("truncated encrypted buffer"))?;
    Ok(ResourceId::Simple(header.resource_id))
}
