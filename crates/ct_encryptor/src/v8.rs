//! Format v8: the v4 stream with padded plaintext.
//!
//! The 0x80-boundary padding is applied to the whole clear stream before
//! chunking; unpadding happens after the last chunk decrypts.

use ct_crypto::{
    pad_clear_data, padded_from_clear_size, unpadded_size, Padding, ResourceId, SymmetricKey,
};

use crate::error::EncryptorError;
use crate::key_finder::{FixedKeyFinder, ResourceKeyFinder};
use crate::stream::{
    read_all, BufferSource, DecryptionStream, EncryptionStream, Header,
    DEFAULT_ENCRYPTED_CHUNK_SIZE,
};
use crate::v4::Metadata;

pub const VERSION: u8 = 8;

pub fn encrypted_size(clear_size: u64, padding: Padding) -> u64 {
    let padded = padded_from_clear_size(clear_size, padding);
    let clear_chunk_size = (DEFAULT_ENCRYPTED_CHUNK_SIZE as usize - Header::CHUNK_OVERHEAD) as u64;
    padded + (padded / clear_chunk_size + 1) * Header::CHUNK_OVERHEAD as u64
}

/// Upper bound: includes padding that only decryption can measure.
pub fn decrypted_size(encrypted_data: &[u8]) -> Result<u64, EncryptorError> {
    crate::v4::decrypted_size(encrypted_data)
}

pub async fn encrypt(
    clear_data: &[u8],
    padding: Padding,
) -> Result<(Vec<u8>, Metadata), EncryptorError> {
    let padded = pad_clear_data(clear_data, padding);
    let mut stream = EncryptionStream::new(
        BufferSource::new(&padded),
        VERSION,
        DEFAULT_ENCRYPTED_CHUNK_SIZE,
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
    let mut padded = read_all(&mut stream).await?;
    let size = unpadded_size(&padded).map_err(EncryptorError::from)?;
    padded.truncate(size);
    Ok(padded)
}

pub async fn decrypt_with_key(
    key: &SymmetricKey,
    encrypted_data: &[u8],
) -> Result<Vec<u8>, EncryptorError> {
    decrypt(&FixedKeyFinder(*key), encrypted_data).await
}

pub fn extract_resource_id(encrypted_data: &[u8]) -> Result<ResourceId, EncryptorError> {
    crate::v4::extract_resource_id(encrypted_data)
}
