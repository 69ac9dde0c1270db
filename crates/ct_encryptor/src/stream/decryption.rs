//! Chunk-by-chunk decoder for the v4/v8 formats.
//!
//! Enforcement: every chunk's header must equal the first chunk's header,
//! chunks decrypt under an IV bound to their position, and the stream must
//! end on a short chunk. Anything else is `DecryptionFailed`.

use async_trait::async_trait;
use ct_crypto::{aead_decrypt, derive_iv, ResourceId, SymmetricKey};

use crate::error::EncryptorError;
use crate::key_finder::ResourceKeyFinder;

use super::header::Header;
use super::{read_exact_or_eof, InputSource, OutputBuffer};

pub struct DecryptionStream<S: InputSource> {
    source: S,
    header: Header,
    key: SymmetricKey,
    chunk_index: u64,
    output: OutputBuffer,
    finished: bool,
}

impl<S: InputSource> DecryptionStream<S> {
    /// Read the first chunk's header, resolve the key, and decrypt the
    /// first chunk eagerly so a corrupt stream fails at creation.
    pub async fn create(
        mut source: S,
        key_finder: &dyn ResourceKeyFinder,
    ) -> Result<Self, EncryptorError> {
        let mut header_bytes = [0u8; Header::SERIALIZED_SIZE];
        let n = read_exact_or_eof(&mut source, &mut header_bytes).await?;
        if n < header_bytes.len() {
            return Err(EncryptorError::DecryptionFailed("truncated chunk header"));
        }
        let header = Header::from_bytes(&header_bytes)?;
        let key = key_finder
            .find_resource_key(ResourceId::Simple(header.resource_id))
            .await
            .map_err(EncryptorError::KeyLookup)?
            .ok_or(EncryptorError::DecryptionFailed("resource key not found"))?;

        let mut stream = Self {
            source,
            header,
            key,
            chunk_index: 0,
            output: OutputBuffer::default(),
            finished: false,
        };
        stream.decrypt_chunk_body().await?;
        Ok(stream)
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId::Simple(self.header.resource_id)
    }

    /// Decrypt the body of the current chunk (its header has already been
    /// consumed and validated).
    async fn decrypt_chunk_body(&mut self) -> Result<(), EncryptorError> {
        let body_size = self.header.encrypted_chunk_size as usize - Header::SERIALIZED_SIZE;
        let mut body = vec![0u8; body_size];
        let n = read_exact_or_eof(&mut self.source, &mut body).await?;
        if n < ct_crypto::Mac::SIZE {
            return Err(EncryptorError::DecryptionFailed("stream ends mid-chunk"));
        }
        body.truncate(n);

        let iv = derive_iv(&self.header.iv_seed, self.chunk_index);
        let clear = aead_decrypt(&self.key, &iv, &body, &[])
            .map_err(|_| EncryptorError::DecryptionFailed("chunk MAC verification failed"))?;
        self.output.push(&clear);
        self.chunk_index += 1;

        if n < body_size {
            self.finished = true;
        }
        Ok(())
    }

    async fn decrypt_next_chunk(&mut self) -> Result<(), EncryptorError> {
        let mut header_bytes = [0u8; Header::SERIALIZED_SIZE];
        let n = read_exact_or_eof(&mut self.source, &mut header_bytes).await?;
        if n < header_bytes.len() {
            // The previous chunk was full-sized, so the stream promised
            // another chunk; its absence is a truncation.
            return Err(EncryptorError::DecryptionFailed("truncated chunk header"));
        }
        let header = Header::from_bytes(&header_bytes)?;
        if header != self.header {
            return Err(EncryptorError::DecryptionFailed(
                "chunk header differs from the stream header",
            ));
        }
        self.decrypt_chunk_body().await
    }
}

#[async_trait]
impl<S: InputSource> InputSource for DecryptionStream<S> {
    async fn read(&mut self, out: &mut [u8]) -> Result<usize, EncryptorError> {
        if self.output.is_empty() && !self.finished {
            self.decrypt_next_chunk().await?;
        }
        Ok(self.output.pop_into(out))
    }
}
