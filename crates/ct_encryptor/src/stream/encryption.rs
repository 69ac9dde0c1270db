//! Chunking encoder for the v4/v8 formats.

use async_trait::async_trait;
use ct_crypto::{
    aead_encrypt, derive_iv, make_symmetric_key, AeadIv, SimpleResourceId, SymmetricKey,
};

use crate::error::EncryptorError;

use super::header::Header;
use super::{read_exact_or_eof, InputSource, OutputBuffer};

pub struct EncryptionStream<S: InputSource> {
    source: S,
    header: Header,
    key: SymmetricKey,
    chunk_index: u64,
    output: OutputBuffer,
    finished: bool,
}

impl<S: InputSource> EncryptionStream<S> {
    pub fn new(source: S, version: u8, encrypted_chunk_size: u32) -> Self {
        Self::with_key(
            source,
            version,
            encrypted_chunk_size,
            make_symmetric_key(),
            SimpleResourceId::random(),
        )
    }

    pub fn with_key(
        source: S,
        version: u8,
        encrypted_chunk_size: u32,
        key: SymmetricKey,
        resource_id: SimpleResourceId,
    ) -> Self {
        debug_assert!(encrypted_chunk_size as usize >= Header::CHUNK_OVERHEAD);
        Self {
            source,
            header: Header {
                version,
                encrypted_chunk_size,
                resource_id,
                iv_seed: AeadIv::random(),
            },
            key,
            chunk_index: 0,
            output: OutputBuffer::default(),
            finished: false,
        }
    }

    pub fn resource_id(&self) -> SimpleResourceId {
        self.header.resource_id
    }

    pub fn symmetric_key(&self) -> SymmetricKey {
        self.key
    }

    fn clear_chunk_size(&self) -> usize {
        self.header.encrypted_chunk_size as usize - Header::CHUNK_OVERHEAD
    }

    /// Pull one clear chunk from the source and emit its encrypted form.
    /// A short (possibly empty) chunk terminates the stream.
    async fn produce_chunk(&mut self) -> Result<(), EncryptorError> {
        let mut clear = vec![0u8; self.clear_chunk_size()];
        let n = read_exact_or_eof(&mut self.source, &mut clear).await?;
        clear.truncate(n);

        let iv = derive_iv(&self.header.iv_seed, self.chunk_index);
        let encrypted = aead_encrypt(&self.key, &iv, &clear, &[])?;
        self.output.push(&self.header.to_bytes());
        self.output.push(&encrypted);
        self.chunk_index += 1;

        if n < self.clear_chunk_size() {
            self.finished = true;
        }
        Ok(())
    }
}

#[async_trait]
impl<S: InputSource> InputSource for EncryptionStream<S> {
    async fn read(&mut self, out: &mut [u8]) -> Result<usize, EncryptorError> {
        if self.output.is_empty() && !self.finished {
            self.produce_chunk().await?;
        }
        Ok(self.output.pop_into(out))
    }
}
