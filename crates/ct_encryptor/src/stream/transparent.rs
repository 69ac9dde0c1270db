//! Streaming transparent-session format (v11).
//!
//! One 37-byte header, then fixed-size chunks. Each chunk is one AEAD
//! message over `paddingSize(u32 LE) || data || zero padding`, bound to the
//! header through the associated data and to its position through the
//! derived IV. Padding is appended at the tail of the stream; every chunk
//! records how many of its bytes are padding.

use async_trait::async_trait;
use ct_crypto::{
    aead_decrypt, aead_encrypt, derive_iv, padded_from_clear_size, AeadIv, CompositeResourceId,
    Padding, ResourceId, SimpleResourceId, SubkeySeed, SymmetricKey,
};

use crate::error::EncryptorError;
use crate::key_finder::ResourceKeyFinder;
use crate::transparent::{derive_subkey, transparent_session_iv};

use super::header::TransparentSessionHeader;
use super::{read_exact_or_eof, InputSource, OutputBuffer};

pub struct EncryptionStreamV11<S: InputSource> {
    source: S,
    header: TransparentSessionHeader,
    header_bytes: Vec<u8>,
    session_key: SymmetricKey,
    subkey: SymmetricKey,
    iv_base: AeadIv,
    padding: Padding,
    chunk_index: u64,
    total_clear: u64,
    /// Set once the source hits EOF: tail padding still owed to the stream.
    padding_left: Option<u64>,
    output: OutputBuffer,
    finished: bool,
}

impl<S: InputSource> EncryptionStreamV11<S> {
    pub fn new(
        source: S,
        session_id: SimpleResourceId,
        session_key: SymmetricKey,
        subkey_seed: SubkeySeed,
        padding: Padding,
        encrypted_chunk_size: u32,
    ) -> Self {
        let header = TransparentSessionHeader {
            version: 11,
            session_id,
            subkey_seed,
            encrypted_chunk_size,
        };
        let header_bytes = header.to_bytes();
        let mut output = OutputBuffer::default();
        output.push(&header_bytes);
        Self {
            source,
            header,
            header_bytes,
            session_key,
            subkey: derive_subkey(&session_key, &subkey_seed),
            iv_base: transparent_session_iv(&session_id),
            padding,
            chunk_index: 0,
            total_clear: 0,
            padding_left: None,
            output,
            finished: false,
        }
    }

    pub fn resource_id(&self) -> CompositeResourceId {
        CompositeResourceId::transparent_session(&self.header.session_id, &self.header.subkey_seed)
    }

    pub fn session_id(&self) -> SimpleResourceId {
        self.header.session_id
    }

    pub fn symmetric_key(&self) -> SymmetricKey {
        self.session_key
    }

    fn clear_chunk_size(&self) -> usize {
        self.header.encrypted_chunk_size as usize - TransparentSessionHeader::CHUNK_OVERHEAD
    }

    async fn produce_chunk(&mut self) -> Result<(), EncryptorError> {
        let capacity = self.clear_chunk_size();

        let mut data = Vec::new();
        if self.padding_left.is_none() {
            data.resize(capacity, 0);
            let n = read_exact_or_eof(&mut self.source, &mut data).await?;
            data.truncate(n);
            self.total_clear += n as u64;
            if n < capacity {
                // Padded stream length has no boundary byte; the per-chunk
                // padding fields carry the difference instead.
                let padded = padded_from_clear_size(self.total_clear, self.padding) - 1;
                self.padding_left = Some(padded - self.total_clear);
            }
        }

        let padding_in_chunk = match &mut self.padding_left {
            None => 0,
            Some(left) => {
                let take = (*left).min((capacity - data.len()) as u64);
                *left -= take;
                take as usize
            }
        };

        let mut clear = Vec::with_capacity(4 + data.len() + padding_in_chunk);
        clear.extend_from_slice(&(padding_in_chunk as u32).to_le_bytes());
        clear.extend_from_slice(&data);
        clear.resize(4 + data.len() + padding_in_chunk, 0);

        let iv = derive_iv(&self.iv_base, self.chunk_index);
        let encrypted = aead_encrypt(&self.subkey, &iv, &clear, &self.header_bytes)?;
        self.output.push(&encrypted);
        self.chunk_index += 1;

        if data.len() + padding_in_chunk < capacity {
            self.finished = true;
        }
        Ok(())
    }
}

#[async_trait]
impl<S: InputSource> InputSource for EncryptionStreamV11<S> {
    async fn read(&mut self, out: &mut [u8]) -> Result<usize, EncryptorError> {
        if self.output.is_empty() && !self.finished {
            self.produce_chunk().await?;
        }
        Ok(self.output.pop_into(out))
    }
}

pub struct DecryptionStreamV11<S: InputSource> {
    source: S,
    header: TransparentSessionHeader,
    header_bytes: Vec<u8>,
    subkey: SymmetricKey,
    iv_base: AeadIv,
    chunk_index: u64,
    output: OutputBuffer,
    finished: bool,
}

impl<S: InputSource> DecryptionStreamV11<S> {
    pub async fn create(
        mut source: S,
        key_finder: &dyn ResourceKeyFinder,
    ) -> Result<Self, EncryptorError> {
        let mut header_bytes = [0u8; TransparentSessionHeader::SERIALIZED_SIZE];
        let n = read_exact_or_eof(&mut source, &mut header_bytes).await?;
        if n < header_bytes.len() {
            return Err(EncryptorError::InvalidArgument("truncated encrypted buffer"));
        }
        let header = TransparentSessionHeader::from_bytes(&header_bytes)?;
        if header.version != 11 {
            return Err(EncryptorError::UnsupportedVersion(header.version));
        }

        // Session key first (derive the subkey), else a directly published
        // per-resource subkey.
        let subkey = match key_finder
            .find_resource_key(ResourceId::Simple(header.session_id))
            .await
            .map_err(EncryptorError::KeyLookup)?
        {
            Some(session_key) => derive_subkey(&session_key, &header.subkey_seed),
            None => key_finder
                .find_resource_key(ResourceId::Simple(SimpleResourceId::new(
                    *header.subkey_seed.as_bytes(),
                )))
                .await
                .map_err(EncryptorError::KeyLookup)?
                .ok_or(EncryptorError::DecryptionFailed("resource key not found"))?,
        };

        let mut stream = Self {
            source,
            header,
            header_bytes: header_bytes.to_vec(),
            subkey,
            iv_base: transparent_session_iv(&header.session_id),
            chunk_index: 0,
            output: OutputBuffer::default(),
            finished: false,
        };
        stream.decrypt_next_chunk().await?;
        Ok(stream)
    }

    pub fn resource_id(&self) -> CompositeResourceId {
        CompositeResourceId::transparent_session(&self.header.session_id, &self.header.subkey_seed)
    }

    async fn decrypt_next_chunk(&mut self) -> Result<(), EncryptorError> {
        let chunk_size = self.header.encrypted_chunk_size as usize;
        let mut chunk = vec![0u8; chunk_size];
        let n = read_exact_or_eof(&mut self.source, &mut chunk).await?;
        if n < TransparentSessionHeader::CHUNK_OVERHEAD {
            return Err(EncryptorError::DecryptionFailed("stream ends mid-chunk"));
        }
        chunk.truncate(n);

        let iv = derive_iv(&self.iv_base, self.chunk_index);
        let clear = aead_decrypt(&self.subkey, &iv, &chunk, &self.header_bytes)
            .map_err(|_| EncryptorError::DecryptionFailed("chunk MAC verification failed"))?;
        self.chunk_index += 1;

        let padding = u32::from_le_bytes(clear[..4].try_into().expect("fixed 4-byte range")) as usize;
        let data = clear
            .len()
            .checked_sub(4 + padding)
            .ok_or(EncryptorError::DecryptionFailed(
                "chunk padding exceeds chunk size",
            ))?;
        self.output.push(&clear[4..4 + data]);

        if n < chunk_size {
            self.finished = true;
        }
        Ok(())
    }
}

#[async_trait]
impl<S: InputSource> InputSource for DecryptionStreamV11<S> {
    async fn read(&mut self, out: &mut [u8]) -> Result<usize, EncryptorError> {
        if self.output.is_empty() && !self.finished {
            self.decrypt_next_chunk().await?;
        }
        Ok(self.output.pop_into(out))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{read_all, BufferSource};
    use super::*;
    use crate::key_finder::FixedKeyFinder;

    const CHUNK_SIZE: u32 = 100;

    async fn encrypt(data: &[u8], padding: Padding) -> (Vec<u8>, SymmetricKey) {
        let key = ct_crypto::make_symmetric_key();
        let mut stream = EncryptionStreamV11::new(
            BufferSource::new(data),
            SimpleResourceId::random(),
            key,
            SubkeySeed::random(),
            padding,
            CHUNK_SIZE,
        );
        (read_all(&mut stream).await.unwrap(), key)
    }

    async fn decrypt(encrypted: &[u8], key: SymmetricKey) -> Result<Vec<u8>, EncryptorError> {
        let mut stream =
            DecryptionStreamV11::create(BufferSource::new(encrypted), &FixedKeyFinder(key))
                .await?;
        read_all(&mut stream).await
    }

    #[tokio::test]
    async fn roundtrip_without_padding() {
        let data: Vec<u8> = (0..500u32).map(|i| i as u8).collect();
        let (encrypted, key) = encrypt(&data, Padding::Off).await;
        assert_eq!(decrypt(&encrypted, key).await.unwrap(), data);
    }

    #[tokio::test]
    async fn roundtrip_with_auto_padding_strips_padding() {
        let data = vec![0x61u8; 130];
        let (encrypted, key) = encrypt(&data, Padding::Auto).await;
        assert_eq!(decrypt(&encrypted, key).await.unwrap(), data);
    }

    #[tokio::test]
    async fn roundtrip_empty_input() {
        let (encrypted, key) = encrypt(&[], Padding::Off).await;
        assert_eq!(decrypt(&encrypted, key).await.unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn padding_hides_the_exact_length() {
        // Both inputs pad to the same power of two, so ciphertext lengths
        // must be identical.
        let (a, _) = encrypt(&vec![1u8; 120], Padding::Auto).await;
        let (b, _) = encrypt(&vec![1u8; 100], Padding::Auto).await;
        assert_eq!(a.len(), b.len());
    }

    #[tokio::test]
    async fn flipped_byte_fails() {
        let data = vec![4u8; 300];
        let (mut encrypted, key) = encrypt(&data, Padding::Off).await;
        let mid = encrypted.len() / 2;
        encrypted[mid] ^= 1;
        assert!(decrypt(&encrypted, key).await.unwrap_err().is_decryption_failed());
    }

    #[tokio::test]
    async fn truncated_stream_fails() {
        let capacity = CHUNK_SIZE as usize - TransparentSessionHeader::CHUNK_OVERHEAD;
        let data = vec![4u8; capacity]; // exactly one full chunk + sentinel
        let (encrypted, key) = encrypt(&data, Padding::Off).await;
        let without_sentinel =
            &encrypted[..TransparentSessionHeader::SERIALIZED_SIZE + CHUNK_SIZE as usize];
        assert!(decrypt(without_sentinel, key)
            .await
            .unwrap_err()
            .is_decryption_failed());
    }

    #[tokio::test]
    async fn swapped_chunks_fail() {
        let capacity = CHUNK_SIZE as usize - TransparentSessionHeader::CHUNK_OVERHEAD;
        let data = vec![4u8; capacity * 2];
        let (mut encrypted, key) = encrypt(&data, Padding::Off).await;
        let header = TransparentSessionHeader::SERIALIZED_SIZE;
        let size = CHUNK_SIZE as usize;
        let (first, rest) = encrypted[header..].split_at_mut(size);
        first.swap_with_slice(&mut rest[..size]);
        assert!(decrypt(&encrypted, key).await.unwrap_err().is_decryption_failed());
    }

    #[tokio::test]
    async fn decrypts_with_a_directly_published_subkey() {
        let data = vec![9u8; 40];
        let session_id = SimpleResourceId::random();
        let seed = SubkeySeed::random();
        let session_key = ct_crypto::make_symmetric_key();
        let mut stream = EncryptionStreamV11::new(
            BufferSource::new(&data),
            session_id,
            session_key,
            seed,
            Padding::Off,
            CHUNK_SIZE,
        );
        let encrypted = read_all(&mut stream).await.unwrap();

        // A finder that only knows the derived subkey under the seed id.
        struct SubkeyOnly(SimpleResourceId, SymmetricKey);
        #[async_trait]
        impl ResourceKeyFinder for SubkeyOnly {
            async fn find_resource_key(
                &self,
                id: ResourceId,
            ) -> anyhow::Result<Option<SymmetricKey>> {
                Ok((id == ResourceId::Simple(self.0)).then_some(self.1))
            }
        }
        let finder = SubkeyOnly(
            SimpleResourceId::new(*seed.as_bytes()),
            derive_subkey(&session_key, &seed),
        );
        let mut stream = DecryptionStreamV11::create(BufferSource::new(&encrypted), &finder)
            .await
            .unwrap();
        assert_eq!(read_all(&mut stream).await.unwrap(), data);
    }
}
