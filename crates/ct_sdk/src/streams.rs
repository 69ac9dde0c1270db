//! Streaming entry points: version dispatch over pull-based sources.

use async_trait::async_trait;

use ct_encryptor::stream::{DecryptionStream, DecryptionStreamV11, InputSource};
use ct_encryptor::{EncryptorError, ResourceKeyFinder};

/// A source with some already-consumed bytes pushed back in front.
pub(crate) struct PrefixedSource<S> {
    prefix: Vec<u8>,
    pos: usize,
    inner: S,
}

impl<S> PrefixedSource<S> {
    pub fn new(prefix: Vec<u8>, inner: S) -> Self {
        Self {
            prefix,
            pos: 0,
            inner,
        }
    }
}

#[async_trait]
impl<S: InputSource> InputSource for PrefixedSource<S> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, EncryptorError> {
        if self.pos < self.prefix.len() {
            let n = buf.len().min(self.prefix.len() - self.pos);
            buf[..n].copy_from_slice(&self.prefix[self.pos..self.pos + n]);
            self.pos += n;
            return Ok(n);
        }
        self.inner.read(buf).await
    }
}

/// An owned in-memory source (used when a non-streamed format has to be
/// decrypted eagerly behind a stream interface).
pub(crate) struct OwnedBufferSource {
    data: Vec<u8>,
    pos: usize,
}

impl OwnedBufferSource {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

#[async_trait]
impl InputSource for OwnedBufferSource {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, EncryptorError> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Open a decryption stream over any supported ciphertext. The chunked
/// formats decrypt lazily; everything else is decrypted up front and
/// served from memory.
pub(crate) async fn open_decryption_stream<S>(
    mut source: S,
    key_finder: &dyn ResourceKeyFinder,
) -> Result<Box<dyn InputSource>, EncryptorError>
where
    S: InputSource + 'static,
{
    let mut version = [0u8; 1];
    let n = source.read(&mut version).await?;
    if n == 0 {
        return Err(EncryptorError::InvalidArgument("encrypted data is empty"));
    }
    let source = PrefixedSource::new(version.to_vec(), source);

    match version[0] {
        4 => Ok(Box::new(DecryptionStream::create(source, key_finder).await?)),
        11 => Ok(Box::new(
            DecryptionStreamV11::create(source, key_finder).await?,
        )),
        // v8's padding boundary is only known once the whole stream is
        // decrypted, so it cannot be revealed incrementally.
        _ => {
            let mut source = source;
            let encrypted = ct_encryptor::stream::read_all(&mut source).await?;
            let clear = ct_encryptor::decrypt(key_finder, &encrypted).await?;
            Ok(Box::new(OwnedBufferSource::new(clear)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_crypto::Padding;
    use ct_encryptor::stream::{read_all, BufferSource, EncryptionStreamV11};
    use ct_encryptor::FixedKeyFinder;

    #[tokio::test]
    async fn streams_a_v11_ciphertext() {
        let key = ct_crypto::make_symmetric_key();
        let data = vec![0x21u8; 5000];
        let mut encryptor = EncryptionStreamV11::new(
            BufferSource::new(&data),
            ct_crypto::SimpleResourceId::random(),
            key,
            ct_crypto::SubkeySeed::random(),
            Padding::Off,
            256,
        );
        let encrypted = read_all(&mut encryptor).await.unwrap();

        let mut stream =
            open_decryption_stream(OwnedBufferSource::new(encrypted), &FixedKeyFinder(key))
                .await
                .unwrap();
        assert_eq!(read_all(stream.as_mut()).await.unwrap(), data);
    }

    #[tokio::test]
    async fn falls_back_to_eager_decryption_for_single_shot_formats() {
        let key = ct_crypto::make_symmetric_key();
        let encrypted = ct_encryptor::v9::encrypt(
            b"small payload",
            &ct_crypto::SimpleResourceId::random(),
            &key,
            &ct_crypto::SubkeySeed::random(),
        )
        .unwrap();
        let mut stream =
            open_decryption_stream(OwnedBufferSource::new(encrypted), &FixedKeyFinder(key))
                .await
                .unwrap();
        assert_eq!(read_all(stream.as_mut()).await.unwrap(), b"small payload");
    }

    #[tokio::test]
    async fn empty_sources_are_rejected() {
        let result = open_decryption_stream(
            OwnedBufferSource::new(Vec::new()),
            &FixedKeyFinder(ct_crypto::make_symmetric_key()),
        )
        .await;
        assert!(matches!(result, Err(EncryptorError::InvalidArgument(_))));
    }
}
