//! Chunked streaming encryption and decryption.
//!
//! Both sides are pull-based state machines: callers read output bytes, the
//! machine pulls input as needed, one chunk at a time. A chunk shorter than
//! the stream's declared chunk size terminates the stream; when the input
//! length is an exact multiple of the chunk capacity, an empty sentinel
//! chunk is appended so truncation stays detectable.

mod decryption;
mod encryption;
mod header;
mod transparent;

pub use decryption::DecryptionStream;
pub use encryption::EncryptionStream;
pub use header::{Header, TransparentSessionHeader, DEFAULT_ENCRYPTED_CHUNK_SIZE};
pub use transparent::{DecryptionStreamV11, EncryptionStreamV11};

use async_trait::async_trait;

use crate::error::EncryptorError;

/// Pull-based byte source. Returning 0 means end of input. Encryption and
/// decryption streams implement it too, so they chain onto one another.
#[async_trait]
pub trait InputSource: Send {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, EncryptorError>;
}

/// Input source over an in-memory buffer.
pub struct BufferSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BufferSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

#[async_trait]
impl InputSource for BufferSource<'_> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, EncryptorError> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Read `source` until `buf` is full or the source is exhausted. Returns
/// the number of bytes read.
pub(crate) async fn read_exact_or_eof<S: InputSource + ?Sized>(
    source: &mut S,
    buf: &mut [u8],
) -> Result<usize, EncryptorError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Drain any source (or stream) into one buffer.
pub async fn read_all<S: InputSource + ?Sized>(source: &mut S) -> Result<Vec<u8>, EncryptorError> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// Ring of produced-but-unread output bytes shared by the stream machines.
#[derive(Default)]
pub(crate) struct OutputBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl OutputBuffer {
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if self.is_empty() {
            self.data.clear();
            self.pos = 0;
        }
        self.data.extend_from_slice(bytes);
    }

    pub fn pop_into(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.data.len() - self.pos);
        out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffer_source_reads_in_pieces() {
        let data = [1u8, 2, 3, 4, 5];
        let mut source = BufferSource::new(&data);
        let mut buf = [0u8; 3];
        assert_eq!(source.read(&mut buf).await.unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(source.read(&mut buf).await.unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert_eq!(source.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn read_all_drains_everything() {
        let data = vec![0xabu8; 200_000];
        let mut source = BufferSource::new(&data);
        assert_eq!(read_all(&mut source).await.unwrap(), data);
    }

    #[test]
    fn output_buffer_drains_in_order() {
        let mut buffer = OutputBuffer::default();
        buffer.push(&[1, 2, 3]);
        buffer.push(&[4]);
        let mut out = [0u8; 2];
        assert_eq!(buffer.pop_into(&mut out), 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(buffer.pop_into(&mut out), 2);
        assert_eq!(out, [3, 4]);
        assert!(buffer.is_empty());
    }
}
