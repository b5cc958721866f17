//! Fixed-size chunking of byte streams
//!
//! The chunker splits any [`Read`] source into chunks of at most
//! [`CHUNK_SIZE`] bytes and computes each chunk's SHA-256 content hash.
//! Chunk size is fixed regardless of total file size; there is no
//! adaptive or rolling chunking. The final chunk may be shorter, and a
//! zero-length source produces no chunks at all.

use crate::utils::hash_data;
use std::io::{self, Read};

/// Fixed chunk size: 1 MiB
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// One chunk of a file: its bytes, content hash and size
#[derive(Debug, Clone)]
pub struct ChunkData {
    /// Raw plaintext chunk bytes
    pub data: Vec<u8>,
    /// SHA-256 of `data`, hex-encoded
    pub hash: String,
    /// Length of `data` in bytes
    pub size: u64,
}

/// Lazy iterator over the chunks of a byte source
///
/// Each call to [`Chunker::new`] starts a fresh pass over its reader;
/// chunking the same file again simply builds a new `Chunker`.
///
/// # Example
///
/// ```rust
/// use chunkvault::chunker::Chunker;
///
/// let source: &[u8] = b"hello";
/// let chunks: Vec<_> = Chunker::new(source).collect::<Result<_, _>>().unwrap();
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].size, 5);
/// ```
#[derive(Debug)]
pub struct Chunker<R> {
    reader: R,
    done: bool,
}

impl<R: Read> Chunker<R> {
    /// Create a chunker reading from `reader`
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }

    /// Read up to [`CHUNK_SIZE`] bytes, looping over short reads
    fn fill_chunk(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        let mut filled = 0;

        while filled < CHUNK_SIZE {
            let n = self.reader.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        Ok(filled)
    }
}

impl<R: Read> Iterator for Chunker<R> {
    type Item = io::Result<ChunkData>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = vec![0u8; CHUNK_SIZE];
        let filled = match self.fill_chunk(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        if filled == 0 {
            self.done = true;
            return None;
        }

        if filled < CHUNK_SIZE {
            // Short read means end of stream; do not poll again.
            self.done = true;
            buf.truncate(filled);
        }

        let hash = hash_data(&buf);
        Some(Ok(ChunkData {
            size: filled as u64,
            hash,
            data: buf,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::hash_data;

    fn chunk_all(data: &[u8]) -> Vec<ChunkData> {
        Chunker::new(data).collect::<Result<_, _>>().unwrap()
    }

    #[test]
    fn test_empty_source_yields_no_chunks() {
        assert!(chunk_all(b"").is_empty());
    }

    #[test]
    fn test_small_file_is_one_chunk() {
        let chunks = chunk_all(b"hello world");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].size, 11);
        assert_eq!(chunks[0].hash, hash_data(b"hello world"));
    }

    #[test]
    fn test_exact_multiple_of_chunk_size() {
        let data = vec![0x42u8; CHUNK_SIZE * 2];
        let chunks = chunk_all(&data);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.size == CHUNK_SIZE as u64));
        // Identical content chunks share one hash.
        assert_eq!(chunks[0].hash, chunks[1].hash);
    }

    #[test]
    fn test_trailing_partial_chunk() {
        // 2.5 MiB -> 1 MiB + 1 MiB + 0.5 MiB
        let data = vec![0x07u8; CHUNK_SIZE * 2 + CHUNK_SIZE / 2];
        let chunks = chunk_all(&data);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].size, CHUNK_SIZE as u64);
        assert_eq!(chunks[1].size, CHUNK_SIZE as u64);
        assert_eq!(chunks[2].size, CHUNK_SIZE as u64 / 2);
        assert_eq!(
            chunks.iter().map(|c| c.size).sum::<u64>(),
            data.len() as u64
        );
    }

    #[test]
    fn test_hashes_cover_exact_chunk_bytes() {
        let mut data = vec![1u8; CHUNK_SIZE];
        data.extend_from_slice(&[2u8; 10]);

        let chunks = chunk_all(&data);
        assert_eq!(chunks[0].hash, hash_data(&vec![1u8; CHUNK_SIZE]));
        assert_eq!(chunks[1].hash, hash_data(&[2u8; 10]));
    }
}
