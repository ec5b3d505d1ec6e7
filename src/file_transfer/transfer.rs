//! Chunked streaming of a single file over an established connection.
//!
//! The sender cuts the file into chunks of [`MAX_CHUNK`] bytes and ends the
//! stream with a short chunk. When the file length is a multiple of
//! `MAX_CHUNK` (zero included) that short chunk is empty. The receiver checks
//! the result against the length and checksum declared before the stream
//! started, and removes the destination if either check fails.

use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use super::codec::WireCodec;
use super::types::MAX_CHUNK;
use crate::crypto::{Md5Digest, checksums_match};
use crate::error::{FerryError, FerryResult};

/// Counters for one finished transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes: u64,
    pub chunks: u64,
    pub checksum: String,
}

/// What the receiving side was told to expect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedFile {
    pub name: String,
    pub size: u64,
    pub checksum: String,
}

/// Stream `source` to the peer as a sequence of chunks
pub async fn send_file<R, W>(conn: &mut W, source: &mut R, file_name: &str) -> FerryResult<TransferStats>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let codec = WireCodec::new();
    let mut digest = Md5Digest::new();
    let mut buffer = vec![0u8; MAX_CHUNK];
    let mut bytes = 0u64;
    let mut chunks = 0u64;

    loop {
        let count = fill_buffer(source, &mut buffer)
            .await
            .map_err(|e| FerryError::file_io(file_name, e))?;
        let data = &buffer[..count];

        codec.write_chunk(conn, data).await?;
        digest.update(data);
        bytes += count as u64;
        chunks += 1;

        if count < MAX_CHUNK {
            break;
        }
    }

    debug!(file = file_name, bytes, chunks, "chunk stream sent");
    Ok(TransferStats {
        bytes,
        chunks,
        checksum: digest.finish(),
    })
}

/// Receive a chunk stream into `dest` and verify it.
///
/// `dest_path` is where `dest` was opened; it is deleted on every failure so
/// an unverified file is never left behind.
pub async fn receive_file<C>(
    conn: &mut C,
    expected: &ExpectedFile,
    dest: File,
    dest_path: &Path,
) -> FerryResult<TransferStats>
where
    C: AsyncRead + Unpin + Send,
{
    let result = receive_into(conn, expected, dest).await;
    if let Err(e) = &result {
        warn!(file = %expected.name, error = %e, "discarding received file");
        if let Err(remove_err) = fs::remove_file(dest_path).await {
            warn!(path = %dest_path.display(), error = %remove_err, "could not remove discarded file");
        }
    }
    result
}

async fn receive_into<C>(conn: &mut C, expected: &ExpectedFile, mut dest: File) -> FerryResult<TransferStats>
where
    C: AsyncRead + Unpin + Send,
{
    let codec = WireCodec::new();
    let mut digest = Md5Digest::new();
    let mut written = 0u64;
    let mut chunks = 0u64;

    let last_len = loop {
        let chunk = codec.read_chunk(conn).await?;
        chunks += 1;
        if chunk.is_empty() {
            break 0;
        }

        digest.update(&chunk.data);
        dest.write_all(&chunk.data)
            .await
            .map_err(|e| FerryError::file_io(&expected.name, e))?;
        written += chunk.len() as u64;

        // Only the last chunk of a stream may be shorter than MAX_CHUNK
        if chunk.len() < MAX_CHUNK || written >= expected.size {
            break chunk.len();
        }
    };

    // A full last chunk is always followed by an empty terminator; consume it
    // so the stream is left clean. Anything it carries is surplus.
    if last_len == MAX_CHUNK {
        let terminator = codec.read_chunk(conn).await?;
        chunks += 1;
        written += terminator.len() as u64;
    }

    dest.flush()
        .await
        .map_err(|e| FerryError::file_io(&expected.name, e))?;
    drop(dest);

    if written != expected.size {
        return Err(FerryError::SizeMismatch {
            file: expected.name.clone(),
            expected: expected.size,
            actual: written,
        });
    }

    let checksum = digest.finish();
    if !checksums_match(&expected.checksum, &checksum) {
        return Err(FerryError::ChecksumMismatch {
            file: expected.name.clone(),
            expected: expected.checksum.clone(),
            actual: checksum,
        });
    }

    debug!(file = %expected.name, bytes = written, chunks, "chunk stream received and verified");
    Ok(TransferStats {
        bytes: written,
        chunks,
        checksum,
    })
}

/// Read until `buffer` is full or the source is exhausted
async fn fill_buffer<R>(source: &mut R, buffer: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buffer.len() {
        let n = source.read(&mut buffer[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_transfer::types::WireMessage;

    async fn chunk_lengths(stream: &[u8]) -> Vec<usize> {
        let codec = WireCodec::new();
        let mut reader = stream;
        let mut lengths = Vec::new();
        while !reader.is_empty() {
            match codec.read_message(&mut reader).await.unwrap() {
                WireMessage::Chunk(chunk) => lengths.push(chunk.len()),
                other => panic!("unexpected {:?}", other),
            }
        }
        lengths
    }

    #[tokio::test]
    async fn test_short_reads_still_fill_chunks() {
        // A reader that hands out at most 100 bytes per call
        let data = vec![7u8; 2500];
        let (mut tx, mut rx) = tokio::io::duplex(100);
        let writer = tokio::spawn(async move {
            tx.write_all(&data).await.unwrap();
        });

        let mut out = Vec::new();
        let stats = send_file(&mut out, &mut rx, "slow.bin").await.unwrap();
        writer.await.unwrap();

        assert_eq!(stats.bytes, 2500);
        assert_eq!(chunk_lengths(&out).await, vec![1024, 1024, 452]);
    }

    #[tokio::test]
    async fn test_short_first_chunk_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.bin");
        let dest = File::create(&path).await.unwrap();

        let codec = WireCodec::new();
        let mut wire = Vec::new();
        codec.write_chunk(&mut wire, &[1u8; 500]).await.unwrap();
        let mut reader: &[u8] = &wire;

        let expected = ExpectedFile {
            name: "t.bin".to_string(),
            size: 1000,
            checksum: Md5Digest::new().finish(),
        };
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            receive_file(&mut reader, &expected, dest, &path),
        )
        .await
        .expect("a short chunk must end the stream");

        assert!(matches!(
            result,
            Err(FerryError::SizeMismatch { expected: 1000, actual: 500, .. })
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_source_sends_single_empty_chunk() {
        let mut out = Vec::new();
        let mut source: &[u8] = &[];
        let stats = send_file(&mut out, &mut source, "empty").await.unwrap();
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.checksum, "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(chunk_lengths(&out).await, vec![0]);
    }
}
