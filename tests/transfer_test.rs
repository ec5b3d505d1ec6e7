use fileferry::crypto::Md5Digest;
use fileferry::error::FerryError;
use fileferry::file_transfer::{ExpectedFile, WireCodec, WireMessage, receive_file, send_file};
use std::io::Cursor;
use std::path::Path;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

fn md5_of(data: &[u8]) -> String {
    let mut digest = Md5Digest::new();
    digest.update(data);
    digest.finish()
}

// Run send_file over an in-memory buffer and return the encoded stream
async fn encode_stream(data: &[u8]) -> Vec<u8> {
    let mut wire: Vec<u8> = Vec::new();
    let mut source = Cursor::new(data.to_vec());
    let stats = send_file(&mut wire, &mut source, "data.bin").await.unwrap();
    assert_eq!(stats.bytes, data.len() as u64);
    assert_eq!(stats.checksum, md5_of(data));
    wire
}

async fn chunk_lengths(mut stream: &[u8]) -> Vec<usize> {
    let codec = WireCodec::new();
    let mut lengths = Vec::new();
    while !stream.is_empty() {
        match codec.read_message(&mut stream).await.unwrap() {
            WireMessage::Chunk(chunk) => lengths.push(chunk.len()),
            other => panic!("unexpected {:?}", other),
        }
    }
    lengths
}

async fn receive_into(dir: &Path, wire: Vec<u8>, expected: &ExpectedFile) -> Result<Vec<u8>, FerryError> {
    let path = dir.join(&expected.name);
    let file = tokio::fs::File::create(&path).await.unwrap();
    let mut reader = Cursor::new(wire);
    receive_file(&mut reader, expected, file, &path).await?;
    Ok(tokio::fs::read(&path).await.unwrap())
}

#[tokio::test]
async fn test_chunking_of_2500_bytes() {
    let wire = encode_stream(&pattern(2500)).await;
    assert_eq!(chunk_lengths(&wire).await, vec![1024, 1024, 452]);
}

#[tokio::test]
async fn test_exact_multiples_end_with_empty_chunk() {
    let wire = encode_stream(&pattern(1024)).await;
    assert_eq!(chunk_lengths(&wire).await, vec![1024, 0]);

    let wire = encode_stream(&pattern(2048)).await;
    assert_eq!(chunk_lengths(&wire).await, vec![1024, 1024, 0]);

    let wire = encode_stream(&[]).await;
    assert_eq!(chunk_lengths(&wire).await, vec![0]);
}

#[tokio::test]
async fn test_round_trip_sizes() {
    let dir = tempfile::tempdir().unwrap();
    for size in [0usize, 1, 1023, 1024, 1025, 2048, 2500, 10_000] {
        let data = pattern(size);
        let wire = encode_stream(&data).await;
        let expected = ExpectedFile {
            name: format!("file_{}", size),
            size: size as u64,
            checksum: md5_of(&data),
        };

        let received = receive_into(dir.path(), wire, &expected).await.unwrap();
        assert_eq!(received, data, "size {}", size);
    }
}

#[tokio::test]
async fn test_receiver_leaves_following_frames_unread() {
    // The terminator after a full chunk is consumed, the next frame is not
    let data = pattern(1024);
    let mut wire = encode_stream(&data).await;
    let codec = WireCodec::new();
    codec.write_chunk(&mut wire, b"next").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.bin");
    let file = tokio::fs::File::create(&path).await.unwrap();
    let mut reader = Cursor::new(wire);
    let expected = ExpectedFile {
        name: "one.bin".to_string(),
        size: 1024,
        checksum: md5_of(&data),
    };
    let stats = receive_file(&mut reader, &expected, file, &path).await.unwrap();
    assert_eq!(stats.chunks, 2);
    assert_eq!(codec.read_chunk(&mut reader).await.unwrap().data, b"next");
}

#[tokio::test]
async fn test_corrupted_stream_is_rejected_and_removed() {
    let data = pattern(2500);
    let mut wire = encode_stream(&data).await;
    // Flip a payload byte near the end of the last frame
    let last = wire.len() - 10;
    wire[last] ^= 0xff;

    let dir = tempfile::tempdir().unwrap();
    let expected = ExpectedFile {
        name: "bad.bin".to_string(),
        size: 2500,
        checksum: md5_of(&data),
    };
    let err = receive_into(dir.path(), wire, &expected).await.unwrap_err();
    assert!(matches!(err, FerryError::ChecksumMismatch { ref file, .. } if file == "bad.bin"));
    assert!(!dir.path().join("bad.bin").exists());
}

#[tokio::test]
async fn test_truncated_stream_is_rejected_and_removed() {
    let data = pattern(2000);
    let wire = encode_stream(&data).await;

    let dir = tempfile::tempdir().unwrap();
    let expected = ExpectedFile {
        name: "short.bin".to_string(),
        size: 2500,
        checksum: md5_of(&pattern(2500)),
    };
    let err = receive_into(dir.path(), wire, &expected).await.unwrap_err();
    match err {
        FerryError::SizeMismatch { expected, actual, .. } => {
            assert_eq!(expected, 2500);
            assert_eq!(actual, 2000);
        }
        other => panic!("expected SizeMismatch, got {:?}", other),
    }
    assert!(!dir.path().join("short.bin").exists());
}

#[tokio::test]
async fn test_connection_loss_removes_partial_file() {
    let data = pattern(3000);
    let wire = encode_stream(&data).await;
    // Cut the stream after the first full frame
    let first_frame = 4 + u32::from_be_bytes([wire[0], wire[1], wire[2], wire[3]]) as usize;

    let dir = tempfile::tempdir().unwrap();
    let expected = ExpectedFile {
        name: "cut.bin".to_string(),
        size: 3000,
        checksum: md5_of(&data),
    };
    let err = receive_into(dir.path(), wire[..first_frame].to_vec(), &expected)
        .await
        .unwrap_err();
    assert!(err.is_connection());
    assert!(!dir.path().join("cut.bin").exists());
}
