use md5::{Digest, Md5};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::{FerryError, FerryResult};
use crate::file_transfer::types::MAX_CHUNK;

/// Read buffer used when hashing a whole file before a transfer
pub const CHECKSUM_READ_SIZE: usize = MAX_CHUNK * MAX_CHUNK;

/// Incremental MD5 accumulator fed one chunk at a time
#[derive(Clone, Default)]
pub struct Md5Digest {
    inner: Md5,
}

impl Md5Digest {
    pub fn new() -> Self {
        Self { inner: Md5::new() }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Consume the accumulator and render the digest as lowercase hex
    pub fn finish(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

/// Compute the MD5 checksum of a whole file, reading `read_size` bytes at a time
pub async fn compute_file_checksum<P: AsRef<Path>>(path: P, read_size: usize) -> FerryResult<String> {
    let path = path.as_ref();
    let name = display_name(path);
    let mut file = File::open(path)
        .await
        .map_err(|_| FerryError::FileNotFoundOrUnreadable(name.clone()))?;

    let mut digest = Md5Digest::new();
    let mut buffer = vec![0u8; read_size.max(1)];
    loop {
        let count = file
            .read(&mut buffer)
            .await
            .map_err(|e| FerryError::file_io(&name, e))?;
        if count == 0 {
            break;
        }
        digest.update(&buffer[..count]);
    }

    Ok(digest.finish())
}

/// Compare two rendered digests.
///
/// Some peers render the digest through a big-integer conversion that drops
/// leading zero nibbles, so zeros on the left are not significant here.
pub fn checksums_match(expected: &str, actual: &str) -> bool {
    let expected = expected.trim().trim_start_matches('0');
    let actual = actual.trim().trim_start_matches('0');
    expected.eq_ignore_ascii_case(actual)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
