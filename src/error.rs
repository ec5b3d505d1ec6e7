use std::io;
use thiserror::Error;

/// Result alias used throughout the crate
pub type FerryResult<T> = Result<T, FerryError>;

/// Everything that can go wrong while serving or issuing a command
#[derive(Error, Debug)]
pub enum FerryError {
    #[error("connection error: {0}")]
    Connection(#[from] io::Error),

    #[error("unreadable message: {0}")]
    ProtocolDecode(String),

    #[error("unexpected {found} message while waiting for {expected}")]
    UnexpectedMessage {
        expected: &'static str,
        found: String,
    },

    #[error("[Fatal error]: {0}")]
    LocalDirectory(String),

    #[error("File '{0}' not found")]
    FileNotFoundOrUnreadable(String),

    #[error("File '{0}' already exists")]
    FileAlreadyExists(String),

    #[error("'{0}' is not a valid file name")]
    InvalidFileName(String),

    #[error("File '{0}' is not writable")]
    NotWritable(String),

    #[error("I/O error on file '{file}': {source}")]
    FileIo {
        file: String,
        #[source]
        source: io::Error,
    },

    #[error("Size failure for '{file}': {expected} (B on source) vs {actual} (B received)")]
    SizeMismatch {
        file: String,
        expected: u64,
        actual: u64,
    },

    #[error("Checksum failure for '{file}': {expected} (source) vs {actual} (received)")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("remote error: {0}")]
    Remote(String),

    #[error("transfer aborted by peer: {0}")]
    PeerAborted(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FerryError {
    /// Wrap an I/O error raised by a local file rather than the socket
    pub fn file_io(file: impl Into<String>, source: io::Error) -> Self {
        FerryError::FileIo {
            file: file.into(),
            source,
        }
    }

    /// True when the socket itself failed, so nothing more can be sent on it
    pub fn is_connection(&self) -> bool {
        matches!(self, FerryError::Connection(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_messages_name_file_and_values() {
        let err = FerryError::SizeMismatch {
            file: "a.bin".to_string(),
            expected: 2500,
            actual: 2000,
        };
        let text = err.to_string();
        assert!(text.contains("a.bin"));
        assert!(text.contains("2500"));
        assert!(text.contains("2000"));

        let err = FerryError::ChecksumMismatch {
            file: "a.bin".to_string(),
            expected: "abc".to_string(),
            actual: "def".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("abc") && text.contains("def"));
    }

    #[test]
    fn test_connection_classification() {
        let err: FerryError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(err.is_connection());
        assert!(!FerryError::file_io("x", io::Error::other("disk")).is_connection());
    }
}
