use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum payload carried by a single chunk
pub const MAX_CHUNK: usize = 1024;

/// Operations a client can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum CommandKind {
    ListRemote,
    DeleteRemote,
    Upload,
    Download,
}

/// The single request a client sends to open a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Command {
    pub kind: CommandKind,
    /// File the command acts on, absent for listings
    pub target: Option<String>,
    /// Declared size of the file about to be uploaded
    pub file_size: u64,
    /// Declared checksum of the file about to be uploaded
    pub checksum: Option<String>,
}

impl Command {
    pub fn list() -> Self {
        Self {
            kind: CommandKind::ListRemote,
            target: None,
            file_size: 0,
            checksum: None,
        }
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::DeleteRemote,
            target: Some(target.into()),
            file_size: 0,
            checksum: None,
        }
    }

    pub fn download(target: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Download,
            target: Some(target.into()),
            file_size: 0,
            checksum: None,
        }
    }

    pub fn upload(target: impl Into<String>, file_size: u64, checksum: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Upload,
            target: Some(target.into()),
            file_size,
            checksum: Some(checksum.into()),
        }
    }

    pub fn target_name(&self) -> &str {
        self.target.as_deref().unwrap_or_default()
    }
}

/// What an outcome answers; `Error` when the server failed before dispatching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum OutcomeKind {
    ListRemote,
    DeleteRemote,
    Upload,
    Download,
    Error,
}

impl From<CommandKind> for OutcomeKind {
    fn from(kind: CommandKind) -> Self {
        match kind {
            CommandKind::ListRemote => OutcomeKind::ListRemote,
            CommandKind::DeleteRemote => OutcomeKind::DeleteRemote,
            CommandKind::Upload => OutcomeKind::Upload,
            CommandKind::Download => OutcomeKind::Download,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum OutcomeStatus {
    Ok,
    Error,
}

/// The server's single answer to a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub status: OutcomeStatus,
    pub message: Option<String>,
    /// File name to human readable size, filled for listings
    pub files: BTreeMap<String, String>,
    /// Size of the file about to stream, filled for downloads
    pub file_size: u64,
    /// Checksum of the file about to stream, filled for downloads
    pub checksum: Option<String>,
}

impl Outcome {
    pub fn ok(kind: impl Into<OutcomeKind>) -> Self {
        Self {
            kind: kind.into(),
            status: OutcomeStatus::Ok,
            message: None,
            files: BTreeMap::new(),
            file_size: 0,
            checksum: None,
        }
    }

    pub fn error(kind: impl Into<OutcomeKind>, message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Error,
            message: Some(message.into()),
            ..Self::ok(kind)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_files(mut self, files: BTreeMap<String, String>) -> Self {
        self.files = files;
        self
    }

    pub fn with_file(mut self, file_size: u64, checksum: impl Into<String>) -> Self {
        self.file_size = file_size;
        self.checksum = Some(checksum.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == OutcomeStatus::Ok
    }
}

/// A bounded piece of raw file payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Chunk {
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn new(data: Vec<u8>) -> Self {
        debug_assert!(data.len() <= MAX_CHUNK);
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Envelope for every frame on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub enum WireMessage {
    Command(Command),
    Outcome(Outcome),
    Chunk(Chunk),
}

impl WireMessage {
    pub fn name(&self) -> &'static str {
        match self {
            WireMessage::Command(_) => "command",
            WireMessage::Outcome(_) => "outcome",
            WireMessage::Chunk(_) => "chunk",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::ListRemote => "list",
            CommandKind::DeleteRemote => "delete",
            CommandKind::Upload => "upload",
            CommandKind::Download => "download",
        };
        f.write_str(name)
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::ListRemote => f.write_str("list"),
            OutcomeKind::DeleteRemote => f.write_str("delete"),
            OutcomeKind::Upload => f.write_str("upload"),
            OutcomeKind::Download => f.write_str("download"),
            OutcomeKind::Error => f.write_str("error"),
        }
    }
}
