pub mod codec;
pub mod transfer;
pub mod types;

// Re-exports for easier access from crate::file_transfer::{...}
pub use codec::{MAX_FRAME_LEN, WireCodec};
pub use transfer::{ExpectedFile, TransferStats, receive_file, send_file};
pub use types::{Chunk, Command, CommandKind, MAX_CHUNK, Outcome, OutcomeKind, OutcomeStatus, WireMessage};
