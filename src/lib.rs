pub mod crypto;
pub mod error;
pub mod file_transfer;
pub mod network;
pub mod shell;
pub mod storage;
pub mod utils;

// Re-export key items for easier access in integration tests
pub use crypto::{checksums_match, compute_file_checksum};
pub use error::{FerryError, FerryResult};
pub use file_transfer::{Chunk, Command, MAX_CHUNK, Outcome, WireCodec, WireMessage};
pub use network::{AppConfig, ClientConfig, FileClient, FileServer, ServerConfig};
