pub mod client;
pub mod config;
pub mod locks;
pub mod server;
pub mod session;

// Re-exports for easier access from crate::network::{...}
pub use client::{DeleteReport, FileClient, RemoteListing, TransferReport};
pub use config::{AppConfig, ClientConfig, DEFAULT_PORT, ServerConfig};
pub use locks::NameLocks;
pub use server::FileServer;
pub use session::{Session, SessionState};
