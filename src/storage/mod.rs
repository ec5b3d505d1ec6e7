pub mod local_dir;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::File;

use crate::error::FerryResult;

pub use local_dir::LocalDir;

/// Filesystem capability each side is confined to: one flat directory
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Directory the store operates in
    fn root(&self) -> &Path;

    /// Map a file name to its path, rejecting names that would leave the root
    fn resolve(&self, name: &str) -> FerryResult<PathBuf>;

    /// Fail unless the root exists and can be read and written
    async fn check_access(&self) -> FerryResult<()>;

    /// Regular files (no directories) with their sizes
    async fn list_files(&self) -> FerryResult<BTreeMap<String, u64>>;

    async fn exists(&self, name: &str) -> FerryResult<bool>;

    /// Open an existing regular file, returning it with its length
    async fn open_for_read(&self, name: &str) -> FerryResult<(File, u64)>;

    /// Create a file that must not exist yet
    async fn create_new(&self, name: &str) -> FerryResult<(File, PathBuf)>;

    async fn remove(&self, name: &str) -> FerryResult<()>;

    /// Whole-file checksum of a stored file
    async fn checksum(&self, name: &str) -> FerryResult<String>;
}
