use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};

use super::FileStore;
use crate::crypto::{CHECKSUM_READ_SIZE, compute_file_checksum};
use crate::error::{FerryError, FerryResult};
use crate::utils::is_valid_file_name;

/// A working directory on the local filesystem
#[derive(Debug, Clone)]
pub struct LocalDir {
    root: PathBuf,
}

impl LocalDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl FileStore for LocalDir {
    fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> FerryResult<PathBuf> {
        if !is_valid_file_name(name) {
            return Err(FerryError::InvalidFileName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    async fn check_access(&self) -> FerryResult<()> {
        let metadata = match fs::metadata(&self.root).await {
            Ok(m) if m.is_dir() => m,
            _ => {
                return Err(FerryError::LocalDirectory(format!(
                    "Local dir '{}' not found.",
                    self.root.display()
                )));
            }
        };

        let unreadable = fs::read_dir(&self.root).await.is_err();
        if unreadable || metadata.permissions().readonly() {
            return Err(FerryError::LocalDirectory(format!(
                "Local dir '{}' not accessible to read/write.",
                self.root.display()
            )));
        }
        Ok(())
    }

    async fn list_files(&self) -> FerryResult<BTreeMap<String, u64>> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| FerryError::LocalDirectory(format!("cannot list '{}': {}", self.root.display(), e)))?;

        let mut files = BTreeMap::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FerryError::LocalDirectory(format!("cannot list '{}': {}", self.root.display(), e)))?
        {
            // Follow symlinks so a link to a regular file is listed like one
            let Ok(metadata) = fs::metadata(entry.path()).await else {
                continue;
            };
            if metadata.is_file() {
                files.insert(entry.file_name().to_string_lossy().to_string(), metadata.len());
            }
        }
        Ok(files)
    }

    async fn exists(&self, name: &str) -> FerryResult<bool> {
        let path = self.resolve(name)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| FerryError::file_io(name, e))
    }

    async fn open_for_read(&self, name: &str) -> FerryResult<(File, u64)> {
        let path = self.resolve(name)?;
        let not_found = || FerryError::FileNotFoundOrUnreadable(name.to_string());

        let file = File::open(&path).await.map_err(|_| not_found())?;
        let metadata = file.metadata().await.map_err(|_| not_found())?;
        if !metadata.is_file() {
            return Err(not_found());
        }
        Ok((file, metadata.len()))
    }

    async fn create_new(&self, name: &str) -> FerryResult<(File, PathBuf)> {
        let path = self.resolve(name)?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => FerryError::FileAlreadyExists(name.to_string()),
                _ => FerryError::file_io(name, e),
            })?;
        Ok((file, path))
    }

    async fn remove(&self, name: &str) -> FerryResult<()> {
        let path = self.resolve(name)?;
        let metadata = match fs::metadata(&path).await {
            Ok(m) if m.is_file() => m,
            _ => return Err(FerryError::FileNotFoundOrUnreadable(name.to_string())),
        };
        if metadata.permissions().readonly() {
            return Err(FerryError::NotWritable(name.to_string()));
        }
        fs::remove_file(&path)
            .await
            .map_err(|e| FerryError::file_io(name, e))
    }

    async fn checksum(&self, name: &str) -> FerryResult<String> {
        let path = self.resolve(name)?;
        compute_file_checksum(&path, CHECKSUM_READ_SIZE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").await.unwrap();
        fs::create_dir(dir.path().join("sub")).await.unwrap();

        let store = LocalDir::new(dir.path());
        let files = store.list_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files.get("a.txt"), Some(&5));
    }

    #[tokio::test]
    async fn test_create_new_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("taken"), b"x").await.unwrap();

        let store = LocalDir::new(dir.path());
        let err = store.create_new("taken").await.unwrap_err();
        assert!(matches!(err, FerryError::FileAlreadyExists(name) if name == "taken"));
    }

    #[tokio::test]
    async fn test_missing_root_is_directory_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalDir::new(dir.path().join("gone"));
        assert!(matches!(store.check_access().await, Err(FerryError::LocalDirectory(_))));
    }

    #[tokio::test]
    async fn test_remove_read_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.txt");
        fs::write(&path, b"keep me").await.unwrap();
        let mut perms = fs::metadata(&path).await.unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).await.unwrap();

        let store = LocalDir::new(dir.path());
        let err = store.remove("locked.txt").await.unwrap_err();
        assert!(matches!(err, FerryError::NotWritable(_)));
        assert!(path.exists());
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let store = LocalDir::new("/srv/files");
        assert!(store.resolve("../secret").is_err());
        assert_eq!(store.resolve("a.txt").unwrap(), PathBuf::from("/srv/files/a.txt"));
    }
}
