use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::config::ClientConfig;
use crate::error::{FerryError, FerryResult};
use crate::file_transfer::{Command, ExpectedFile, Outcome, OutcomeKind, WireCodec, receive_file, send_file};
use crate::storage::{FileStore, LocalDir};

/// Files in the server's working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteListing {
    /// File name to human readable size
    pub files: BTreeMap<String, String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteReport {
    pub message: String,
}

/// Result of a finished upload or download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub file_name: String,
    pub bytes: u64,
    pub chunks: u64,
    pub checksum: String,
    pub elapsed: Duration,
    /// What the server said about the transfer
    pub remote_message: Option<String>,
}

/// Issues commands to a file server, one connection per command
pub struct FileClient {
    config: ClientConfig,
    local: LocalDir,
    codec: WireCodec,
}

impl FileClient {
    pub fn new(config: ClientConfig) -> Self {
        let local = LocalDir::new(config.local_dir.clone());
        Self {
            config,
            local,
            codec: WireCodec::new(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn list_remote(&self) -> FerryResult<RemoteListing> {
        let mut conn = self.connect().await?;
        let outcome = self.exchange(&mut conn, &Command::list()).await?;
        close(conn).await;

        Ok(RemoteListing {
            files: outcome.files,
            message: outcome.message,
        })
    }

    pub async fn delete_remote(&self, name: &str) -> FerryResult<DeleteReport> {
        let mut conn = self.connect().await?;
        let outcome = self.exchange(&mut conn, &Command::delete(name)).await?;
        close(conn).await;

        Ok(DeleteReport {
            message: outcome
                .message
                .unwrap_or_else(|| format!("File '{}' deleted.", name)),
        })
    }

    /// Send a file from the local working directory to the server
    pub async fn upload(&self, name: &str) -> FerryResult<TransferReport> {
        self.local.check_access().await?;
        let (mut file, size) = self.local.open_for_read(name).await?;
        let checksum = self.local.checksum(name).await?;
        debug!(file = name, size, %checksum, "prepared upload");

        let mut conn = self.connect().await?;
        let accepted = self
            .exchange(&mut conn, &Command::upload(name, size, checksum.clone()))
            .await?;
        if let Some(message) = &accepted.message {
            debug!(file = name, %message, "server accepted upload");
        }

        let started = Instant::now();
        let stats = send_file(&mut conn, &mut file, name).await?;
        if stats.bytes != size {
            // The server rejects the stream as well; closing lets it finish without us
            warn!(file = name, expected = size, sent = stats.bytes, "file changed while uploading");
            close(conn).await;
            return Err(FerryError::SizeMismatch {
                file: name.to_string(),
                expected: size,
                actual: stats.bytes,
            });
        }

        let verdict = self.expect_outcome(&mut conn, OutcomeKind::Upload).await?;
        let elapsed = started.elapsed();
        close(conn).await;

        info!(file = name, bytes = stats.bytes, chunks = stats.chunks, "upload finished");
        Ok(TransferReport {
            file_name: name.to_string(),
            bytes: stats.bytes,
            chunks: stats.chunks,
            checksum: stats.checksum,
            elapsed,
            remote_message: verdict.message,
        })
    }

    /// Fetch a file from the server into the local working directory
    pub async fn download(&self, name: &str) -> FerryResult<TransferReport> {
        self.local.check_access().await?;
        self.local.resolve(name)?;
        if self.local.exists(name).await? {
            return Err(FerryError::FileAlreadyExists(name.to_string()));
        }

        let mut conn = self.connect().await?;
        let offer = self.exchange(&mut conn, &Command::download(name)).await?;
        let expected = ExpectedFile {
            name: name.to_string(),
            size: offer.file_size,
            checksum: offer.checksum.clone().unwrap_or_default(),
        };

        let (file, path) = self.local.create_new(name).await?;
        let started = Instant::now();
        let stats = receive_file(&mut conn, &expected, file, &path).await?;
        let elapsed = started.elapsed();
        close(conn).await;

        info!(file = name, bytes = stats.bytes, chunks = stats.chunks, "download finished");
        Ok(TransferReport {
            file_name: name.to_string(),
            bytes: stats.bytes,
            chunks: stats.chunks,
            checksum: stats.checksum,
            elapsed,
            remote_message: offer.message,
        })
    }

    /// Regular files in the local working directory with their sizes
    pub async fn list_local(&self) -> FerryResult<BTreeMap<String, u64>> {
        self.local.check_access().await?;
        self.local.list_files().await
    }

    pub async fn delete_local(&self, name: &str) -> FerryResult<()> {
        self.local.check_access().await?;
        self.local.remove(name).await
    }

    async fn connect(&self) -> FerryResult<TcpStream> {
        let addr = self.config.server_addr();
        let conn = TcpStream::connect(&addr).await?;
        if let Err(e) = conn.set_nodelay(true) {
            debug!(%addr, error = %e, "could not disable nagle");
        }
        debug!(%addr, "connected");
        Ok(conn)
    }

    /// Send the command and wait for the outcome answering it
    async fn exchange(&self, conn: &mut TcpStream, command: &Command) -> FerryResult<Outcome> {
        self.codec.write_command(conn, command).await?;
        self.expect_outcome(conn, command.kind.into()).await
    }

    /// Read an outcome answering `kind`. Only the command's own kind, or
    /// `Error` for a failure before dispatch, is a valid answer.
    async fn expect_outcome<C>(&self, conn: &mut C, kind: OutcomeKind) -> FerryResult<Outcome>
    where
        C: AsyncRead + Unpin + Send,
    {
        let outcome = self.codec.read_outcome(conn).await?;
        check_outcome(outcome, kind)
    }
}

fn check_outcome(outcome: Outcome, kind: OutcomeKind) -> FerryResult<Outcome> {
    let kind_ok = outcome.kind == kind || (outcome.kind == OutcomeKind::Error && !outcome.is_ok());
    if !kind_ok {
        return Err(FerryError::UnexpectedMessage {
            expected: "matching outcome",
            found: format!("{} outcome", outcome.kind),
        });
    }
    if !outcome.is_ok() {
        return Err(FerryError::Remote(
            outcome
                .message
                .unwrap_or_else(|| "server reported an unspecified error".to_string()),
        ));
    }
    Ok(outcome)
}

async fn close(mut conn: TcpStream) {
    if let Err(e) = conn.shutdown().await {
        debug!(error = %e, "connection already closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_kind_checked_before_status() {
        let err = check_outcome(Outcome::error(OutcomeKind::Download, "nope"), OutcomeKind::DeleteRemote).unwrap_err();
        assert!(matches!(err, FerryError::UnexpectedMessage { .. }));

        let err = check_outcome(Outcome::ok(OutcomeKind::ListRemote), OutcomeKind::DeleteRemote).unwrap_err();
        assert!(matches!(err, FerryError::UnexpectedMessage { .. }));

        let err = check_outcome(Outcome::error(OutcomeKind::Error, "[Fatal error]: gone"), OutcomeKind::Upload).unwrap_err();
        assert!(matches!(err, FerryError::Remote(ref m) if m.contains("Fatal")));

        let err = check_outcome(Outcome::error(OutcomeKind::Upload, "taken"), OutcomeKind::Upload).unwrap_err();
        assert!(matches!(err, FerryError::Remote(_)));

        assert!(check_outcome(Outcome::ok(OutcomeKind::Upload), OutcomeKind::Upload).is_ok());
    }

    #[tokio::test]
    async fn test_download_refuses_existing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("here.txt"), b"x").await.unwrap();

        let client = FileClient::new(ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            local_dir: dir.path().to_path_buf(),
        });
        let err = client.download("here.txt").await.unwrap_err();
        assert!(matches!(err, FerryError::FileAlreadyExists(name) if name == "here.txt"));
    }

    #[tokio::test]
    async fn test_upload_of_missing_file_fails_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let client = FileClient::new(ClientConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            local_dir: dir.path().to_path_buf(),
        });
        let err = client.upload("absent.bin").await.unwrap_err();
        assert!(matches!(err, FerryError::FileNotFoundOrUnreadable(_)));
    }

    #[tokio::test]
    async fn test_local_listing_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.bin"), vec![0u8; 10]).await.unwrap();
        let client = FileClient::new(ClientConfig {
            local_dir: dir.path().to_path_buf(),
            ..ClientConfig::default()
        });

        assert_eq!(client.list_local().await.unwrap().get("a.bin"), Some(&10));
        client.delete_local("a.bin").await.unwrap();
        assert!(client.list_local().await.unwrap().is_empty());
    }
}
