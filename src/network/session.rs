//! Server side handling of one accepted connection.
//!
//! A session reads exactly one command, answers with exactly one outcome,
//! runs at most one chunk stream, and closes. Upload sessions additionally
//! send a trailing outcome reporting whether the stored file verified.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::OwnedMutexGuard;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use super::locks::NameLocks;
use crate::error::{FerryError, FerryResult};
use crate::file_transfer::{
    Command, CommandKind, ExpectedFile, Outcome, OutcomeKind, WireCodec, receive_file, send_file,
};
use crate::storage::FileStore;
use crate::utils::format_size;

/// States a session moves through
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    AwaitCommand,
    Dispatching(Command),
    Listing,
    Deleting(String),
    Uploading(ExpectedFile),
    Downloading(String),
    Erroring { kind: OutcomeKind, message: String },
    Closed,
}

/// Per-connection state machine
pub struct Session<S> {
    id: Uuid,
    peer: Option<SocketAddr>,
    stream: S,
    store: Arc<dyn FileStore>,
    locks: Option<NameLocks>,
    codec: WireCodec,
    outcome_sent: bool,
    bytes_transferred: u64,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, peer: Option<SocketAddr>, store: Arc<dyn FileStore>, locks: Option<NameLocks>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            stream,
            store,
            locks,
            codec: WireCodec::new(),
            outcome_sent: false,
            bytes_transferred: 0,
        }
    }

    /// Drive the session to completion and release the connection
    pub async fn run(self) {
        let peer = self
            .peer
            .map(|p| p.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let span = info_span!("session", id = %self.id, peer = %peer);
        self.run_states().instrument(span).await
    }

    async fn run_states(mut self) {
        let started = Instant::now();
        let mut state = SessionState::AwaitCommand;
        loop {
            state = match state {
                SessionState::Closed => break,
                current => self.step(current).await,
            };
        }

        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "connection already gone at shutdown");
        }
        debug!(
            answered = self.outcome_sent,
            bytes = self.bytes_transferred,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session closed"
        );
    }

    async fn step(&mut self, state: SessionState) -> SessionState {
        match state {
            SessionState::AwaitCommand => match self.codec.read_command(&mut self.stream).await {
                Ok(command) => SessionState::Dispatching(command),
                Err(e) => {
                    warn!(error = %e, "no usable command received");
                    SessionState::Closed
                }
            },
            SessionState::Dispatching(command) => self.dispatch(command).await,
            SessionState::Listing => self.list().await,
            SessionState::Deleting(name) => self.delete(&name).await,
            SessionState::Downloading(name) => self.download(&name).await,
            SessionState::Uploading(expected) => self.upload(&expected).await,
            SessionState::Erroring { kind, message } => {
                warn!(%kind, %message, "command failed");
                self.try_send(&Outcome::error(kind, message)).await;
                SessionState::Closed
            }
            SessionState::Closed => SessionState::Closed,
        }
    }

    async fn dispatch(&mut self, command: Command) -> SessionState {
        info!(command = %command.kind, target = command.target_name(), "received command");

        if let Err(e) = self.store.check_access().await {
            return SessionState::Erroring {
                kind: OutcomeKind::Error,
                message: e.to_string(),
            };
        }

        if command.kind == CommandKind::ListRemote {
            return SessionState::Listing;
        }

        let name = command.target_name().to_string();
        if let Err(e) = self.store.resolve(&name) {
            return erroring(command.kind, e);
        }

        match command.kind {
            CommandKind::ListRemote => SessionState::Listing,
            CommandKind::DeleteRemote => SessionState::Deleting(name),
            CommandKind::Download => SessionState::Downloading(name),
            CommandKind::Upload => SessionState::Uploading(ExpectedFile {
                name,
                size: command.file_size,
                checksum: command.checksum.unwrap_or_default(),
            }),
        }
    }

    async fn list(&mut self) -> SessionState {
        match self.store.list_files().await {
            Ok(files) => {
                let files = files
                    .into_iter()
                    .map(|(name, size)| (name, format_size(size)))
                    .collect();
                info!("listed working directory");
                self.try_send(&Outcome::ok(CommandKind::ListRemote).with_files(files))
                    .await;
                SessionState::Closed
            }
            Err(e) => erroring(CommandKind::ListRemote, e),
        }
    }

    async fn delete(&mut self, name: &str) -> SessionState {
        let _guard = self.lock(name).await;
        match self.store.remove(name).await {
            Ok(()) => {
                info!(file = name, "file deleted");
                let outcome = Outcome::ok(CommandKind::DeleteRemote).with_message(format!("File '{}' deleted.", name));
                self.try_send(&outcome).await;
                SessionState::Closed
            }
            Err(e) => SessionState::Erroring {
                kind: OutcomeKind::DeleteRemote,
                message: format!("Can not delete file '{}': {}", name, e),
            },
        }
    }

    async fn download(&mut self, name: &str) -> SessionState {
        let _guard = self.lock(name).await;

        let checksum = match self.store.checksum(name).await {
            Ok(checksum) => checksum,
            Err(e) => return erroring(CommandKind::Download, e),
        };
        let (mut file, size) = match self.store.open_for_read(name).await {
            Ok(opened) => opened,
            Err(e) => return erroring(CommandKind::Download, e),
        };

        let outcome = Outcome::ok(CommandKind::Download)
            .with_message(format!("File '{}' exists, ready for transfer", name))
            .with_file(size, checksum.clone());
        if !self.try_send(&outcome).await {
            return SessionState::Closed;
        }

        let started = Instant::now();
        match send_file(&mut self.stream, &mut file, name).await {
            Ok(stats) => {
                self.bytes_transferred += stats.bytes;
                if stats.checksum != checksum {
                    warn!(file = name, "file changed while it was being sent");
                }
                info!(
                    file = name,
                    bytes = stats.bytes,
                    chunks = stats.chunks,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "download completed"
                );
            }
            Err(e) => {
                warn!(file = name, error = %e, "download aborted");
                if !e.is_connection() {
                    let message = format!("I/O error while transferring file '{}'", name);
                    self.try_send(&Outcome::error(OutcomeKind::Error, message)).await;
                }
            }
        }
        SessionState::Closed
    }

    async fn upload(&mut self, expected: &ExpectedFile) -> SessionState {
        let name = expected.name.as_str();
        let _guard = self.lock(name).await;

        let (file, path) = match self.store.create_new(name).await {
            Ok(created) => created,
            Err(e) => return erroring(CommandKind::Upload, e),
        };

        let accept = Outcome::ok(CommandKind::Upload).with_message(format!("Can accept file '{}'", name));
        if !self.try_send(&accept).await {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(file = name, error = %e, "could not remove unused upload target");
            }
            return SessionState::Closed;
        }

        let started = Instant::now();
        let result = receive_file(&mut self.stream, expected, file, &path).await;
        let report = match &result {
            Ok(stats) => {
                self.bytes_transferred += stats.bytes;
                info!(
                    file = name,
                    bytes = stats.bytes,
                    chunks = stats.chunks,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "upload stored"
                );
                Outcome::ok(CommandKind::Upload)
                    .with_message(format!("File '{}' stored ({} bytes)", name, stats.bytes))
                    .with_file(stats.bytes, stats.checksum.clone())
            }
            Err(e) => {
                warn!(file = name, error = %e, "upload rejected, file will not be saved");
                Outcome::error(CommandKind::Upload, e.to_string())
            }
        };

        if !matches!(result, Err(FerryError::Connection(_))) {
            self.try_send(&report).await;
        }
        SessionState::Closed
    }

    async fn lock(&self, name: &str) -> Option<OwnedMutexGuard<()>> {
        match &self.locks {
            Some(locks) => Some(locks.acquire(name).await),
            None => None,
        }
    }

    /// Send an outcome, logging instead of failing when the peer is gone
    async fn try_send(&mut self, outcome: &Outcome) -> bool {
        match self.send(outcome).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "could not send outcome");
                false
            }
        }
    }

    async fn send(&mut self, outcome: &Outcome) -> FerryResult<()> {
        self.codec.write_outcome(&mut self.stream, outcome).await?;
        self.outcome_sent = true;
        Ok(())
    }
}

fn erroring(kind: impl Into<OutcomeKind>, error: FerryError) -> SessionState {
    SessionState::Erroring {
        kind: kind.into(),
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_transfer::OutcomeStatus;
    use crate::storage::LocalDir;

    #[tokio::test]
    async fn test_session_over_in_memory_pipe() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"abc").await.unwrap();
        let store: Arc<dyn FileStore> = Arc::new(LocalDir::new(dir.path()));

        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let session = Session::new(server, None, store, None);
        let handle = tokio::spawn(session.run());

        let codec = WireCodec::new();
        codec.write_command(&mut client, &Command::list()).await.unwrap();
        let outcome = codec.read_outcome(&mut client).await.unwrap();
        handle.await.unwrap();

        assert_eq!(outcome.status, OutcomeStatus::Ok);
        assert_eq!(outcome.files.get("a.txt").map(String::as_str), Some("3B"));
    }

    #[tokio::test]
    async fn test_missing_root_answers_with_error_kind() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn FileStore> = Arc::new(LocalDir::new(dir.path().join("missing")));

        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let handle = tokio::spawn(Session::new(server, None, store, None).run());

        let codec = WireCodec::new();
        codec.write_command(&mut client, &Command::delete("x")).await.unwrap();
        let outcome = codec.read_outcome(&mut client).await.unwrap();
        handle.await.unwrap();

        assert_eq!(outcome.kind, OutcomeKind::Error);
        assert!(outcome.message.unwrap().contains("Fatal error"));
    }

    #[tokio::test]
    async fn test_garbage_closes_without_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn FileStore> = Arc::new(LocalDir::new(dir.path()));

        let (mut client, server) = tokio::io::duplex(1024);
        let handle = tokio::spawn(Session::new(server, None, store, None).run());

        client.write_all(&[0, 0, 0, 3, 0xff, 0xff, 0xff]).await.unwrap();
        handle.await.unwrap();

        let mut rest = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut client, &mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
