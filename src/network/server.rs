use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::config::ServerConfig;
use super::locks::NameLocks;
use super::session::Session;
use crate::error::{FerryError, FerryResult};
use crate::storage::{FileStore, LocalDir};

/// Accepts connections and runs one session per connection
pub struct FileServer {
    listener: TcpListener,
    store: Arc<dyn FileStore>,
    locks: Option<NameLocks>,
    limit: Option<Arc<Semaphore>>,
}

impl FileServer {
    /// Bind the listening socket described by `config`
    pub async fn bind(config: ServerConfig) -> FerryResult<Self> {
        let store: Arc<dyn FileStore> = Arc::new(LocalDir::new(config.root_dir.clone()));
        Self::bind_with_store(&config, store).await
    }

    /// Bind with a caller supplied store
    pub async fn bind_with_store(config: &ServerConfig, store: Arc<dyn FileStore>) -> FerryResult<Self> {
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            FerryError::Config(format!("cannot listen on {}: {}", addr, e))
        })?;

        if let Err(e) = store.check_access().await {
            // Sessions report this to clients, the server still starts
            warn!(error = %e, "working directory is not usable yet");
        }

        let locks = config.lock_files.then(NameLocks::new);
        let limit = (config.max_sessions > 0).then(|| Arc::new(Semaphore::new(config.max_sessions)));

        let local = listener.local_addr()?;
        info!(
            address = %local,
            root = %store.root().display(),
            max_sessions = config.max_sessions,
            locks = config.lock_files,
            "file server listening"
        );

        Ok(Self {
            listener,
            store,
            locks,
            limit,
        })
    }

    pub fn local_addr(&self) -> FerryResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process is stopped
    pub async fn run(self) -> FerryResult<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Serve until `shutdown` completes. Sessions already running finish on
    /// their own.
    pub async fn run_until<F>(self, shutdown: F) -> FerryResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            let permit = match &self.limit {
                Some(limit) => tokio::select! {
                    permit = limit.clone().acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => return Ok(()),
                    },
                    _ = &mut shutdown => break,
                },
                None => None,
            };

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(%peer, error = %e, "could not disable nagle");
                        }
                        let session = Session::new(stream, Some(peer), self.store.clone(), self.locks.clone());
                        tokio::spawn(async move {
                            session.run().await;
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                    }
                },
                _ = &mut shutdown => break,
            }
        }

        info!("file server stopped accepting connections");
        Ok(())
    }
}
