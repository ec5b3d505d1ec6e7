use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::error::{FerryError, FerryResult};

/// Default port for network connections
pub const DEFAULT_PORT: u16 = 4321;

/// Server side settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Working directory served to clients
    pub root_dir: PathBuf,
    /// Sessions allowed to run at once, 0 for no limit
    pub max_sessions: usize,
    /// Serialize delete/upload/download of the same file name
    pub lock_files: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            root_dir: PathBuf::from("."),
            max_sessions: 0,
            lock_files: true,
        }
    }
}

impl ServerConfig {
    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

/// Client side settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Local working directory for uploads and downloads
    pub local_dir: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            local_dir: PathBuf::from("."),
        }
    }
}

impl ClientConfig {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

impl AppConfig {
    /// Load configuration from a JSON file, or the defaults when no path is given
    pub fn load_or_default(config_path: Option<&Path>) -> FerryResult<Self> {
        let Some(path) = config_path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .map_err(|e| FerryError::Config(format!("cannot read '{}': {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| FerryError::Config(format!("cannot parse '{}': {}", path.display(), e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> FerryResult<()> {
        if self.server.port == 0 {
            return Err(FerryError::Config("server port must be greater than 0".into()));
        }
        if self.client.port == 0 {
            return Err(FerryError::Config("client port must be greater than 0".into()));
        }
        if self.client.host.trim().is_empty() {
            return Err(FerryError::Config("client host must not be empty".into()));
        }
        Ok(())
    }
}
