//! Configuration loading and management.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Network listen configuration.
    #[serde(default)]
    pub listen: ListenConfig,
    /// Hub behavior options.
    #[serde(default)]
    pub hub: HubConfig,
}

/// Listen configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address the WebSocket endpoint binds to.
    #[serde(default = "default_address")]
    pub address: SocketAddr,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

fn default_address() -> SocketAddr {
    "127.0.0.1:3000".parse().expect("static listen address")
}

/// Hub behavior options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubConfig {
    /// Whether to emit MOTD packets during the CL3/CL4 initial burst.
    #[serde(default)]
    pub enable_motd: bool,
    /// MOTD content; a stock banner is used when empty.
    #[serde(default)]
    pub motd_message: String,
    /// Send a `client_ip` packet during the CL3/CL4 initial burst.
    #[serde(default)]
    pub serve_ip_addresses: bool,
    /// Log each client's remote address at connection time.
    #[serde(default)]
    pub check_ip_addresses: bool,
    /// Close new connections before any command dispatch.
    #[serde(default)]
    pub reject_clients: bool,
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields the
    /// defaults with a warning, so the server runs out of the box.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(toml::from_str(&contents)?)
    }
}
