//! Server configuration, resolved from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Environment variable selecting the listen address.
pub const LISTEN_ENVIRONMENT_VARIABLE: &str = "AU_LISTEN";

const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

/// Runtime configuration for the standalone server binary.
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage root holding the workspace files
    pub directory: PathBuf,
    /// Address to bind the HTTP listener on
    pub listen: SocketAddr,
}

impl Config {
    /// Resolve configuration from `AU_DIRECTORY` and `AU_LISTEN`.
    pub fn from_env() -> Result<Self, String> {
        let directory =
            au_core::config::resolve_storage_root(None).map_err(|e| e.to_string())?;
        let listen = std::env::var(LISTEN_ENVIRONMENT_VARIABLE)
            .unwrap_or_else(|_| DEFAULT_LISTEN.to_string());
        let listen: SocketAddr = listen
            .parse()
            .map_err(|e| format!("invalid listen address '{listen}': {e}"))?;
        Ok(Self { directory, listen })
    }
}
