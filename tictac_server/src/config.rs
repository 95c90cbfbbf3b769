// Server configuration.
//
// `ServerConfig` is plain data with a default for every field, so a JSON file
// only needs to name what it changes:
//
//   { "port": 9000, "explicit_rejections": true }
//
// The binary loads an optional file with `ServerConfig::load` and then
// applies command-line overrides (see `main.rs`). Embedders and tests build
// the struct directly.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::session::SessionOptions;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to listen on.
    pub bind_address: String,
    /// TCP port; 0 lets the OS choose.
    pub port: u16,
    /// Send `rejected` to a client whose move was ignored.
    pub explicit_rejections: bool,
    /// How long a new connection may take to send its `hello`.
    pub handshake_timeout_ms: u64,
    /// Per-write timeout for outbound frames; 0 disables it. A peer that
    /// stops reading is dropped from its session once this expires.
    pub write_timeout_ms: u64,
    /// Longest accepted session key, in bytes.
    pub max_session_key_len: usize,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".into(),
            port: 7878,
            explicit_rejections: false,
            handshake_timeout_ms: 5000,
            write_timeout_ms: 10_000,
            max_session_key_len: 64,
            log_filter: None,
        }
    }
}

impl ServerConfig {
    /// Read a JSON config file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `bind_address:port`, for `TcpListener::bind`.
    pub fn listen_addr(&self) -> String {
        match self.bind_address.parse::<std::net::IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.port).to_string(),
            Err(_) => format!("{}:{}", self.bind_address, self.port),
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            explicit_rejections: self.explicit_rejections,
        }
    }
}
