//! Shared configuration for mycelium servers and nodes.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then a
//! configuration file named by `--config-path` (or `MYCELIUM_CONFIG_PATH`),
//! then `MYCELIUM_*` environment variables, then command-line flags. Both the
//! server side and the node side read the same [`Config`] so that a single
//! file can describe a whole deployment.

mod defaults;
mod logging;
mod socket;

use serde::{Deserialize, Serialize};

use ortho_config::OrthoConfig;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAME_BYTES, DEFAULT_TCP_HOST, DEFAULT_TCP_PORT,
    default_log_filter, default_log_format, default_max_frame_bytes, default_server_socket,
    default_uplink_socket,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved configuration shared by the server and node runtimes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "MYCELIUM")]
pub struct Config {
    /// Endpoint a server binds when it is not handed a listening socket.
    #[ortho_config(default = defaults::default_server_socket())]
    #[serde(default = "defaults::default_server_socket")]
    pub server_socket: SocketEndpoint,
    /// Endpoint a node dials to establish its uplink.
    #[ortho_config(default = defaults::default_uplink_socket())]
    #[serde(default = "defaults::default_uplink_socket")]
    pub uplink_socket: SocketEndpoint,
    /// Largest accepted frame, in bytes, including the line delimiter.
    #[ortho_config(default = defaults::DEFAULT_MAX_FRAME_BYTES)]
    #[serde(default = "defaults::default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// `tracing` filter expression.
    #[ortho_config(default = defaults::default_log_filter_string())]
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = defaults::default_log_format())]
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_socket: default_server_socket(),
            uplink_socket: default_uplink_socket(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            log_filter: defaults::default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Endpoint the server binds.
    #[must_use]
    pub fn server_socket(&self) -> &SocketEndpoint {
        &self.server_socket
    }

    /// Endpoint the node dials for its uplink.
    #[must_use]
    pub fn uplink_socket(&self) -> &SocketEndpoint {
        &self.uplink_socket
    }

    /// Upper bound on a single frame.
    #[must_use]
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Structured log format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
