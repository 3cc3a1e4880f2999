use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Loopback host used by the default TCP endpoints.
pub const DEFAULT_TCP_HOST: &str = "127.0.0.1";

/// Port the server listens on when nothing else is configured.
pub const DEFAULT_TCP_PORT: u16 = 25605;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default frame ceiling (1 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Default log filter expression.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub(crate) fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default frame ceiling.
pub fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

/// Endpoint a server binds by default.
pub fn default_server_socket() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_TCP_HOST, DEFAULT_TCP_PORT)
}

/// Endpoint a node dials by default; matches [`default_server_socket`].
pub fn default_uplink_socket() -> SocketEndpoint {
    default_server_socket()
}
