//! Error types for the listener and server.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use mycelium_config::SocketPreparationError;

/// Errors surfaced while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty { host: String, port: u16 },
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for endpoint {endpoint}")]
    UnsupportedUnix { endpoint: String },
    #[cfg(unix)]
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        path: String,
        #[source]
        source: io::Error,
    },
    #[cfg(unix)]
    #[error("existing unix socket {path} is already in use")]
    UnixInUse { path: String },
    #[cfg(unix)]
    #[error("unix socket path {path} is not a socket")]
    UnixNotSocket { path: String },
    #[cfg(unix)]
    #[error("failed to read metadata for unix socket {path}: {source}")]
    UnixMetadata {
        path: String,
        #[source]
        source: io::Error,
    },
    #[cfg(unix)]
    #[error("failed to connect to existing unix socket {path}: {source}")]
    UnixConnect {
        path: String,
        #[source]
        source: io::Error,
    },
    #[cfg(unix)]
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Errors surfaced while starting or stopping a server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be prepared.
    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// The socket's parent directory could not be prepared.
    #[error(transparent)]
    Prepare(#[from] SocketPreparationError),

    /// The server was started with neither a listener nor an attached patch.
    #[error("server has no listening socket and no attached connections")]
    NothingToServe,

    /// A server thread could not be spawned.
    #[error("failed to spawn server thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },

    /// A server thread panicked.
    #[error("{thread} thread panicked")]
    ThreadPanic { thread: String },
}
