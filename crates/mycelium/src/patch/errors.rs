//! Error types for connection framing and I/O.

use std::io;

use thiserror::Error;

/// Errors surfaced by [`Patch`](super::Patch) operations.
#[derive(Debug, Error)]
pub enum PatchError {
    /// The stream ended or the patch was closed locally. This is the normal
    /// way for a read loop to finish.
    #[error("connection closed")]
    ConnectionClosed,

    /// The underlying socket failed.
    #[error("connection error: {source}")]
    Connection {
        #[source]
        source: io::Error,
    },

    /// A frame could not be decoded into a request.
    #[error("malformed frame: {message}")]
    Malformed {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// A frame exceeded the configured size ceiling.
    #[error("frame too large: {size} bytes exceeds {max_size} byte limit")]
    FrameTooLarge { size: usize, max_size: usize },

    /// Dialing a remote endpoint failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Encoding an outbound request failed.
    #[error("failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl PatchError {
    /// Reports whether this is the orderly end of a connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }

    pub(crate) fn connection(source: io::Error) -> Self {
        Self::Connection { source }
    }

    pub(crate) fn from_json_error(source: serde_json::Error) -> Self {
        Self::Malformed {
            message: source.to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn frame_too_large(size: usize, max_size: usize) -> Self {
        Self::FrameTooLarge { size, max_size }
    }

    pub(crate) fn connect(endpoint: impl ToString, source: io::Error) -> Self {
        Self::Connect {
            endpoint: endpoint.to_string(),
            source,
        }
    }
}
