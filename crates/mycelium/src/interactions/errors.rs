//! Error types for handler registration and dispatch.

use std::error::Error as StdError;

use thiserror::Error;

use crate::patch::PatchError;

/// Error type returned by handler methods.
pub type HandlerError = Box<dyn StdError + Send + Sync>;

/// Configuration faults detected while registering a start point.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InteractionError {
    /// Two methods of one interaction claim the same request type.
    #[error("interaction {interaction} binds request type '{request_type}' more than once")]
    DuplicateHandlerBinding {
        interaction: &'static str,
        request_type: String,
    },

    /// The interaction declares no method for the key it was registered under.
    #[error("interaction {interaction} has no handler bound to request type '{request_type}'")]
    UnboundRequestType {
        interaction: &'static str,
        request_type: String,
    },
}

/// Per-message dispatch failures. None of these stop a read loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No start point is registered for the request type.
    #[error("no handler registered for request type '{request_type}'")]
    UnroutableRequest { request_type: String },

    /// The request carries no request-type header.
    #[error("request has no request type")]
    MissingRequestType,

    /// The handler method returned an error.
    #[error("handler for '{request_type}' failed: {source}")]
    Handler {
        request_type: String,
        #[source]
        source: HandlerError,
    },

    /// The handler method panicked.
    #[error("handler for '{request_type}' panicked")]
    HandlerPanicked { request_type: String },

    /// A response could not be sent back to the originating connection.
    #[error("failed to respond: {0}")]
    Respond(#[source] PatchError),

    /// A response was requested for an event with no originating connection.
    #[error("event has no originating connection to respond on")]
    NoOrigin,
}

impl DispatchError {
    pub(crate) fn unroutable(request_type: impl Into<String>) -> Self {
        Self::UnroutableRequest {
            request_type: request_type.into(),
        }
    }

    /// Reports whether the request simply had nowhere to go.
    #[must_use]
    pub fn is_unroutable(&self) -> bool {
        matches!(self, Self::UnroutableRequest { .. } | Self::MissingRequestType)
    }
}
