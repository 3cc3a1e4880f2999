//! Events handed to handler methods.

use std::sync::Arc;

use super::DispatchError;
use crate::message::Request;
use crate::patch::Patch;

/// An inbound request together with the connection it arrived on.
#[derive(Debug, Clone)]
pub struct RequestEvent {
    request: Request,
    origin: Option<Arc<Patch>>,
}

impl RequestEvent {
    /// Wraps a request that arrived on `origin`.
    #[must_use]
    pub fn new(request: Request, origin: Arc<Patch>) -> Self {
        Self {
            request,
            origin: Some(origin),
        }
    }

    /// Wraps a request that did not come from a connection.
    #[must_use]
    pub fn detached(request: Request) -> Self {
        Self {
            request,
            origin: None,
        }
    }

    /// The originating request.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The connection the request arrived on, if any.
    #[must_use]
    pub fn origin(&self) -> Option<&Arc<Patch>> {
        self.origin.as_ref()
    }

    /// Sends `response` back over the originating connection.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NoOrigin`] for detached events and
    /// [`DispatchError::Respond`] when the connection rejects the write.
    pub fn respond(&self, response: impl Into<Request>) -> Result<(), DispatchError> {
        let origin = self.origin.as_ref().ok_or(DispatchError::NoOrigin)?;
        origin.send(response).map_err(DispatchError::Respond)
    }
}
