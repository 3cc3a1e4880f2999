//! Fluent construction of outbound requests.

use std::fmt::Display;

use serde_json::Value;

use super::{Headers, REQUEST_HEADER, Request, TARGET_HEADER};

/// Mutable builder for an outbound [`Request`].
///
/// No validation is applied: any header text is legal, and a request without
/// a target or request type only fails later, when nothing can route it.
///
/// ```
/// use mycelium::message::InternalRequest;
///
/// let request = InternalRequest::new()
///     .with_target("Endpoint")
///     .with_request("TestRequest")
///     .with_header("attempt", 1)
///     .build();
/// assert_eq!(request.header().get("target"), Some("Endpoint"));
/// assert_eq!(request.header().get("attempt"), Some("1"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InternalRequest {
    headers: Headers,
    body: Value,
}

impl InternalRequest {
    /// Starts an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(headers: Headers, body: Value) -> Self {
        Self { headers, body }
    }

    /// Sets the `target` header.
    #[must_use]
    pub fn with_target(self, target: impl Display) -> Self {
        self.with_header(TARGET_HEADER, target)
    }

    /// Sets the `request` header.
    #[must_use]
    pub fn with_request(self, request_type: impl Display) -> Self {
        self.with_header(REQUEST_HEADER, request_type)
    }

    /// Sets an arbitrary header, replacing any earlier value for `key`.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.headers.insert(key.into(), value.to_string());
        self
    }

    /// Attaches a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Freezes the builder into a [`Request`].
    #[must_use]
    pub fn build(self) -> Request {
        Request::from_parts(self.headers, self.body)
    }
}
