//! Frozen request values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{InternalRequest, REQUEST_HEADER, TARGET_HEADER};

/// Case-sensitive header mapping carried by every [`Request`].
///
/// Keys are unique; inserting an existing key replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    /// Looks up a header value. A missing key is `None`, never an error.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Reports whether the header is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Reports whether no headers are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates headers in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub(crate) fn insert(&mut self, key: String, value: String) {
        self.0.insert(key, value);
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// A message as it travels between peers.
///
/// Requests are immutable: the sender builds one through [`InternalRequest`]
/// and the receiver only reads it. Routers that need to annotate a received
/// request copy it back into a builder with [`Request::into_builder`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    headers: Headers,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    body: Value,
}

impl Request {
    pub(crate) fn from_parts(headers: Headers, body: Value) -> Self {
        Self { headers, body }
    }

    /// Full header mapping.
    #[must_use]
    pub fn header(&self) -> &Headers {
        &self.headers
    }

    /// Endpoint the request is addressed to, if any.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.headers.get(TARGET_HEADER)
    }

    /// Request type used for handler selection, if any.
    #[must_use]
    pub fn request_type(&self) -> Option<&str> {
        self.headers.get(REQUEST_HEADER)
    }

    /// Payload; [`Value::Null`] when the sender attached none.
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Reopens the request as a builder holding the same headers and body.
    #[must_use]
    pub fn into_builder(self) -> InternalRequest {
        InternalRequest::from_parts(self.headers, self.body)
    }
}

impl From<InternalRequest> for Request {
    fn from(builder: InternalRequest) -> Self {
        builder.build()
    }
}
