//! Descriptive metadata a node announces about itself.

use serde::{Deserialize, Serialize};

use crate::message::{InternalRequest, Request};
use crate::network::{PROTOCOL_HEADER, REGISTER_REQUEST, SERVICE_HEADER, VERSION_HEADER};

/// Service name, version and optional protocol version of a node.
///
/// The protocol version is carried to the server but not negotiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SporeProfile {
    service_name: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    protocol_version: Option<u32>,
}

impl SporeProfile {
    #[must_use]
    pub fn new(service_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            version: version.into(),
            protocol_version: None,
        }
    }

    #[must_use]
    pub fn with_protocol_version(mut self, protocol_version: u32) -> Self {
        self.protocol_version = Some(protocol_version);
        self
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn protocol_version(&self) -> Option<u32> {
        self.protocol_version
    }

    /// The request a node sends right after dialing its uplink.
    pub(crate) fn registration(&self) -> Request {
        let request = InternalRequest::new()
            .with_request(REGISTER_REQUEST)
            .with_header(SERVICE_HEADER, &self.service_name)
            .with_header(VERSION_HEADER, &self.version);
        let request = match self.protocol_version {
            Some(protocol) => request.with_header(PROTOCOL_HEADER, protocol),
            None => request,
        };
        request.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_announces_the_profile() {
        let request = SporeProfile::new("TestSpore", "1.0")
            .with_protocol_version(2)
            .registration();
        assert_eq!(request.request_type(), Some(REGISTER_REQUEST));
        assert_eq!(request.header().get(SERVICE_HEADER), Some("TestSpore"));
        assert_eq!(request.header().get(VERSION_HEADER), Some("1.0"));
        assert_eq!(request.header().get(PROTOCOL_HEADER), Some("2"));
    }

    #[test]
    fn protocol_version_is_optional_on_the_wire() {
        let profile = SporeProfile::new("TestSpore", "1.0");
        assert!(!profile.registration().header().contains(PROTOCOL_HEADER));

        let json = serde_json::to_string(&profile).expect("serialize profile");
        assert_eq!(json, r#"{"service_name":"TestSpore","version":"1.0"}"#);
        let decoded: SporeProfile = serde_json::from_str(&json).expect("decode profile");
        assert_eq!(decoded, profile);
    }
}
