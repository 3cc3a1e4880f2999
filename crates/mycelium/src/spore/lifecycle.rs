use std::fmt;

/// Where a node is in its startup sequence.
///
/// States only move forward: `Created`, `UplinkEstablishing`, `UplinkReady`,
/// then `ServiceAvailable`. Any failure on the way lands in `Faulted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    UplinkEstablishing,
    UplinkReady,
    ServiceAvailable,
    Faulted,
}

impl LifecycleState {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::UplinkEstablishing => "uplink_establishing",
            Self::UplinkReady => "uplink_ready",
            Self::ServiceAvailable => "service_available",
            Self::Faulted => "faulted",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
