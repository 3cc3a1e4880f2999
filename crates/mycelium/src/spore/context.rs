use std::sync::Arc;

use super::SporeProfile;
use crate::interactions::Interactions;
use crate::patch::Patch;

/// What hook methods get to work with: the live uplink and the node's
/// handler registry.
#[derive(Debug, Clone)]
pub struct SporeContext {
    profile: SporeProfile,
    uplink: Arc<Patch>,
    interactions: Arc<Interactions>,
}

impl SporeContext {
    pub(crate) fn new(
        profile: SporeProfile,
        uplink: Arc<Patch>,
        interactions: Arc<Interactions>,
    ) -> Self {
        Self {
            profile,
            uplink,
            interactions,
        }
    }

    #[must_use]
    pub fn profile(&self) -> &SporeProfile {
        &self.profile
    }

    /// The connection to the server.
    #[must_use]
    pub fn uplink(&self) -> &Arc<Patch> {
        &self.uplink
    }

    /// The registry the uplink loop dispatches into.
    #[must_use]
    pub fn interactions(&self) -> &Arc<Interactions> {
        &self.interactions
    }
}
