//! Structured reporting of node lifecycle transitions.

use std::sync::Arc;

use super::{Hook, SPORE_TARGET, SporeError, SporeProfile};

/// Observer notified as a node moves through startup.
pub trait LifecycleReporter: Send + Sync {
    /// `start` was called.
    fn spore_starting(&self, profile: &SporeProfile);

    /// The uplink is connected and the registration sent.
    fn uplink_established(&self, profile: &SporeProfile, uplink: &str);

    /// Every method bound to `hook` returned successfully.
    fn hook_fired(&self, profile: &SporeProfile, hook: Hook, bindings: usize);

    /// Startup completed.
    fn service_available(&self, profile: &SporeProfile);

    /// Startup aborted.
    fn startup_failed(&self, profile: &SporeProfile, error: &SporeError);
}

impl<T> LifecycleReporter for Arc<T>
where
    T: LifecycleReporter + ?Sized,
{
    fn spore_starting(&self, profile: &SporeProfile) {
        (**self).spore_starting(profile);
    }

    fn uplink_established(&self, profile: &SporeProfile, uplink: &str) {
        (**self).uplink_established(profile, uplink);
    }

    fn hook_fired(&self, profile: &SporeProfile, hook: Hook, bindings: usize) {
        (**self).hook_fired(profile, hook, bindings);
    }

    fn service_available(&self, profile: &SporeProfile) {
        (**self).service_available(profile);
    }

    fn startup_failed(&self, profile: &SporeProfile, error: &SporeError) {
        (**self).startup_failed(profile, error);
    }
}

/// Default reporter that emits one `tracing` event per transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredLifecycleReporter;

impl StructuredLifecycleReporter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LifecycleReporter for StructuredLifecycleReporter {
    fn spore_starting(&self, profile: &SporeProfile) {
        tracing::info!(
            target: SPORE_TARGET,
            event = "spore_starting",
            service = profile.service_name(),
            version = profile.version(),
            "starting node"
        );
    }

    fn uplink_established(&self, profile: &SporeProfile, uplink: &str) {
        tracing::info!(
            target: SPORE_TARGET,
            event = "uplink_established",
            service = profile.service_name(),
            uplink,
            "uplink established"
        );
    }

    fn hook_fired(&self, profile: &SporeProfile, hook: Hook, bindings: usize) {
        tracing::debug!(
            target: SPORE_TARGET,
            event = "hook_fired",
            service = profile.service_name(),
            hook = %hook,
            bindings,
            "lifecycle hook fired"
        );
    }

    fn service_available(&self, profile: &SporeProfile) {
        tracing::info!(
            target: SPORE_TARGET,
            event = "service_available",
            service = profile.service_name(),
            "node available"
        );
    }

    fn startup_failed(&self, profile: &SporeProfile, error: &SporeError) {
        tracing::error!(
            target: SPORE_TARGET,
            event = "startup_failed",
            service = profile.service_name(),
            error = %error,
            "node startup failed"
        );
    }
}
