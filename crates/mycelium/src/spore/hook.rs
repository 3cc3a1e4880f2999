//! Named lifecycle extension points and their bindings.

use std::fmt;

use super::SporeContext;
use crate::interactions::HandlerError;

/// A phase of node startup that application code can hook into.
///
/// New hooks may be added; match with a wildcard arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum Hook {
    /// The uplink is connected and the node has announced itself.
    Uplink,
    /// The node's uplink loop is running and it can take routed work.
    ServiceAvailable,
}

/// Fires once the uplink is live, before any other hook.
pub const HOOK_UPLINK: Hook = Hook::Uplink;

/// Fires once after [`HOOK_UPLINK`] has returned.
pub const HOOK_SERVICE_AVAILABLE: Hook = Hook::ServiceAvailable;

impl Hook {
    /// Stable name used in logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Uplink => "uplink",
            Self::ServiceAvailable => "service_available",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A method bound to a hook.
pub type HookFn<S> = fn(&S, &SporeContext) -> Result<(), HandlerError>;

/// Hook bindings declared by one node type, kept in declaration order.
///
/// Several methods may bind to the same hook. They fire in the order they
/// were declared and the first failure stops the rest.
pub struct Hooks<S> {
    entries: Vec<(Hook, HookFn<S>)>,
}

impl<S> fmt::Debug for Hooks<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(hook, _)| hook))
            .finish()
    }
}

impl<S> Hooks<S> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Binds `method` to `hook`.
    pub fn on(&mut self, hook: Hook, method: HookFn<S>) -> &mut Self {
        self.entries.push((hook, method));
        self
    }

    /// Methods bound to `hook`, in declaration order.
    pub(crate) fn bound(&self, hook: Hook) -> impl Iterator<Item = HookFn<S>> + '_ {
        self.entries
            .iter()
            .filter(move |(bound, _)| *bound == hook)
            .map(|(_, method)| *method)
    }

    /// Number of methods bound to `hook`.
    #[must_use]
    pub fn count(&self, hook: Hook) -> usize {
        self.bound(hook).count()
    }
}
