use std::io;

use thiserror::Error;

use super::{Hook, LifecycleState};
use crate::interactions::HandlerError;
use crate::patch::PatchError;

/// Errors that abort node startup or shutdown.
#[derive(Debug, Error)]
pub enum SporeError {
    /// `start` was called on a node that is no longer fresh.
    #[error("node already started (state: {state})")]
    AlreadyStarted { state: LifecycleState },

    /// The uplink could not be dialed.
    #[error("failed to establish uplink: {0}")]
    Uplink(#[source] PatchError),

    /// The registration request could not be sent over the uplink.
    #[error("failed to register with the server: {0}")]
    Registration(#[source] PatchError),

    /// A method bound to `hook` failed or panicked.
    #[error("{hook} hook failed: {source}")]
    LifecycleHookFault {
        hook: Hook,
        #[source]
        source: HandlerError,
    },

    /// The uplink loop thread could not be spawned.
    #[error("failed to spawn uplink thread: {source}")]
    Spawn {
        #[source]
        source: io::Error,
    },

    /// The uplink loop thread panicked.
    #[error("uplink thread panicked")]
    ThreadPanic,
}
