//! The lifecycle controller that starts a node.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use mycelium_config::{Config, DEFAULT_MAX_FRAME_BYTES, SocketEndpoint};

use super::{
    Hook, Hooks, LifecycleReporter, LifecycleState, SPORE_TARGET, Spore, SporeContext, SporeError,
    StructuredLifecycleReporter,
};
use crate::interactions::{Interactions, RequestEvent};
use crate::patch::Patch;
use crate::threads::thread_name;

/// Drives one [`Spore`] through startup and owns its handler registry.
///
/// `start` runs the whole sequence on the calling thread: dial, register,
/// fire [`HOOK_UPLINK`](super::HOOK_UPLINK), start the uplink loop, fire
/// [`HOOK_SERVICE_AVAILABLE`](super::HOOK_SERVICE_AVAILABLE). A node starts
/// at most once.
pub struct SporeNode<S: Spore> {
    spore: S,
    hooks: Hooks<S>,
    interactions: Arc<Interactions>,
    reporter: Arc<dyn LifecycleReporter>,
    max_frame_bytes: usize,
    state: Mutex<LifecycleState>,
}

impl<S: Spore> std::fmt::Debug for SporeNode<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SporeNode")
            .field("profile", self.spore.profile())
            .field("hooks", &self.hooks)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<S: Spore> SporeNode<S> {
    /// Collects the hook bindings `S` declares.
    #[must_use]
    pub fn new(spore: S) -> Self {
        let mut hooks = Hooks::new();
        S::hooks(&mut hooks);
        Self {
            spore,
            hooks,
            interactions: Arc::new(Interactions::new()),
            reporter: Arc::new(StructuredLifecycleReporter::new()),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            state: Mutex::new(LifecycleState::Created),
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: impl LifecycleReporter + 'static) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Frame ceiling for an uplink dialed by [`start`](Self::start).
    #[must_use]
    pub fn with_frame_limit(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    #[must_use]
    pub fn spore(&self) -> &S {
        &self.spore
    }

    #[must_use]
    pub fn interactions(&self) -> &Arc<Interactions> {
        &self.interactions
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.lock_state()
    }

    /// Starts against the configured uplink socket and frame limit.
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub fn start_with_config(&self, config: &Config) -> Result<SporeHandle, SporeError> {
        self.dial(config.uplink_socket(), config.max_frame_bytes())
    }

    /// Dials `endpoint` and runs startup.
    ///
    /// # Errors
    ///
    /// Returns [`SporeError::AlreadyStarted`] unless the node is fresh,
    /// [`SporeError::Uplink`] when dialing fails and the failures of
    /// [`start_on`](Self::start_on) otherwise. Every failure leaves the node
    /// [`Faulted`](LifecycleState::Faulted) with its uplink closed.
    pub fn start(&self, endpoint: &SocketEndpoint) -> Result<SporeHandle, SporeError> {
        self.dial(endpoint, self.max_frame_bytes)
    }

    /// Runs startup over an uplink connected elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`SporeError::AlreadyStarted`] unless the node is fresh,
    /// [`SporeError::Registration`] when the uplink rejects the registration,
    /// [`SporeError::LifecycleHookFault`] for the first failing hook method,
    /// and [`SporeError::Spawn`] when the uplink loop cannot be started.
    pub fn start_on(&self, uplink: Patch) -> Result<SporeHandle, SporeError> {
        self.begin()?;
        self.establish(uplink)
    }

    fn dial(
        &self,
        endpoint: &SocketEndpoint,
        max_frame_bytes: usize,
    ) -> Result<SporeHandle, SporeError> {
        self.begin()?;
        debug!(target: SPORE_TARGET, %endpoint, "dialing uplink");
        match Patch::connect(endpoint) {
            Ok(uplink) => self.establish(uplink.with_frame_limit(max_frame_bytes)),
            Err(error) => Err(self.fault(SporeError::Uplink(error), None)),
        }
    }

    fn begin(&self) -> Result<(), SporeError> {
        let mut state = self.lock_state();
        if *state != LifecycleState::Created {
            return Err(SporeError::AlreadyStarted { state: *state });
        }
        *state = LifecycleState::UplinkEstablishing;
        drop(state);
        self.reporter.spore_starting(self.spore.profile());
        Ok(())
    }

    fn establish(&self, uplink: Patch) -> Result<SporeHandle, SporeError> {
        let profile = self.spore.profile();
        let uplink = Arc::new(uplink);
        if let Err(error) = uplink.send(profile.registration()) {
            return Err(self.fault(SporeError::Registration(error), Some(&uplink)));
        }
        self.reporter.uplink_established(profile, uplink.name());

        let context = SporeContext::new(
            profile.clone(),
            Arc::clone(&uplink),
            Arc::clone(&self.interactions),
        );
        if let Err(error) = self.fire(Hook::Uplink, &context) {
            return Err(self.fault(error, Some(&uplink)));
        }

        let spawned = spawn_uplink_loop(&uplink, &self.interactions, profile.service_name());
        let worker = match spawned {
            Ok(worker) => worker,
            Err(source) => return Err(self.fault(SporeError::Spawn { source }, Some(&uplink))),
        };
        self.set_state(LifecycleState::UplinkReady);

        if let Err(error) = self.fire(Hook::ServiceAvailable, &context) {
            uplink.close();
            if worker.join().is_err() {
                warn!(target: SPORE_TARGET, "uplink thread panicked during shutdown");
            }
            return Err(self.fault(error, None));
        }
        self.set_state(LifecycleState::ServiceAvailable);
        self.reporter.service_available(profile);

        Ok(SporeHandle {
            context,
            worker: Some(worker),
        })
    }

    fn fire(&self, hook: Hook, context: &SporeContext) -> Result<(), SporeError> {
        let mut fired = 0;
        for method in self.hooks.bound(hook) {
            let outcome = catch_unwind(AssertUnwindSafe(|| method(&self.spore, context)))
                .unwrap_or_else(|_| Err("hook method panicked".into()));
            outcome.map_err(|source| SporeError::LifecycleHookFault { hook, source })?;
            fired += 1;
        }
        self.reporter.hook_fired(self.spore.profile(), hook, fired);
        Ok(())
    }

    fn fault(&self, error: SporeError, uplink: Option<&Arc<Patch>>) -> SporeError {
        self.set_state(LifecycleState::Faulted);
        if let Some(uplink) = uplink {
            uplink.close();
        }
        self.reporter.startup_failed(self.spore.profile(), &error);
        error
    }

    fn set_state(&self, next: LifecycleState) {
        *self.lock_state() = next;
    }

    fn lock_state(&self) -> MutexGuard<'_, LifecycleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn spawn_uplink_loop(
    uplink: &Arc<Patch>,
    interactions: &Arc<Interactions>,
    service: &str,
) -> std::io::Result<JoinHandle<()>> {
    let uplink = Arc::clone(uplink);
    let interactions = Arc::clone(interactions);
    thread::Builder::new()
        .name(thread_name("mycelium-uplink-", service))
        .spawn(move || run_uplink_loop(&uplink, &interactions))
}

fn run_uplink_loop(uplink: &Arc<Patch>, interactions: &Interactions) {
    loop {
        match uplink.read() {
            Ok(request) => {
                interactions.dispatch_and_report(&RequestEvent::new(request, Arc::clone(uplink)));
            }
            Err(error) if error.is_closed() => {
                debug!(target: SPORE_TARGET, uplink = uplink.name(), "uplink closed");
                break;
            }
            Err(error) => {
                warn!(target: SPORE_TARGET, uplink = uplink.name(), %error, "uplink failed");
                break;
            }
        }
    }
    uplink.close();
}

/// A started node. Dropping the handle closes the uplink.
#[derive(Debug)]
pub struct SporeHandle {
    context: SporeContext,
    worker: Option<JoinHandle<()>>,
}

impl SporeHandle {
    #[must_use]
    pub fn uplink(&self) -> &Arc<Patch> {
        self.context.uplink()
    }

    #[must_use]
    pub fn interactions(&self) -> &Arc<Interactions> {
        self.context.interactions()
    }

    /// Reports whether the uplink loop has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Closes the uplink, which ends the uplink loop.
    pub fn close(&self) {
        self.context.uplink().close();
    }

    /// Waits for the uplink loop to end.
    ///
    /// # Errors
    ///
    /// Returns [`SporeError::ThreadPanic`] if the loop panicked.
    pub fn join(mut self) -> Result<(), SporeError> {
        match self.worker.take() {
            Some(worker) => worker.join().map_err(|_| SporeError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for SporeHandle {
    fn drop(&mut self) {
        self.context.uplink().close();
    }
}
