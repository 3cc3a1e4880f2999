//! Concurrent request-type registry.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error, warn};

use super::binding::{Bindings, HandlerFn, Interaction};
use super::{DispatchError, HandlerError, INTERACTIONS_TARGET, InteractionError, RequestEvent};

/// Type-erased entry point stored for one request type.
trait StartPoint: Send + Sync {
    fn interaction(&self) -> &'static str;

    fn invoke(&self, event: &RequestEvent) -> Result<(), HandlerError>;
}

struct Prototype<I> {
    prototype: I,
    handler: HandlerFn<I>,
}

impl<I: Interaction> StartPoint for Prototype<I> {
    fn interaction(&self) -> &'static str {
        std::any::type_name::<I>()
    }

    fn invoke(&self, event: &RequestEvent) -> Result<(), HandlerError> {
        let mut instance = self.prototype.spawn();
        (self.handler)(&mut instance, event)
    }
}

struct FnStartPoint<F>(F);

impl<F> StartPoint for FnStartPoint<F>
where
    F: Fn(&RequestEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn interaction(&self) -> &'static str {
        std::any::type_name::<F>()
    }

    fn invoke(&self, event: &RequestEvent) -> Result<(), HandlerError> {
        (self.0)(event)
    }
}

/// Maps request types to handler prototypes.
///
/// Registration and dispatch may race freely: lookups clone the entry under a
/// read lock and invoke it after the lock is released, so a slow handler never
/// blocks registration and a reader never sees a half-updated table.
#[derive(Default)]
pub struct Interactions {
    start_points: RwLock<HashMap<String, Arc<dyn StartPoint>>>,
}

impl std::fmt::Debug for Interactions {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Interactions")
            .field("request_types", &self.request_types())
            .finish()
    }
}

impl Interactions {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `prototype` as the start point for `request_type`.
    ///
    /// A later registration for the same key replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`InteractionError::DuplicateHandlerBinding`] when the
    /// interaction binds any request type twice, and
    /// [`InteractionError::UnboundRequestType`] when it binds nothing to
    /// `request_type`.
    pub fn register_start_point<I: Interaction>(
        &self,
        request_type: impl Into<String>,
        prototype: I,
    ) -> Result<(), InteractionError> {
        let request_type = request_type.into();
        let handler = Bindings::<I>::resolve(&request_type)?;
        self.insert(request_type, Arc::new(Prototype { prototype, handler }));
        Ok(())
    }

    /// Registers a stateless closure as the start point for `request_type`.
    pub fn register_fn<F>(&self, request_type: impl Into<String>, handler: F)
    where
        F: Fn(&RequestEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.insert(request_type.into(), Arc::new(FnStartPoint(handler)));
    }

    /// Reports whether a start point exists for `request_type`.
    #[must_use]
    pub fn is_registered(&self, request_type: &str) -> bool {
        self.read().contains_key(request_type)
    }

    /// Registered request types in sorted order.
    #[must_use]
    pub fn request_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// Routes `event` to the start point for its request type.
    ///
    /// A panicking handler is contained and reported as
    /// [`DispatchError::HandlerPanicked`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnroutableRequest`] or
    /// [`DispatchError::MissingRequestType`] when nothing can take the event,
    /// and the handler's own failure otherwise.
    pub fn dispatch(&self, event: &RequestEvent) -> Result<(), DispatchError> {
        let request_type = event
            .request()
            .request_type()
            .ok_or(DispatchError::MissingRequestType)?;
        let start_point = self
            .read()
            .get(request_type)
            .cloned()
            .ok_or_else(|| DispatchError::unroutable(request_type))?;

        debug!(
            target: INTERACTIONS_TARGET,
            request_type,
            interaction = start_point.interaction(),
            "dispatching request"
        );

        match catch_unwind(AssertUnwindSafe(|| start_point.invoke(event))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(DispatchError::Handler {
                request_type: request_type.to_string(),
                source,
            }),
            Err(_) => Err(DispatchError::HandlerPanicked {
                request_type: request_type.to_string(),
            }),
        }
    }

    /// Dispatches `event` and logs any failure instead of returning it.
    ///
    /// Read loops use this so one bad message never ends the loop.
    pub fn dispatch_and_report(&self, event: &RequestEvent) {
        if let Err(failure) = self.dispatch(event) {
            report(&failure, event);
        }
    }

    fn insert(&self, request_type: String, start_point: Arc<dyn StartPoint>) {
        debug!(
            target: INTERACTIONS_TARGET,
            request_type = %request_type,
            interaction = start_point.interaction(),
            "registered start point"
        );
        self.start_points
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_type, start_point);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<dyn StartPoint>>> {
        self.start_points
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) fn report(failure: &DispatchError, event: &RequestEvent) {
    let origin = event.origin().map_or("detached", |patch| patch.name());
    match failure {
        DispatchError::HandlerPanicked { .. } => {
            error!(target: INTERACTIONS_TARGET, origin, error = %failure, "handler panicked");
        }
        failure if failure.is_unroutable() => {
            warn!(
                target: INTERACTIONS_TARGET,
                origin,
                target_endpoint = event.request().target().unwrap_or_default(),
                error = %failure,
                "unroutable request dropped"
            );
        }
        _ => {
            warn!(target: INTERACTIONS_TARGET, origin, error = %failure, "handler failed");
        }
    }
}
