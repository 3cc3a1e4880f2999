//! Request-type routing to handler prototypes.
//!
//! Applications register an [`Interaction`] prototype under a request-type
//! string. When a request with that type arrives, the registry spawns a fresh
//! instance from the prototype and calls the method the interaction bound to
//! the type, passing a [`RequestEvent`] that carries the request and the
//! connection it arrived on.

mod binding;
mod errors;
mod event;
mod registry;

pub use self::binding::{Bindings, HandlerFn, Interaction};
pub use self::errors::{DispatchError, HandlerError, InteractionError};
pub use self::event::RequestEvent;
pub use self::registry::Interactions;
pub(crate) use self::registry::report;

pub(crate) const INTERACTIONS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::interactions");
