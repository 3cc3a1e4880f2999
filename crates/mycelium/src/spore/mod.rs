//! Node lifecycle.
//!
//! A node ("spore") is described by a type implementing [`Spore`]: it hands
//! out its [`SporeProfile`] and binds methods to named [`Hook`]s. A
//! [`SporeNode`] dials the uplink, announces the profile, then fires
//! [`HOOK_UPLINK`] and [`HOOK_SERVICE_AVAILABLE`] exactly once each, in that
//! order. Hook methods receive a [`SporeContext`] giving them the live uplink
//! and the node's handler registry, which is where they register start points.
//!
//! ```no_run
//! use mycelium::interactions::HandlerError;
//! use mycelium::message::InternalRequest;
//! use mycelium::spore::{HOOK_UPLINK, Hooks, Spore, SporeContext, SporeNode, SporeProfile};
//! use mycelium_config::SocketEndpoint;
//!
//! struct Echo {
//!     profile: SporeProfile,
//! }
//!
//! impl Echo {
//!     fn uplink_ready(&self, context: &SporeContext) -> Result<(), HandlerError> {
//!         context
//!             .interactions()
//!             .register_fn("Ping", |event| Ok(event.respond(event.request().clone())?));
//!         context.uplink().send(
//!             InternalRequest::new()
//!                 .with_target("Endpoint")
//!                 .with_request("Hello"),
//!         )?;
//!         Ok(())
//!     }
//! }
//!
//! impl Spore for Echo {
//!     fn profile(&self) -> &SporeProfile {
//!         &self.profile
//!     }
//!
//!     fn hooks(hooks: &mut Hooks<Self>) {
//!         hooks.on(HOOK_UPLINK, Self::uplink_ready);
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let node = SporeNode::new(Echo {
//!     profile: SporeProfile::new("Echo", "1.0"),
//! });
//! let handle = node.start(&SocketEndpoint::tcp("127.0.0.1", 25605))?;
//! handle.join()?;
//! # Ok(())
//! # }
//! ```

mod context;
mod errors;
mod hook;
mod lifecycle;
mod node;
mod profile;
mod reporter;

pub use self::context::SporeContext;
pub use self::errors::SporeError;
pub use self::hook::{HOOK_SERVICE_AVAILABLE, HOOK_UPLINK, Hook, HookFn, Hooks};
pub use self::lifecycle::LifecycleState;
pub use self::node::{SporeHandle, SporeNode};
pub use self::profile::SporeProfile;
pub use self::reporter::{LifecycleReporter, StructuredLifecycleReporter};

pub(crate) const SPORE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::spore");

/// A node type: its profile plus the hook methods it declares.
pub trait Spore: Sized {
    fn profile(&self) -> &SporeProfile;

    /// Declares hook bindings, in the order they should fire.
    fn hooks(hooks: &mut Hooks<Self>);
}
