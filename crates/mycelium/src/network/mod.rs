//! Server side of the mesh.
//!
//! A [`NetworkServer`] accepts node connections from a listening socket (bound
//! by the server or adopted from the caller) and services attached patches.
//! Every managed connection gets its own thread running a blocking
//! read-route loop, so one slow or failing peer never stalls another.
//!
//! Requests are forwarded between managed connections by `target`, with a
//! return crumb so replies find their way back, or dispatched to the server's
//! embedded [`Interactions`](crate::interactions::Interactions).

mod errors;
mod listener;
mod router;
mod server;
mod state;
#[cfg(test)]
mod tests;

pub use self::errors::{ListenerError, ServerError};
pub use self::listener::SocketListener;
pub use self::server::{NetworkServer, ServerHandle};

/// Request type a node sends right after dialing to announce its service.
pub const REGISTER_REQUEST: &str = "mycelium.register";

/// Registration header carrying the node's service name.
pub const SERVICE_HEADER: &str = "service";

/// Registration header carrying the node's version string.
pub const VERSION_HEADER: &str = "version";

/// Optional registration header carrying the node's protocol version.
pub const PROTOCOL_HEADER: &str = "protocol";

/// Prefix of the header a server writes onto forwarded requests.
pub const CRUMB_PREFIX: &str = "crumb.";

pub(crate) const NETWORK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::network");
