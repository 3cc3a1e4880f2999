//! Framed connections between mesh peers.
//!
//! A [`Patch`] owns one socket for its whole life and carries
//! [`Request`](crate::message::Request) values across it, one JSON document
//! per line. Sockets do not preserve message boundaries, so every frame is
//! terminated explicitly and the reader buffers partial frames until the
//! delimiter arrives.

mod connection;
mod errors;
mod frame;
mod stream;

pub use self::connection::Patch;
pub use self::errors::PatchError;
pub use self::stream::ConnectionStream;

pub(crate) const PATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::patch");
