//! Header-addressed messages exchanged between mesh peers.
//!
//! A [`Request`] is a set of string headers plus an optional JSON body. Only
//! two headers carry meaning for the mesh itself: [`TARGET_HEADER`] names the
//! logical endpoint a message is addressed to and [`REQUEST_HEADER`] selects
//! the handler that processes it. Everything else is passed through untouched
//! for application handlers.
//!
//! Outbound messages are assembled with [`InternalRequest`] and frozen into a
//! [`Request`] when they are sent.

mod builder;
mod request;

pub use self::builder::InternalRequest;
pub use self::request::{Headers, Request};

/// Header naming the endpoint a request is addressed to.
pub const TARGET_HEADER: &str = "target";

/// Header naming the request type used to select a handler.
pub const REQUEST_HEADER: &str = "request";
