//! A lightweight messaging mesh for cooperating service nodes.
//!
//! Nodes exchange header-addressed [`Request`](message::Request) values over
//! framed socket connections called [patches](patch::Patch). A coordinating
//! [`NetworkServer`](network::NetworkServer) accepts node connections and runs
//! one blocking read loop per connection, forwarding requests between peers by
//! their `target` header or dispatching them to its own handler registry.
//!
//! Each node is driven by a [`SporeNode`](spore::SporeNode): it dials an
//! uplink to the server, announces its profile, and fires ordered lifecycle
//! hooks in which application code registers
//! [interactions](interactions::Interactions) and sends its first requests.
//!
//! Handlers are selected by the `request` header. Every inbound request gets
//! a fresh handler instance spawned from the registered prototype, so no state
//! leaks between concurrent invocations.
//!
//! Configuration is read through [`mycelium_config::Config`] and structured
//! logs are installed with [`telemetry::initialise`].

pub mod interactions;
pub mod message;
pub mod network;
pub mod patch;
pub mod spore;
pub mod telemetry;
mod threads;

#[cfg(test)]
mod tests;
