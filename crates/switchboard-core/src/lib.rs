#![deny(missing_docs)]
//! Switchboard core library.
//!
//! Transport-agnostic relay logic: the per-user session state machine, the
//! reply routing table, and the relay decision engine that ties them to an
//! injected transport collaborator.

/// Relay decision engine and the outbound transport contract.
pub mod relay;
/// Reply-based message routing table.
pub mod routing;
/// Per-user session registry and state machine.
pub mod session;

#[cfg(test)]
pub mod testing;
