// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Error types
//!
//! This module defines the error conditions that can occur during actor
//! lifecycle management, message passing and registry operations. Errors are
//! categorized by how they should be handled: precondition violations are
//! caller bugs and abort construction, synchronous operations surface their
//! errors to the caller, and background activities (heartbeats, affinity
//! application, handler failures) log and continue.
//!

use thiserror::Error;

/// Errors raised by the actor runtime.
///
/// # Handling policy
///
/// * `Precondition` aborts construction and is never recovered from inside
///   the runtime. It signals a caller bug such as a duplicate actor name or
///   an out of range CPU id.
/// * `NotFound`, `Offline`, `Registration`, `Timeout` and `Protocol` are
///   surfaced from the synchronous APIs (`fast_send`, registry lookups,
///   `get_actor_by_name`). The caller decides whether to retry.
/// * `Transport` is logged and swallowed inside the heartbeat loop and
///   surfaced from explicit sends.
/// * `Handler` failures are logged by the dispatch loop, which then
///   continues with the next message. They never kill the actor thread.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// A caller bug: null or duplicate actor, or an invalid CPU id.
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// The registry has no entry under the requested name.
    #[error("Actor not found: {0}")]
    NotFound(String),

    /// The actor is registered but its manager has missed heartbeats.
    #[error("Actor offline: {0}")]
    Offline(String),

    /// The registry rejected a registration.
    #[error("Registration failed for '{name}': {reason}")]
    Registration {
        /// Name the registration was attempted under.
        name: String,
        /// Reason reported by the registry.
        reason: String,
    },

    /// No reply arrived within the synchronous send window.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A message could not be serialized or transmitted.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A message handler failed. The dispatch loop logs this and continues.
    #[error("Handler failed: {0}")]
    Handler(String),

    /// A peer replied with a message kind that violates the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A synchronous send was attempted on a reference with no target.
    #[error("No target actor for this reference")]
    NoTarget,

    /// A message could not be delivered to a local mailbox.
    #[error("Send failed: {0}")]
    Send(String),
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::NotFound("pong".to_owned());
        assert_eq!(error.to_string(), "Actor not found: pong");
        let error = Error::Offline("pong".to_owned());
        assert_eq!(error.to_string(), "Actor offline: pong");
        let error = Error::Registration {
            name: "pong".to_owned(),
            reason: "name already registered".to_owned(),
        };
        assert_eq!(
            error.to_string(),
            "Registration failed for 'pong': name already registered"
        );
    }
}
