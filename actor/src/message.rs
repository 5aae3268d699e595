// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Messages
//!
//! The `message` module provides the `Message` trait, the numeric kind ids
//! that identify concrete message types across the wire, the standard
//! control messages and the registry protocol messages.
//!
//! Kind ids are part of the external contract: they are fixed per concrete
//! type and must not drift between processes. The range 900-999 is reserved
//! for the registry protocol.
//!

use serde::{Deserialize, Serialize};

use std::any::Any;
use std::time::{SystemTime, UNIX_EPOCH};

/// Numeric tag identifying a concrete message type across the wire.
pub type MsgKind = u16;

/// Kind ids of the standard control messages and the registry protocol.
pub mod kind {
    use super::MsgKind;

    /// Orderly shutdown of a manager and its actors.
    pub const SHUTDOWN: MsgKind = 5;
    /// First message dispatched to every managed actor.
    pub const START: MsgKind = 6;
    /// Periodic tick used by timer driven actors.
    pub const TIMEOUT: MsgKind = 8;

    /// First kind id reserved for the registry protocol.
    pub const REGISTRY_FIRST: MsgKind = 900;
    /// Last kind id reserved for the registry protocol.
    pub const REGISTRY_LAST: MsgKind = 999;

    pub const REGISTER_ACTOR: MsgKind = 900;
    pub const UNREGISTER_ACTOR: MsgKind = 901;
    pub const REGISTRATION_OK: MsgKind = 902;
    pub const REGISTRATION_FAILED: MsgKind = 903;
    pub const LOOKUP_ACTOR: MsgKind = 904;
    pub const LOOKUP_RESULT: MsgKind = 905;
    pub const HEARTBEAT: MsgKind = 906;
    pub const HEARTBEAT_ACK: MsgKind = 907;
}

/// A message that can be delivered to an actor.
///
/// Every concrete message type carries a fixed kind id. Implement this trait
/// with [`define_message!`] for process local messages, or with
/// [`define_wire_message!`](crate::define_wire_message) for messages that
/// may cross the wire.
pub trait Message: Any + Send {
    /// Returns the kind id of this message.
    fn kind(&self) -> MsgKind;

    /// Upcast to [`Any`] for downcasting by reference.
    fn as_any(&self) -> &dyn Any;

    /// Upcast to [`Any`] for downcasting by value.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl dyn Message {
    /// Downcast a boxed message to a concrete type.
    ///
    /// Returns `None` and drops the message if the type does not match.
    pub fn downcast<M: Message>(self: Box<Self>) -> Option<Box<M>> {
        if self.as_any().is::<M>() {
            self.into_any().downcast::<M>().ok()
        } else {
            None
        }
    }

    /// Downcast a message reference to a concrete type.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.as_any().downcast_ref::<M>()
    }
}

impl<M: Message + 'static> From<M> for Box<dyn Message> {
    fn from(msg: M) -> Self {
        Box::new(msg)
    }
}

/// Implements [`Message`] for a concrete type with a fixed kind id.
#[macro_export]
macro_rules! define_message {
    ($ty:ty, $kind:expr) => {
        impl $crate::Message for $ty {
            fn kind(&self) -> $crate::MsgKind {
                $kind
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn into_any(
                self: ::std::boxed::Box<Self>,
            ) -> ::std::boxed::Box<dyn ::std::any::Any> {
                self
            }
        }
    };
}

/// Implements [`Message`] and [`WireMessage`](crate::wire::WireMessage) for
/// a serializable type, so it can be encoded into remote frames.
#[macro_export]
macro_rules! define_wire_message {
    ($ty:ty, $kind:expr) => {
        $crate::define_message!($ty, $kind);

        impl $crate::wire::WireMessage for $ty {
            const KIND: $crate::MsgKind = $kind;
        }
    };
}

// ── Control messages ────────────────────────────────────────────────────

/// Start - first message dispatched to every managed actor.
///
/// The manager pushes `Start` onto each mailbox before spawning the actor
/// threads, so it is guaranteed to be the first message handled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Start;
define_wire_message!(Start, kind::START);

/// Shutdown - orderly shutdown request.
///
/// Delivered to a manager, it terminates every managed actor and returns
/// control from the manager loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Shutdown;
define_wire_message!(Shutdown, kind::SHUTDOWN);

/// Timeout - periodic tick.
///
/// The `data` field discriminates between timers when one actor owns more
/// than one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeout {
    pub data: u64,
}
define_wire_message!(Timeout, kind::TIMEOUT);

// ── Registry protocol ───────────────────────────────────────────────────

/// RegisterActor - a manager registers an actor with the registry.
///
/// Sent during `Manager::manage` to publish the actor name to endpoint
/// mapping. The registry replies with [`RegistrationOk`] or
/// [`RegistrationFailed`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterActor {
    pub manager_id: String,
    pub actor_name: String,
    /// Endpoint where the actor can be reached.
    pub endpoint: String,
}
define_wire_message!(RegisterActor, kind::REGISTER_ACTOR);

/// UnregisterActor - remove an actor from the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterActor {
    pub actor_name: String,
}
define_wire_message!(UnregisterActor, kind::UNREGISTER_ACTOR);

/// RegistrationOk - confirms a successful registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationOk {
    pub actor_name: String,
}
define_wire_message!(RegistrationOk, kind::REGISTRATION_OK);

/// RegistrationFailed - the registration was rejected.
///
/// The usual reason is that the name is already registered by a live
/// manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationFailed {
    pub actor_name: String,
    pub reason: String,
}
define_wire_message!(RegistrationFailed, kind::REGISTRATION_FAILED);

/// LookupActor - request the endpoint of a named actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupActor {
    pub actor_name: String,
}
define_wire_message!(LookupActor, kind::LOOKUP_ACTOR);

/// LookupResult - response to [`LookupActor`].
///
/// If `endpoint` is `None` the actor is not registered. If `online` is
/// false the owning manager has missed heartbeats; the entry is kept but
/// flagged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupResult {
    pub actor_name: String,
    pub endpoint: Option<String>,
    pub online: bool,
}
define_wire_message!(LookupResult, kind::LOOKUP_RESULT);

/// Heartbeat - periodic liveness report from a manager.
///
/// Managers send this every [`HEARTBEAT_INTERVAL`](crate::HEARTBEAT_INTERVAL).
/// The registry marks a manager offline once
/// [`OFFLINE_THRESHOLD`](crate::OFFLINE_THRESHOLD) passes without one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub manager_id: String,
    pub timestamp_ms: u64,
}
define_wire_message!(Heartbeat, kind::HEARTBEAT);

impl Heartbeat {
    /// Creates a heartbeat stamped with the current wall clock.
    pub fn new(manager_id: &str) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Heartbeat {
            manager_id: manager_id.to_owned(),
            timestamp_ms,
        }
    }
}

/// HeartbeatAck - acknowledgement of a heartbeat. Optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatAck;
define_wire_message!(HeartbeatAck, kind::HEARTBEAT_ACK);
