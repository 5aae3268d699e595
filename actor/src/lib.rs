// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Distributed actor runtime
//!
//! This crate provides the core of a distributed actor runtime: long lived
//! actors with one OS thread each, location transparent references, a
//! lifecycle manager with CPU pinning and real time scheduling, and the
//! global naming registry that lets actors find each other across
//! processes.
//!
//! Actors communicate exclusively by asynchronous messages. The only
//! blocking primitive offered to handlers is `fast_send`, a synchronous
//! request and reply over the same transport as the asynchronous path.
//! Local delivery is reliable and FIFO per target; network delivery is
//! best effort, at most once per send.
//!

mod actor;
mod envelope;
mod error;
mod mailbox;
mod manager;
mod message;
mod reference;
mod registry;
mod registry_server;
mod runner;
pub mod wire;

pub use actor::{Actor, ActorCell, ActorContext, DispatchTable};
pub use envelope::{Envelope, ReplySlot};
pub use error::Error;
pub use mailbox::{Mailbox, DEFAULT_CAPACITY};
pub use manager::{Manager, ManagerHandle};
pub use message::{
    kind, Heartbeat, HeartbeatAck, LookupActor, LookupResult, Message,
    MsgKind, RegisterActor, RegistrationFailed, RegistrationOk, Shutdown,
    Start, Timeout, UnregisterActor,
};
pub use reference::{ActorRef, LocalRef, RemoteRef};
pub use registry::RegistryClient;
pub use registry_server::{
    host_registry, GlobalRegistry, RegistryConfig, REGISTRY_NAME,
};
pub use runner::{Placement, SchedClass};

use std::time::Duration;

/// Interval at which a manager reports liveness to the registry.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

/// A manager is marked offline once this much time passes without a
/// heartbeat. Three missed heartbeats.
pub const OFFLINE_THRESHOLD: Duration = Duration::from_secs(6);

/// Longest a `fast_send` waits for its reply.
pub const FAST_SEND_TIMEOUT: Duration = Duration::from_secs(3);
