// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Core library for the Troupe runtime.
//! Provides the foundational components for building distributed actor
//! based applications: the actor model, message passing, the lifecycle
//! manager and the global naming registry, plus the ZeroMQ transport that
//! connects processes.

pub use troupe_actor::{
    host_registry, kind, Actor, ActorContext, ActorRef, DispatchTable,
    Envelope, Error, GlobalRegistry, Heartbeat, HeartbeatAck, LookupActor,
    LookupResult, Mailbox, Manager, ManagerHandle, Message, MsgKind,
    Placement, RegisterActor, RegistrationFailed, RegistrationOk,
    RegistryClient, RegistryConfig, SchedClass, Shutdown, Start, Timeout,
    UnregisterActor, FAST_SEND_TIMEOUT, HEARTBEAT_INTERVAL,
    OFFLINE_THRESHOLD, REGISTRY_NAME,
};

pub use troupe_actor::wire::{RemoteSender, WireCodec, WireFrame, WireMessage};

pub use troupe_remote::{run_registry, ZmqReceiver, ZmqSender};
