// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor
//!
//! The `actor` module provides the `Actor` trait, the kind indexed dispatch
//! table and the `ActorContext` passed to message handlers. An actor is a
//! single threaded entity: it owns a mailbox, and every message it receives
//! is dispatched serially by its own thread.
//!

use crate::{
    envelope::{Envelope, ReplySlot},
    error::Error,
    mailbox::{Mailbox, DEFAULT_CAPACITY},
    manager::ManagerHandle,
    message::{Message, MsgKind},
    reference::ActorRef,
    runner::Placement,
};

use tracing::warn;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// The `Actor` trait is the main trait that actors must implement.
///
/// An actor declares its name, registers typed handlers for the message
/// kinds it understands and optionally overrides the fallback
/// [`Actor::process_message`] and the [`Actor::end`] shutdown hook.
pub trait Actor: Send + Sized + 'static {
    /// Name of this actor, unique within its manager.
    fn name(&self) -> &str;

    /// Ring capacity of this actor's mailbox.
    fn mailbox_capacity(&self) -> usize {
        DEFAULT_CAPACITY
    }

    /// Registers the typed handlers of this actor into its dispatch table.
    fn register_handlers(&self, _table: &mut DispatchTable<Self>) {}

    /// Fallback for message kinds with no registered handler.
    ///
    /// The default drops the message with a logged warning. Override to
    /// handle unknown kinds.
    fn process_message(
        &mut self,
        envelope: Envelope,
        _ctx: &mut ActorContext<'_>,
    ) -> Result<(), Error> {
        warn!(
            "Actor '{}' dropped message of unhandled kind {}.",
            self.name(),
            envelope.kind()
        );
        Ok(())
    }

    /// Hook invoked once during shutdown, on the actor's own thread, after
    /// the dispatch loop has exited and before the manager joins it.
    fn end(&mut self) {}
}

type BoxedHandler<A> = Box<
    dyn Fn(&mut A, Envelope, &mut ActorContext<'_>) -> Result<(), Error>
        + Send,
>;

/// Dispatch table mapping message kind ids to typed handlers.
///
/// Lookup is O(1). Kinds without an entry fall through to
/// [`Actor::process_message`].
pub struct DispatchTable<A> {
    handlers: HashMap<MsgKind, BoxedHandler<A>>,
}

impl<A: Actor> Default for DispatchTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Actor> DispatchTable<A> {
    /// Creates an empty table.
    pub fn new() -> Self {
        DispatchTable {
            handlers: HashMap::new(),
        }
    }

    /// Associates a message kind with a typed handler function.
    ///
    /// The handler receives the actor, the message downcast to its concrete
    /// type and the dispatch context. Registering the same kind twice
    /// replaces the previous handler.
    pub fn on<M: Message>(
        &mut self,
        kind: MsgKind,
        handler: fn(&mut A, M, &mut ActorContext<'_>) -> Result<(), Error>,
    ) {
        self.handlers.insert(
            kind,
            Box::new(move |actor, envelope, ctx| {
                match envelope.into_message().downcast::<M>() {
                    Some(msg) => handler(actor, *msg, ctx),
                    None => Err(Error::Protocol(format!(
                        "message of kind {kind} does not match its registered type"
                    ))),
                }
            }),
        );
    }

    pub(crate) fn get(&self, kind: MsgKind) -> Option<&BoxedHandler<A>> {
        self.handlers.get(&kind)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Context passed to message handlers.
///
/// It carries the metadata of the message being dispatched (sender, fast
/// flag, `last` flag) and gives handlers access to their own reference, the
/// reply channel and the owning manager.
pub struct ActorContext<'a> {
    cell: &'a Arc<ActorCell>,
    manager: &'a ManagerHandle,
    sender: ActorRef,
    is_fast: bool,
    last: bool,
    reply: Option<Arc<ReplySlot>>,
}

impl<'a> ActorContext<'a> {
    pub(crate) fn new(
        cell: &'a Arc<ActorCell>,
        manager: &'a ManagerHandle,
        envelope: &Envelope,
    ) -> Self {
        ActorContext {
            cell,
            manager,
            sender: envelope.sender().clone(),
            is_fast: envelope.is_fast(),
            last: envelope.last(),
            reply: envelope.reply_slot(),
        }
    }

    /// Reference to the sender of the current message. May be null.
    pub fn sender(&self) -> &ActorRef {
        &self.sender
    }

    /// True if the current message is part of a synchronous round trip.
    pub fn is_fast(&self) -> bool {
        self.is_fast
    }

    /// True if the mailbox became empty when the current message was
    /// dequeued. Handlers use this to flush batched work.
    pub fn last(&self) -> bool {
        self.last
    }

    /// Reference to the actor itself.
    pub fn self_ref(&self) -> ActorRef {
        ActorRef::local(self.cell)
    }

    /// Handle to the owning manager, for name resolution.
    pub fn manager(&self) -> &ManagerHandle {
        self.manager
    }

    /// Sends a reply to the current message.
    ///
    /// For a fast message the reply is delivered through the per call reply
    /// slot, waking the blocked caller. Otherwise it is an ordinary
    /// asynchronous send to the message's sender; with a null sender the
    /// reply is dropped.
    pub fn reply(&self, msg: impl Into<Box<dyn Message>>) {
        if self.is_fast {
            if let Some(slot) = &self.reply {
                slot.fill(msg.into());
                return;
            }
        }
        self.sender.send(msg, self.self_ref());
    }

    /// Requests cooperative termination of this actor. The dispatch loop
    /// exits at the next iteration boundary; the in-flight handler runs to
    /// completion.
    pub fn terminate(&self) {
        self.cell.terminate();
    }
}

/// Shared runtime state of a managed actor.
///
/// The cell is what actor references point at: it owns the mailbox, the
/// liveness flags and the per actor counters. It never outlives its
/// manager, which joins the actor thread before dropping it.
pub struct ActorCell {
    name: String,
    mailbox: Mailbox,
    terminated: AtomicBool,
    msg_cnt: AtomicU64,
    tid: AtomicI64,
    placement: Placement,
}

impl ActorCell {
    pub(crate) fn new(
        name: &str,
        capacity: usize,
        placement: Placement,
    ) -> Arc<Self> {
        Arc::new(ActorCell {
            name: name.to_owned(),
            mailbox: Mailbox::with_capacity(capacity),
            terminated: AtomicBool::new(false),
            msg_cnt: AtomicU64::new(0),
            tid: AtomicI64::new(0),
            placement,
        })
    }

    /// Name of the actor this cell belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of messages waiting in the mailbox.
    pub fn queue_length(&self) -> usize {
        self.mailbox.len()
    }

    /// Cumulative count of dispatched messages.
    pub fn message_count(&self) -> u64 {
        self.msg_cnt.load(Ordering::Relaxed)
    }

    /// OS thread id observed by the dispatch loop, 0 before the first
    /// iteration.
    pub fn thread_id(&self) -> i64 {
        self.tid.load(Ordering::Relaxed)
    }

    /// True once termination has been requested.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub(crate) fn count_message(&self) {
        self.msg_cnt.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_thread_id(&self, tid: i64) {
        self.tid.store(tid, Ordering::Relaxed);
    }

    pub(crate) fn placement(&self) -> &Placement {
        &self.placement
    }
}
