// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Envelope
//!
//! The `envelope` module provides the in-flight form of a message: the
//! payload together with its sender reference, the fast flag of the
//! synchronous round trip, the `last` flag stamped at dequeue time and,
//! for fast messages, the one-shot reply slot that carries the response
//! back to the blocked caller.
//!

use crate::{message::MsgKind, reference::ActorRef, Message};

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// A message in flight, together with its delivery metadata.
///
/// Ownership transfers to the transport when an envelope is sent, and the
/// payload is released exactly once: either consumed by the handler or
/// dropped on a failed delivery path. Rust move semantics enforce this
/// contract.
pub struct Envelope {
    msg: Box<dyn Message>,
    sender: ActorRef,
    is_fast: bool,
    last: bool,
    reply: Option<Arc<ReplySlot>>,
}

impl Envelope {
    /// Wraps a message for asynchronous delivery.
    pub fn new(msg: Box<dyn Message>, sender: ActorRef) -> Self {
        Envelope {
            msg,
            sender,
            is_fast: false,
            last: false,
            reply: None,
        }
    }

    /// Wraps a message for a synchronous round trip with a reply slot.
    pub fn fast(
        msg: Box<dyn Message>,
        sender: ActorRef,
        reply: Arc<ReplySlot>,
    ) -> Self {
        Envelope {
            msg,
            sender,
            is_fast: true,
            last: false,
            reply: Some(reply),
        }
    }

    /// Kind id of the wrapped message.
    pub fn kind(&self) -> MsgKind {
        self.msg.kind()
    }

    /// Reference to the sending actor. May be null.
    pub fn sender(&self) -> &ActorRef {
        &self.sender
    }

    /// True if this message is part of a synchronous round trip.
    pub fn is_fast(&self) -> bool {
        self.is_fast
    }

    /// True if the mailbox became empty when this message was dequeued.
    pub fn last(&self) -> bool {
        self.last
    }

    pub(crate) fn set_last(&mut self, last: bool) {
        self.last = last;
    }

    pub(crate) fn reply_slot(&self) -> Option<Arc<ReplySlot>> {
        self.reply.clone()
    }

    /// Consumes the envelope, returning the wrapped message.
    pub fn into_message(self) -> Box<dyn Message> {
        self.msg
    }

    /// Borrow the wrapped message.
    pub fn message(&self) -> &dyn Message {
        self.msg.as_ref()
    }
}

/// One-shot synchronization slot for the `fast_send` reply.
///
/// Exactly one thread deposits a value with [`ReplySlot::fill`] and exactly
/// one thread blocks in [`ReplySlot::wait_timeout`]. The per-call slot is
/// what keeps replies matched to their requests: a reply can never be
/// confused with an unrelated asynchronous message.
#[derive(Default)]
pub struct ReplySlot {
    value: Mutex<Option<Box<dyn Message>>>,
    ready: Condvar,
}

impl ReplySlot {
    /// Creates an empty slot.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deposits the reply and wakes the waiter.
    ///
    /// A second fill overwrites the first; the contract is one reply per
    /// round trip.
    pub fn fill(&self, msg: Box<dyn Message>) {
        let mut value = self.value.lock().unwrap_or_else(|e| e.into_inner());
        *value = Some(msg);
        self.ready.notify_one();
    }

    /// Blocks until a reply is deposited or the timeout expires.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Box<dyn Message>> {
        let deadline = Instant::now() + timeout;
        let mut value = self.value.lock().unwrap_or_else(|e| e.into_inner());
        while value.is_none() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, result) = self
                .ready
                .wait_timeout(value, remaining)
                .unwrap_or_else(|e| e.into_inner());
            value = guard;
            if result.timed_out() && value.is_none() {
                return None;
            }
        }
        value.take()
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::message::Start;

    use std::thread;

    #[test]
    fn test_reply_slot_round_trip() {
        let slot = ReplySlot::new();
        let filler = slot.clone();
        let handle = thread::spawn(move || {
            filler.fill(Box::new(Start));
        });
        let reply = slot.wait_timeout(Duration::from_secs(1));
        assert!(reply.is_some());
        assert_eq!(reply.unwrap().kind(), crate::message::kind::START);
        handle.join().unwrap();
    }

    #[test]
    fn test_reply_slot_timeout() {
        let slot = ReplySlot::new();
        let reply = slot.wait_timeout(Duration::from_millis(20));
        assert!(reply.is_none());
    }
}
