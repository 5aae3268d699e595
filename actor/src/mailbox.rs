// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Mailbox
//!
//! The `mailbox` module provides the bounded FIFO backing every actor.
//! Multiple producers push concurrently, a single consumer (the actor's own
//! thread) pops. `push` never blocks and never fails: when the bounded ring
//! is full, envelopes spill into an unbounded overflow buffer so senders
//! are never stalled. Backpressure is a policy concern surfaced through
//! [`Mailbox::len`], not enforced at `push`.
//!

use crate::{envelope::Envelope, message::MsgKind};

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Default ring capacity for a mailbox.
pub const DEFAULT_CAPACITY: usize = 1024;

struct Queues {
    ring: VecDeque<Envelope>,
    overflow: VecDeque<Envelope>,
}

impl Queues {
    fn len(&self) -> usize {
        self.ring.len() + self.overflow.len()
    }
}

/// Bounded multi-producer single-consumer FIFO with overflow.
///
/// Ordering is strict FIFO across all producers: messages are dispatched in
/// the order their `push` completed. On dequeue, the returned `last` flag is
/// true iff the queue became empty as a consequence of that pop; handlers
/// use it to trigger end of batch work without extra coordination.
pub struct Mailbox {
    queues: Mutex<Queues>,
    available: Condvar,
    capacity: usize,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl Mailbox {
    /// Creates a mailbox whose ring holds `capacity` envelopes before
    /// spilling into the overflow buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Mailbox {
            queues: Mutex::new(Queues {
                ring: VecDeque::with_capacity(capacity),
                overflow: VecDeque::new(),
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    /// Enqueues an envelope. Never blocks, never fails.
    pub fn push(&self, envelope: Envelope) {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        if queues.overflow.is_empty() && queues.ring.len() < self.capacity {
            queues.ring.push_back(envelope);
        } else {
            queues.overflow.push_back(envelope);
        }
        self.available.notify_one();
    }

    /// Enqueues an envelope at the head of the queue.
    ///
    /// Used by the manager so `Start` is the first message dispatched even
    /// when other producers raced ahead of `init`.
    pub(crate) fn push_front(&self, envelope: Envelope) {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.ring.push_front(envelope);
        self.available.notify_one();
    }

    /// Blocks until an envelope is available and dequeues it.
    ///
    /// Returns the envelope with its `last` flag set.
    pub fn pop(&self) -> Envelope {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(envelope) = Self::take(&mut queues, self.capacity) {
                return envelope;
            }
            queues = self
                .available
                .wait(queues)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Dequeues an envelope, waiting at most `timeout`.
    ///
    /// Returns `None` if the timeout expires with the mailbox empty. The
    /// dispatch loop uses the timeout to observe its termination flag
    /// between waits.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Envelope> {
        let deadline = Instant::now() + timeout;
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(envelope) = Self::take(&mut queues, self.capacity) {
                return Some(envelope);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            let (guard, result) = self
                .available
                .wait_timeout(queues, remaining)
                .unwrap_or_else(|e| e.into_inner());
            queues = guard;
            if result.timed_out() && queues.len() == 0 {
                return None;
            }
        }
    }

    fn take(queues: &mut Queues, capacity: usize) -> Option<Envelope> {
        let mut envelope = queues.ring.pop_front()?;
        // Refill the ring from the overflow buffer, preserving FIFO order.
        while queues.ring.len() < capacity {
            match queues.overflow.pop_front() {
                Some(spilled) => queues.ring.push_back(spilled),
                None => break,
            }
        }
        envelope.set_last(queues.len() == 0);
        Some(envelope)
    }

    /// Kind id of the envelope at the head of the queue, if any.
    pub fn peek_kind(&self) -> Option<MsgKind> {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.ring.front().map(Envelope::kind)
    }

    /// Number of pending envelopes, overflow included.
    pub fn len(&self) -> usize {
        let queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        queues.len()
    }

    /// True if no envelope is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::message::{kind, Start, Timeout};
    use crate::reference::ActorRef;

    use std::thread;

    fn envelope(data: u64) -> Envelope {
        Envelope::new(Box::new(Timeout { data }), ActorRef::Null)
    }

    fn data_of(envelope: &Envelope) -> u64 {
        envelope
            .message()
            .downcast_ref::<Timeout>()
            .map(|t| t.data)
            .unwrap_or(u64::MAX)
    }

    #[test]
    fn test_push_pop_in_order() {
        let mailbox = Mailbox::with_capacity(16);
        mailbox.push(envelope(1));
        mailbox.push(envelope(2));

        let first = mailbox.pop();
        assert_eq!(data_of(&first), 1);
        assert!(!first.last());

        let second = mailbox.pop();
        assert_eq!(data_of(&second), 2);
        assert!(second.last());
    }

    #[test]
    fn test_last_flag_tracks_emptiness() {
        let mailbox = Mailbox::with_capacity(16);
        for i in 0..3 {
            mailbox.push(envelope(i));
        }
        for i in 0..3 {
            let env = mailbox.pop();
            assert_eq!(data_of(&env), i);
            // Last is true exactly when the queue just became empty.
            assert_eq!(env.last(), i == 2);
        }
    }

    #[test]
    fn test_overflow_preserves_order() {
        let mailbox = Mailbox::with_capacity(4);
        for i in 0..10 {
            mailbox.push(envelope(i));
        }
        assert_eq!(mailbox.len(), 10);
        for i in 0..10 {
            assert_eq!(data_of(&mailbox.pop()), i);
        }
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_peek_is_non_destructive() {
        let mailbox = Mailbox::default();
        mailbox.push(Envelope::new(Box::new(Start), ActorRef::Null));
        assert_eq!(mailbox.peek_kind(), Some(kind::START));
        assert_eq!(mailbox.len(), 1);
    }

    #[test]
    fn test_pop_timeout_empty() {
        let mailbox = Mailbox::default();
        assert!(mailbox.pop_timeout(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn test_push_front_jumps_queue() {
        let mailbox = Mailbox::default();
        mailbox.push(envelope(1));
        mailbox.push_front(Envelope::new(Box::new(Start), ActorRef::Null));
        assert_eq!(mailbox.pop().kind(), kind::START);
        assert_eq!(data_of(&mailbox.pop()), 1);
    }

    #[test]
    fn test_concurrent_producers_single_consumer() {
        let mailbox = std::sync::Arc::new(Mailbox::with_capacity(8));
        let count = 100u64;

        let producer = {
            let mailbox = mailbox.clone();
            thread::spawn(move || {
                for i in 0..count {
                    mailbox.push(envelope(i));
                }
            })
        };

        let mut received = 0u64;
        while received < count {
            let env = mailbox.pop();
            // FIFO per producer thread.
            assert_eq!(data_of(&env), received);
            received += 1;
        }
        producer.join().unwrap();
    }
}
