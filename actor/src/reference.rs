// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor references
//!
//! The `reference` module provides `ActorRef`, the location transparent
//! handle used to send messages to an actor. A reference is null, local or
//! remote; `send` and `fast_send` behave uniformly across the three.
//!
//! A reference never extends the lifetime of its target. Local references
//! hold a weak pointer to the actor's cell: once the actor is gone, sends
//! are dropped and synchronous sends fail. Remote references stay usable
//! regardless of the peer's state; operations simply fail or time out.
//!

use crate::{
    actor::ActorCell,
    envelope::{Envelope, ReplySlot},
    error::Error,
    message::Message,
    wire::{RemoteSender, WireCodec, WireFrame},
    FAST_SEND_TIMEOUT,
};

use tracing::{debug, error};

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Location transparent handle to an actor.
#[derive(Clone, Default)]
pub enum ActorRef {
    /// Refers to no actor. `send` drops the message, `fast_send` fails.
    #[default]
    Null,
    /// Non owning reference to an actor in this process.
    Local(LocalRef),
    /// Reference to an actor behind a transport endpoint.
    Remote(RemoteRef),
}

/// Non owning reference to a local actor.
#[derive(Clone)]
pub struct LocalRef {
    name: String,
    cell: Weak<ActorCell>,
}

/// Reference to a remote actor: a name, an endpoint and the transport that
/// reaches it.
#[derive(Clone)]
pub struct RemoteRef {
    name: String,
    endpoint: String,
    sender: Arc<dyn RemoteSender>,
}

impl RemoteRef {
    /// Endpoint this reference transmits to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ActorRef {
    /// Creates a local reference to an actor cell.
    pub(crate) fn local(cell: &Arc<ActorCell>) -> Self {
        ActorRef::Local(LocalRef {
            name: cell.name().to_owned(),
            cell: Arc::downgrade(cell),
        })
    }

    /// Creates a remote reference from a name, an endpoint and a transport.
    pub fn remote(
        name: &str,
        endpoint: &str,
        sender: Arc<dyn RemoteSender>,
    ) -> Self {
        ActorRef::Remote(RemoteRef {
            name: name.to_owned(),
            endpoint: endpoint.to_owned(),
            sender,
        })
    }

    /// True for the null reference.
    pub fn is_null(&self) -> bool {
        matches!(self, ActorRef::Null)
    }

    /// True for a local reference.
    pub fn is_local(&self) -> bool {
        matches!(self, ActorRef::Local(_))
    }

    /// True for a remote reference.
    pub fn is_remote(&self) -> bool {
        matches!(self, ActorRef::Remote(_))
    }

    /// Name of the referenced actor, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            ActorRef::Null => None,
            ActorRef::Local(local) => Some(&local.name),
            ActorRef::Remote(remote) => Some(&remote.name),
        }
    }

    /// Endpoint of a remote reference.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ActorRef::Remote(remote) => Some(&remote.endpoint),
            _ => None,
        }
    }

    /// True if a send through this reference can still reach a target:
    /// the local actor is alive, or the reference is remote (remote
    /// liveness is only discovered by sending).
    pub fn is_active(&self) -> bool {
        match self {
            ActorRef::Null => false,
            ActorRef::Local(local) => local
                .cell
                .upgrade()
                .map(|cell| !cell.is_terminated())
                .unwrap_or(false),
            ActorRef::Remote(_) => true,
        }
    }

    /// Sends a message asynchronously. Never blocks.
    ///
    /// Ownership of the message transfers here; it is released exactly
    /// once, either delivered or dropped on a failed path. Local delivery
    /// is reliable, remote delivery is best effort and transport failures
    /// are logged.
    pub fn send(&self, msg: impl Into<Box<dyn Message>>, sender: ActorRef) {
        let msg = msg.into();
        match self {
            ActorRef::Null => {
                debug!("Dropping message of kind {} sent to null reference.", msg.kind());
            }
            ActorRef::Local(local) => match local.cell.upgrade() {
                Some(cell) => cell.mailbox().push(Envelope::new(msg, sender)),
                None => {
                    debug!(
                        "Dropping message of kind {}: actor '{}' is gone.",
                        msg.kind(),
                        local.name
                    );
                }
            },
            ActorRef::Remote(remote) => {
                if let Err(e) = Self::post_remote(remote, msg, &sender) {
                    error!(
                        "Could not send message to remote actor '{}' at {}: {}",
                        remote.name, remote.endpoint, e
                    );
                }
            }
        }
    }

    /// Sends a message and waits for the reply of the receiving handler.
    ///
    /// Returns `Ok(None)` when no reply arrives within
    /// [`FAST_SEND_TIMEOUT`](crate::FAST_SEND_TIMEOUT).
    ///
    /// # Errors
    ///
    /// `NoTarget` for a null or dangling local reference, `Transport` for
    /// serialization or network failures.
    pub fn fast_send(
        &self,
        msg: impl Into<Box<dyn Message>>,
        sender: ActorRef,
    ) -> Result<Option<Box<dyn Message>>, Error> {
        self.fast_send_timeout(msg, sender, FAST_SEND_TIMEOUT)
    }

    /// Same as [`ActorRef::fast_send`] with an explicit reply window.
    pub fn fast_send_timeout(
        &self,
        msg: impl Into<Box<dyn Message>>,
        sender: ActorRef,
        timeout: Duration,
    ) -> Result<Option<Box<dyn Message>>, Error> {
        let msg = msg.into();
        match self {
            ActorRef::Null => Err(Error::NoTarget),
            ActorRef::Local(local) => {
                let cell = local.cell.upgrade().ok_or(Error::NoTarget)?;
                let slot = ReplySlot::new();
                cell.mailbox()
                    .push(Envelope::fast(msg, sender, slot.clone()));
                Ok(slot.wait_timeout(timeout))
            }
            ActorRef::Remote(remote) => {
                let frame = Self::frame_for(remote, msg.as_ref(), &sender, true)?;
                match remote.sender.request(&remote.endpoint, frame, timeout)? {
                    Some(reply) => {
                        let msg = WireCodec::decode(reply.kind, &reply.payload)?;
                        Ok(Some(msg))
                    }
                    None => Ok(None),
                }
            }
        }
    }

    fn post_remote(
        remote: &RemoteRef,
        msg: Box<dyn Message>,
        sender: &ActorRef,
    ) -> Result<(), Error> {
        let frame = Self::frame_for(remote, msg.as_ref(), sender, false)?;
        remote.sender.post(&remote.endpoint, frame)
    }

    fn frame_for(
        remote: &RemoteRef,
        msg: &dyn Message,
        sender: &ActorRef,
        is_fast: bool,
    ) -> Result<WireFrame, Error> {
        let sender_actor = sender.name().map(str::to_owned);
        let sender_endpoint = if sender_actor.is_some() {
            match sender {
                ActorRef::Remote(r) => Some(r.endpoint.clone()),
                _ => remote.sender.local_endpoint(),
            }
        } else {
            None
        };
        Ok(WireFrame {
            sender_actor,
            sender_endpoint,
            receiver: remote.name.clone(),
            kind: msg.kind(),
            is_fast,
            request_id: None,
            payload: WireCodec::encode(msg)?,
        })
    }
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorRef::Null => write!(f, "ActorRef::Null"),
            ActorRef::Local(local) => {
                write!(f, "ActorRef::Local({})", local.name)
            }
            ActorRef::Remote(remote) => write!(
                f,
                "ActorRef::Remote({}@{})",
                remote.name, remote.endpoint
            ),
        }
    }
}
