// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Registry client
//!
//! The `registry` module provides the per manager client of the global
//! registry: a background heartbeat thread reporting liveness, and the
//! synchronous register and lookup calls performed over an actor reference
//! to the well known registry actor.
//!

use crate::{
    error::Error,
    message::{
        Heartbeat, LookupActor, LookupResult, RegisterActor,
        RegistrationFailed, RegistrationOk, UnregisterActor,
    },
    reference::ActorRef,
    wire::WireCodec,
    HEARTBEAT_INTERVAL,
};

use tracing::{debug, warn};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{Builder, JoinHandle};
use std::time::{Duration, Instant};

/// Client for the global registry, one per manager.
///
/// The client sends a [`Heartbeat`] every
/// [`HEARTBEAT_INTERVAL`](crate::HEARTBEAT_INTERVAL) from a background
/// thread and offers synchronous registration and lookup over the registry
/// reference, which is typically remote.
pub struct RegistryClient {
    manager_id: String,
    registry_ref: ActorRef,
    interval: Duration,
    running: Arc<AtomicBool>,
    heartbeat_thread: Mutex<Option<JoinHandle<()>>>,
}

impl RegistryClient {
    /// Creates a client for the given manager.
    ///
    /// # Arguments
    ///
    /// * `manager_id` - Unique identifier of this manager.
    /// * `registry_ref` - Reference to the registry actor.
    pub fn new(manager_id: &str, registry_ref: ActorRef) -> Self {
        WireCodec::ensure_builtin();
        RegistryClient {
            manager_id: manager_id.to_owned(),
            registry_ref,
            interval: HEARTBEAT_INTERVAL,
            running: Arc::new(AtomicBool::new(false)),
            heartbeat_thread: Mutex::new(None),
        }
    }

    /// Same as [`RegistryClient::new`] with a custom heartbeat interval.
    ///
    /// Changing the interval is protocol compatible only if the registry
    /// side threshold agrees.
    pub fn with_interval(
        manager_id: &str,
        registry_ref: ActorRef,
        interval: Duration,
    ) -> Self {
        let mut client = Self::new(manager_id, registry_ref);
        client.interval = interval;
        client
    }

    /// Id of the manager this client reports for.
    pub fn manager_id(&self) -> &str {
        &self.manager_id
    }

    /// Starts the heartbeat background thread. Idempotent.
    ///
    /// Send failures are logged and swallowed so that transient outages
    /// self heal once the registry is reachable again.
    pub fn start_heartbeat(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        let manager_id = self.manager_id.clone();
        let registry_ref = self.registry_ref.clone();
        let interval = self.interval;
        let running = self.running.clone();

        let handle = Builder::new()
            .name(format!("{manager_id}-heartbeat"))
            .spawn(move || {
                debug!("Heartbeat loop started for manager '{}'.", manager_id);
                while running.load(Ordering::Acquire) {
                    // Transport failures are logged inside send.
                    registry_ref
                        .send(Heartbeat::new(&manager_id), ActorRef::Null);
                    sleep_while(&running, interval);
                }
                debug!("Heartbeat loop stopped for manager '{}'.", manager_id);
            });

        match handle {
            Ok(handle) => {
                let mut thread = self
                    .heartbeat_thread
                    .lock()
                    .unwrap_or_else(|e| e.into_inner());
                *thread = Some(handle);
            }
            Err(e) => {
                warn!("Could not start heartbeat thread: {}", e);
                self.running.store(false, Ordering::Release);
            }
        }
    }

    /// Stops the heartbeat thread and waits for it to exit.
    pub fn stop_heartbeat(&self) {
        self.running.store(false, Ordering::Release);
        let handle = {
            let mut thread = self
                .heartbeat_thread
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            thread.take()
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// True while the heartbeat thread is running.
    pub fn is_heartbeat_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Registers an actor under this manager.
    ///
    /// # Arguments
    ///
    /// * `actor_name` - Unique name for the actor.
    /// * `endpoint` - Endpoint where the actor can be reached.
    ///
    /// # Errors
    ///
    /// `Registration` if the registry rejects the name, `Timeout` if no
    /// reply arrives, `Protocol` on an unexpected reply kind.
    pub fn register_actor(
        &self,
        actor_name: &str,
        endpoint: &str,
    ) -> Result<(), Error> {
        let msg = RegisterActor {
            manager_id: self.manager_id.clone(),
            actor_name: actor_name.to_owned(),
            endpoint: endpoint.to_owned(),
        };
        let reply = self.registry_ref.fast_send(msg, ActorRef::Null)?;
        let Some(reply) = reply else {
            return Err(Error::Timeout(format!(
                "no response from registry registering '{actor_name}'"
            )));
        };
        if reply.downcast_ref::<RegistrationOk>().is_some() {
            return Ok(());
        }
        if let Some(failed) = reply.downcast_ref::<RegistrationFailed>() {
            return Err(Error::Registration {
                name: failed.actor_name.clone(),
                reason: failed.reason.clone(),
            });
        }
        Err(Error::Protocol(format!(
            "unexpected reply of kind {} to a registration",
            reply.kind()
        )))
    }

    /// Removes an actor from the registry. Fire and forget.
    pub fn unregister_actor(&self, actor_name: &str) {
        self.registry_ref.send(
            UnregisterActor {
                actor_name: actor_name.to_owned(),
            },
            ActorRef::Null,
        );
    }

    /// Looks up an actor by name.
    ///
    /// # Errors
    ///
    /// `NotFound` if the name is not registered, `Offline` if its manager
    /// has missed heartbeats, `Timeout` or `Protocol` on a broken exchange.
    pub fn lookup(&self, actor_name: &str) -> Result<String, Error> {
        let result = self.lookup_result(actor_name)?;
        let Some(endpoint) = result.endpoint else {
            return Err(Error::NotFound(actor_name.to_owned()));
        };
        if !result.online {
            return Err(Error::Offline(actor_name.to_owned()));
        }
        Ok(endpoint)
    }

    /// Looks up an actor, returning its endpoint even when offline.
    ///
    /// Use this to attempt communication with a peer that may be
    /// recovering.
    ///
    /// # Errors
    ///
    /// `NotFound` only when the name is absent from the registry.
    pub fn lookup_allow_offline(
        &self,
        actor_name: &str,
    ) -> Result<(String, bool), Error> {
        let result = self.lookup_result(actor_name)?;
        match result.endpoint {
            Some(endpoint) => Ok((endpoint, result.online)),
            None => Err(Error::NotFound(actor_name.to_owned())),
        }
    }

    fn lookup_result(&self, actor_name: &str) -> Result<LookupResult, Error> {
        let msg = LookupActor {
            actor_name: actor_name.to_owned(),
        };
        let reply = self.registry_ref.fast_send(msg, ActorRef::Null)?;
        let Some(reply) = reply else {
            return Err(Error::Timeout(format!(
                "no response from registry looking up '{actor_name}'"
            )));
        };
        match reply.downcast::<LookupResult>() {
            Some(result) => Ok(*result),
            None => Err(Error::Protocol(
                "unexpected reply to a lookup".to_owned(),
            )),
        }
    }
}

impl Drop for RegistryClient {
    fn drop(&mut self) {
        self.stop_heartbeat();
    }
}

/// Sleeps up to `duration`, waking early once `running` clears.
fn sleep_while(running: &AtomicBool, duration: Duration) {
    const SLICE: Duration = Duration::from_millis(50);
    let deadline = Instant::now() + duration;
    while running.load(Ordering::Acquire) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(SLICE));
    }
}
