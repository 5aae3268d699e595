// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Manager
//!
//! The `manager` module provides the `Manager` type, the owner and
//! lifecycle coordinator of a set of local actors. The manager registers
//! actors, spawns one thread per actor with optional CPU pinning and real
//! time scheduling, resolves names (local first, then the global registry)
//! and coordinates orderly shutdown.
//!
//! The manager is itself an actor: it owns a mailbox and processes `Start`
//! and `Shutdown` on the thread that calls [`Manager::run`].
//!

use crate::{
    actor::{Actor, ActorCell},
    envelope::Envelope,
    error::Error,
    mailbox::DEFAULT_CAPACITY,
    message::{kind, Start},
    reference::ActorRef,
    registry::RegistryClient,
    registry_server::REGISTRY_NAME,
    runner::{ActorRunner, Placement, POLL_INTERVAL},
    wire::{RemoteSender, WireCodec},
};

use tracing::{debug, error, info, warn};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread::{Builder, JoinHandle};

/// Owner and lifecycle coordinator for a set of local actors.
pub struct Manager {
    inner: Arc<ManagerInner>,
    pending: Mutex<Vec<PendingActor>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

struct PendingActor {
    name: String,
    body: Box<dyn FnOnce() + Send>,
}

pub(crate) struct ManagerInner {
    id: String,
    cell: Arc<ActorCell>,
    state: RwLock<ManagerState>,
}

#[derive(Default)]
struct ManagerState {
    cells: HashMap<String, Arc<ActorCell>>,
    order: Vec<String>,
    registry: Option<Arc<RegistryClient>>,
    sender: Option<Arc<dyn RemoteSender>>,
    local_endpoint: String,
}

impl Manager {
    /// Creates a manager with the given id.
    ///
    /// The id identifies this manager towards the registry and names the
    /// manager's own mailbox.
    pub fn new(id: &str) -> Self {
        Manager {
            inner: Arc::new(ManagerInner {
                id: id.to_owned(),
                cell: ActorCell::new(
                    id,
                    DEFAULT_CAPACITY,
                    Placement::default(),
                ),
                state: RwLock::new(ManagerState::default()),
            }),
            pending: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Id of this manager.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Registers an actor to be managed, with default placement.
    ///
    /// # Errors
    ///
    /// Returns `Precondition` if the actor name is empty or already
    /// managed.
    pub fn manage<A: Actor>(&self, actor: A) -> Result<(), Error> {
        self.manage_with(actor, Placement::default())
    }

    /// Registers an actor to be managed with explicit thread placement.
    ///
    /// If a registry is attached and a local endpoint is configured, the
    /// actor is also registered with the global registry; a rejected
    /// registration is logged and the actor remains usable locally.
    ///
    /// # Arguments
    ///
    /// * `actor` - The actor to manage.
    /// * `placement` - CPU affinity and scheduling class for its thread.
    ///
    /// # Errors
    ///
    /// Returns `Precondition` if the name is empty or duplicated, or if a
    /// CPU id in the affinity set is out of range.
    pub fn manage_with<A: Actor>(
        &self,
        actor: A,
        placement: Placement,
    ) -> Result<(), Error> {
        let name = actor.name().to_owned();
        if name.is_empty() {
            return Err(Error::Precondition(
                "actor name must not be empty".to_owned(),
            ));
        }

        let cpus = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1);
        for &core in &placement.affinity {
            if core >= cpus {
                error!("Bad core id: {}", core);
                return Err(Error::Precondition(format!(
                    "core id {core} out of range, {cpus} CPUs online"
                )));
            }
        }

        let cell = ActorCell::new(&name, actor.mailbox_capacity(), placement);
        {
            let mut state =
                self.inner.state.write().unwrap_or_else(|e| e.into_inner());
            if name == self.inner.id || state.cells.contains_key(&name) {
                error!("Actor '{}' already exists!", name);
                return Err(Error::Precondition(format!(
                    "actor with name '{name}' already managed"
                )));
            }
            state.cells.insert(name.clone(), cell.clone());
            state.order.push(name.clone());
        }

        // The runner owns the actor until its thread finishes.
        let runner =
            ActorRunner::new(actor, cell, ManagerHandle::new(&self.inner));
        let mut pending =
            self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.push(PendingActor {
            name: name.clone(),
            body: Box::new(move || runner.run()),
        });
        drop(pending);

        let (registry, endpoint) = {
            let state =
                self.inner.state.read().unwrap_or_else(|e| e.into_inner());
            (state.registry.clone(), state.local_endpoint.clone())
        };
        if let Some(client) = registry {
            if !endpoint.is_empty() {
                match client.register_actor(&name, &endpoint) {
                    Ok(()) => {
                        info!("Registered '{}' with the registry.", name)
                    }
                    Err(e) => warn!(
                        "Could not register '{}' with the registry: {}",
                        name, e
                    ),
                }
            }
        }
        Ok(())
    }

    /// Connects this manager to a global registry.
    ///
    /// Creates a remote reference to the well known registry actor, starts
    /// the heartbeat thread, and records the local endpoint under which
    /// subsequently managed actors are auto registered.
    ///
    /// # Arguments
    ///
    /// * `registry_endpoint` - Endpoint of the registry process.
    /// * `local_endpoint` - Endpoint where this manager's actors are
    ///   reachable. Empty disables auto registration.
    /// * `sender` - Transport used for remote references.
    pub fn set_registry(
        &self,
        registry_endpoint: &str,
        local_endpoint: &str,
        sender: Arc<dyn RemoteSender>,
    ) {
        WireCodec::ensure_builtin();
        let registry_ref =
            ActorRef::remote(REGISTRY_NAME, registry_endpoint, sender.clone());
        let client =
            Arc::new(RegistryClient::new(&self.inner.id, registry_ref));
        client.start_heartbeat();

        let mut state =
            self.inner.state.write().unwrap_or_else(|e| e.into_inner());
        state.sender = Some(sender);
        state.local_endpoint = local_endpoint.to_owned();
        state.registry = Some(client);
    }

    /// Registry client attached to this manager, if any.
    pub fn registry_client(&self) -> Option<Arc<RegistryClient>> {
        let state = self.inner.state.read().unwrap_or_else(|e| e.into_inner());
        state.registry.clone()
    }

    /// Starts all managed actors.
    ///
    /// Pushes `Start` onto every mailbox first, so it is the first message
    /// dispatched, then spawns one thread per actor in registration order.
    /// Finally sends `Start` to the manager itself.
    pub fn init(&self) {
        {
            let state =
                self.inner.state.read().unwrap_or_else(|e| e.into_inner());
            for name in &state.order {
                if let Some(cell) = state.cells.get(name) {
                    debug!("Sending start to {}.", name);
                    cell.mailbox().push_front(Envelope::new(
                        Box::new(Start),
                        ActorRef::Null,
                    ));
                }
            }
        }

        let pending: Vec<PendingActor> = {
            let mut pending =
                self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain(..).collect()
        };
        let mut threads =
            self.threads.lock().unwrap_or_else(|e| e.into_inner());
        for actor in pending {
            match Builder::new().name(actor.name.clone()).spawn(actor.body) {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    error!("Could not spawn thread for '{}': {}", actor.name, e)
                }
            }
        }
        drop(threads);

        self.inner
            .cell
            .mailbox()
            .push(Envelope::new(Box::new(Start), ActorRef::Null));
    }

    /// Drives the manager's own dispatch loop on the calling thread.
    ///
    /// Returns once `Shutdown` has been processed: every managed actor is
    /// terminated cooperatively and the heartbeat is stopped. Call
    /// [`Manager::end`] afterwards to join the actor threads.
    pub fn run(&self) {
        debug!("Running manager {}.", self.inner.id);
        while !self.inner.cell.is_terminated() {
            let Some(envelope) =
                self.inner.cell.mailbox().pop_timeout(POLL_INTERVAL)
            else {
                continue;
            };
            self.inner.cell.count_message();
            match envelope.kind() {
                kind::START => debug!("Manager {} started.", self.inner.id),
                kind::SHUTDOWN => {
                    info!("Manager {} shutting down.", self.inner.id);
                    self.terminate_all();
                }
                other => warn!(
                    "Manager {} dropped message of kind {}.",
                    self.inner.id, other
                ),
            }
        }
        debug!("Manager {} stopped.", self.inner.id);
    }

    /// Requests termination of every managed actor and of the manager's
    /// own loop. In-flight handlers run to completion; the loops exit at
    /// their next iteration boundary.
    pub fn terminate_all(&self) {
        let state = self.inner.state.read().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = &state.registry {
            client.stop_heartbeat();
        }
        for cell in state.cells.values() {
            cell.terminate();
        }
        drop(state);
        self.inner.cell.terminate();
    }

    /// Waits for all actor threads to finish.
    pub fn end(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut threads =
                self.threads.lock().unwrap_or_else(|e| e.into_inner());
            threads.drain(..).collect()
        };
        for handle in handles {
            if handle.join().is_err() {
                error!("An actor thread panicked before joining.");
            }
        }
    }

    /// Reference to the manager's own mailbox, for `Shutdown` and other
    /// control messages.
    pub fn manager_ref(&self) -> ActorRef {
        ActorRef::local(&self.inner.cell)
    }

    /// Handle usable from actor threads to resolve names.
    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle::new(&self.inner)
    }

    /// Finds an actor by name, local first, then through the registry.
    ///
    /// # Errors
    ///
    /// `NotFound` if the name is unknown locally and to the registry (or no
    /// registry is attached), `Offline` if it is registered but its manager
    /// has missed heartbeats.
    pub fn get_actor_by_name(&self, name: &str) -> Result<ActorRef, Error> {
        self.inner.get_actor_by_name(name)
    }

    /// Finds a local actor by name. Returns a null reference if absent;
    /// never queries the registry.
    pub fn get_local_actor(&self, name: &str) -> ActorRef {
        self.inner.get_local_actor(name)
    }

    /// Total pending messages across all managed actors.
    pub fn total_queue_length(&self) -> usize {
        let state = self.inner.state.read().unwrap_or_else(|e| e.into_inner());
        state.cells.values().map(|cell| cell.queue_length()).sum()
    }

    /// Pending message count per actor name.
    pub fn queue_lengths(&self) -> HashMap<String, usize> {
        let state = self.inner.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .cells
            .iter()
            .map(|(name, cell)| (name.clone(), cell.queue_length()))
            .collect()
    }

    /// Observed OS thread id and cumulative message count per actor name.
    pub fn message_counts(&self) -> HashMap<String, (i64, u64)> {
        let state = self.inner.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .cells
            .iter()
            .map(|(name, cell)| {
                (name.clone(), (cell.thread_id(), cell.message_count()))
            })
            .collect()
    }

    /// Names of all managed actors, in registration order.
    pub fn managed_names(&self) -> Vec<String> {
        let state = self.inner.state.read().unwrap_or_else(|e| e.into_inner());
        state.order.clone()
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        // Actors never outlive their manager: request termination and join
        // every thread before the cells are dropped.
        self.terminate_all();
        self.end();
    }
}

impl ManagerInner {
    fn get_local_actor(&self, name: &str) -> ActorRef {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        match state.cells.get(name) {
            Some(cell) => ActorRef::local(cell),
            None => ActorRef::Null,
        }
    }

    fn get_actor_by_name(&self, name: &str) -> Result<ActorRef, Error> {
        let (registry, sender) = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            if let Some(cell) = state.cells.get(name) {
                return Ok(ActorRef::local(cell));
            }
            (state.registry.clone(), state.sender.clone())
        };

        if let (Some(client), Some(sender)) = (registry, sender) {
            let endpoint = client.lookup(name)?;
            return Ok(ActorRef::remote(name, &endpoint, sender));
        }
        Err(Error::NotFound(name.to_owned()))
    }
}

/// Weak handle to a manager, held by actors through their context.
///
/// The manager owns its actors; the handle must not keep it alive, so it
/// holds a weak reference. Operations on a handle whose manager is gone
/// fail with `NotFound` or return null references.
#[derive(Clone)]
pub struct ManagerHandle {
    inner: Weak<ManagerInner>,
}

impl ManagerHandle {
    pub(crate) fn new(inner: &Arc<ManagerInner>) -> Self {
        ManagerHandle {
            inner: Arc::downgrade(inner),
        }
    }

    /// Id of the manager, if it is still alive.
    pub fn id(&self) -> Option<String> {
        self.inner.upgrade().map(|inner| inner.id.clone())
    }

    /// See [`Manager::get_actor_by_name`].
    pub fn get_actor_by_name(&self, name: &str) -> Result<ActorRef, Error> {
        match self.inner.upgrade() {
            Some(inner) => inner.get_actor_by_name(name),
            None => Err(Error::NotFound(name.to_owned())),
        }
    }

    /// See [`Manager::get_local_actor`].
    pub fn get_local_actor(&self, name: &str) -> ActorRef {
        match self.inner.upgrade() {
            Some(inner) => inner.get_local_actor(name),
            None => ActorRef::Null,
        }
    }

    /// Reference to the manager's own mailbox.
    pub fn manager_ref(&self) -> ActorRef {
        match self.inner.upgrade() {
            Some(inner) => ActorRef::local(&inner.cell),
            None => ActorRef::Null,
        }
    }
}
