// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Registry server
//!
//! The `registry_server` module provides `GlobalRegistry`, the well known
//! actor that maps actor names to endpoints and tracks manager liveness
//! through heartbeats. The registry is an ordinary actor: hosting it under
//! a manager with a transport receiver turns the process into the registry
//! peer other managers connect to.
//!
//! Stale entries are never evicted. A manager that misses heartbeats only
//! has its actors flagged offline; a later heartbeat brings them back, and
//! another manager may take the name over while the owner is offline.
//!

use crate::{
    actor::{Actor, ActorContext, DispatchTable},
    error::Error,
    manager::Manager,
    message::{
        kind, Heartbeat, HeartbeatAck, LookupActor, LookupResult,
        RegisterActor, RegistrationFailed, RegistrationOk, Start, Timeout,
        UnregisterActor,
    },
    reference::ActorRef,
    wire::WireCodec,
    HEARTBEAT_INTERVAL, OFFLINE_THRESHOLD,
};

use tracing::{debug, info, warn};

use std::collections::HashMap;
use std::thread::Builder;
use std::time::{Duration, Instant};

/// Well known name of the registry actor.
pub const REGISTRY_NAME: &str = "GlobalRegistry";

/// Timing parameters of the registry.
///
/// The defaults are the protocol constants; changing them is compatible
/// only if every peer agrees. Tests scale them down.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Interval at which clients are expected to heartbeat.
    pub heartbeat_interval: Duration,
    /// A manager is offline once this much time passes without a
    /// heartbeat. Three missed heartbeats by default.
    pub offline_threshold: Duration,
    /// Period of the background sweep that refreshes online flags. Must
    /// not exceed `heartbeat_interval`.
    pub sweep_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            offline_threshold: OFFLINE_THRESHOLD,
            sweep_interval: Duration::from_secs(1),
        }
    }
}

struct RegistryEntry {
    manager_id: String,
    endpoint: String,
    online: bool,
}

/// Central actor registry for cross manager lookup.
pub struct GlobalRegistry {
    config: RegistryConfig,
    /// actor name to owning manager and endpoint.
    entries: HashMap<String, RegistryEntry>,
    /// manager id to instant of its last heartbeat.
    managers: HashMap<String, Instant>,
}

impl Default for GlobalRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl GlobalRegistry {
    /// Creates a registry with the given timing parameters.
    pub fn new(config: RegistryConfig) -> Self {
        WireCodec::ensure_builtin();
        GlobalRegistry {
            config,
            entries: HashMap::new(),
            managers: HashMap::new(),
        }
    }

    /// True if the manager has heartbeated within the offline threshold.
    fn manager_online(&self, manager_id: &str) -> bool {
        self.managers
            .get(manager_id)
            .map(|last| last.elapsed() < self.config.offline_threshold)
            .unwrap_or(false)
    }

    fn on_start(
        &mut self,
        _msg: Start,
        ctx: &mut ActorContext<'_>,
    ) -> Result<(), Error> {
        info!(
            "Registry started, offline threshold {:?}.",
            self.config.offline_threshold
        );
        // Tick the sweep into our own mailbox so the state stays single
        // threaded.
        let tick = self.config.sweep_interval;
        let target = ctx.self_ref();
        let _sweeper = Builder::new()
            .name("registry-sweep".to_owned())
            .spawn(move || {
                while target.is_active() {
                    std::thread::sleep(tick);
                    target.send(Timeout::default(), ActorRef::Null);
                }
            })
            .map_err(|e| Error::Handler(e.to_string()))?;
        Ok(())
    }

    fn on_register(
        &mut self,
        msg: RegisterActor,
        ctx: &mut ActorContext<'_>,
    ) -> Result<(), Error> {
        if let Some(entry) = self.entries.get(&msg.actor_name) {
            if entry.manager_id != msg.manager_id {
                if self.manager_online(&entry.manager_id) {
                    warn!(
                        "Registration failed: '{}' already registered by manager '{}'.",
                        msg.actor_name, entry.manager_id
                    );
                    ctx.reply(RegistrationFailed {
                        actor_name: msg.actor_name,
                        reason: "name already registered".to_owned(),
                    });
                    return Ok(());
                }
                info!(
                    "Manager '{}' takes over '{}' from offline manager '{}'.",
                    msg.manager_id, msg.actor_name, entry.manager_id
                );
            }
        }

        self.entries.insert(
            msg.actor_name.clone(),
            RegistryEntry {
                manager_id: msg.manager_id.clone(),
                endpoint: msg.endpoint,
                online: true,
            },
        );
        // Registration counts as a heartbeat.
        self.managers.insert(msg.manager_id.clone(), Instant::now());
        info!(
            "Registered '{}' from manager '{}'.",
            msg.actor_name, msg.manager_id
        );
        ctx.reply(RegistrationOk {
            actor_name: msg.actor_name,
        });
        Ok(())
    }

    fn on_unregister(
        &mut self,
        msg: UnregisterActor,
        _ctx: &mut ActorContext<'_>,
    ) -> Result<(), Error> {
        match self.entries.remove(&msg.actor_name) {
            Some(_) => info!("Unregistered '{}'.", msg.actor_name),
            None => {
                warn!("Unregister failed: '{}' not found.", msg.actor_name)
            }
        }
        Ok(())
    }

    fn on_lookup(
        &mut self,
        msg: LookupActor,
        ctx: &mut ActorContext<'_>,
    ) -> Result<(), Error> {
        let reply = match self.entries.get(&msg.actor_name) {
            Some(entry) => LookupResult {
                actor_name: msg.actor_name,
                endpoint: Some(entry.endpoint.clone()),
                online: self.manager_online(&entry.manager_id),
            },
            None => LookupResult {
                actor_name: msg.actor_name,
                endpoint: None,
                online: false,
            },
        };
        ctx.reply(reply);
        Ok(())
    }

    fn on_heartbeat(
        &mut self,
        msg: Heartbeat,
        ctx: &mut ActorContext<'_>,
    ) -> Result<(), Error> {
        debug!("Heartbeat from manager '{}'.", msg.manager_id);
        self.managers.insert(msg.manager_id.clone(), Instant::now());
        // The manager's actors are implicitly online again.
        for entry in self.entries.values_mut() {
            if entry.manager_id == msg.manager_id && !entry.online {
                entry.online = true;
            }
        }
        // The ack is optional; only the synchronous path expects one.
        if ctx.is_fast() {
            ctx.reply(HeartbeatAck);
        }
        Ok(())
    }

    /// Background sweep: refresh the online flags, log transitions, evict
    /// nothing.
    fn on_sweep(
        &mut self,
        _msg: Timeout,
        _ctx: &mut ActorContext<'_>,
    ) -> Result<(), Error> {
        let mut offline: Vec<&str> = Vec::new();
        for (manager_id, last) in &self.managers {
            if last.elapsed() >= self.config.offline_threshold {
                offline.push(manager_id);
            }
        }
        for entry in self.entries.values_mut() {
            let is_online = offline.iter().all(|id| *id != entry.manager_id)
                && self.managers.contains_key(&entry.manager_id);
            if entry.online && !is_online {
                warn!(
                    "Manager '{}' missed heartbeats, flagging its actors offline.",
                    entry.manager_id
                );
            }
            entry.online = is_online;
        }
        Ok(())
    }
}

impl Actor for GlobalRegistry {
    fn name(&self) -> &str {
        REGISTRY_NAME
    }

    fn register_handlers(&self, table: &mut DispatchTable<Self>) {
        table.on::<Start>(kind::START, Self::on_start);
        table.on::<Timeout>(kind::TIMEOUT, Self::on_sweep);
        table.on::<RegisterActor>(kind::REGISTER_ACTOR, Self::on_register);
        table.on::<UnregisterActor>(
            kind::UNREGISTER_ACTOR,
            Self::on_unregister,
        );
        table.on::<LookupActor>(kind::LOOKUP_ACTOR, Self::on_lookup);
        table.on::<Heartbeat>(kind::HEARTBEAT, Self::on_heartbeat);
    }
}

/// Registers a `GlobalRegistry` under the given manager.
///
/// The registry is an ordinary actor; a manager hosting it plus a
/// transport receiver bound to the registry endpoint make a complete
/// registry process.
///
/// # Errors
///
/// Propagates the `Precondition` error of `manage` if the well known name
/// is already taken.
pub fn host_registry(
    manager: &Manager,
    config: RegistryConfig,
) -> Result<(), Error> {
    manager.manage(GlobalRegistry::new(config))
}
