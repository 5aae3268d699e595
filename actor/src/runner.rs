// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Actor runner
//!
//! The `runner` module provides the body of an actor thread: the dispatch
//! loop that pops one message at a time from the mailbox and routes it
//! through the dispatch table, and the application of the thread's CPU
//! affinity and scheduling class.
//!

use crate::{
    actor::{Actor, ActorCell, ActorContext, DispatchTable},
    manager::ManagerHandle,
};

use tracing::{debug, error, warn};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// How often the dispatch loop re-checks its termination flag while the
/// mailbox is empty.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Scheduling class for a real time actor thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchedClass {
    /// The OS default scheduler.
    #[default]
    Default,
    /// First in first out real time scheduling.
    Fifo,
    /// Round robin real time scheduling.
    RoundRobin,
}

/// Thread placement of a managed actor: CPU pinning and scheduling class.
///
/// Both are applied after the actor thread starts. Failures (typically
/// insufficient privilege for real time priorities) are logged and never
/// fatal.
#[derive(Debug, Clone, Default)]
pub struct Placement {
    /// Logical CPU ids the actor thread is pinned to. Empty means no
    /// pinning.
    pub affinity: BTreeSet<usize>,
    /// Real time priority, 1 to 99. Zero keeps the default scheduling.
    pub priority: u8,
    /// Scheduling class used when `priority` is above zero.
    pub class: SchedClass,
}

impl Placement {
    /// Placement pinned to the given CPUs with default scheduling.
    pub fn pinned<I: IntoIterator<Item = usize>>(cores: I) -> Self {
        Placement {
            affinity: cores.into_iter().collect(),
            ..Placement::default()
        }
    }

    /// Placement with a real time priority in the given class.
    pub fn realtime(priority: u8, class: SchedClass) -> Self {
        Placement {
            priority,
            class,
            ..Placement::default()
        }
    }
}

/// Owns an actor between `manage` and the end of its thread.
pub(crate) struct ActorRunner<A: Actor> {
    actor: A,
    cell: Arc<ActorCell>,
    table: DispatchTable<A>,
    manager: ManagerHandle,
}

impl<A: Actor> ActorRunner<A> {
    pub(crate) fn new(
        actor: A,
        cell: Arc<ActorCell>,
        manager: ManagerHandle,
    ) -> Self {
        let mut table = DispatchTable::new();
        actor.register_handlers(&mut table);
        ActorRunner {
            actor,
            cell,
            table,
            manager,
        }
    }

    /// Dispatch loop. Runs until termination is requested, then invokes the
    /// actor's `end` hook.
    pub(crate) fn run(mut self) {
        self.cell.set_thread_id(current_thread_id());
        apply_placement(self.cell.placement(), self.cell.name());
        debug!("Running actor {}.", self.cell.name());

        while !self.cell.is_terminated() {
            let Some(envelope) = self.cell.mailbox().pop_timeout(POLL_INTERVAL)
            else {
                continue;
            };
            self.cell.count_message();
            let kind = envelope.kind();
            let mut ctx =
                ActorContext::new(&self.cell, &self.manager, &envelope);
            let result = match self.table.get(kind) {
                Some(handler) => handler(&mut self.actor, envelope, &mut ctx),
                None => self.actor.process_message(envelope, &mut ctx),
            };
            // A failed handler never kills the actor thread.
            if let Err(e) = result {
                error!(
                    "Actor '{}' failed handling message of kind {}: {}",
                    self.cell.name(),
                    kind,
                    e
                );
            }
        }

        self.actor.end();
        debug!("Actor {} is terminated.", self.cell.name());
    }
}

#[cfg(target_os = "linux")]
fn current_thread_id() -> i64 {
    // SAFETY: gettid has no preconditions.
    i64::from(unsafe { libc::gettid() })
}

#[cfg(not(target_os = "linux"))]
fn current_thread_id() -> i64 {
    0
}

/// Applies CPU affinity and scheduling class to the calling thread.
#[cfg(target_os = "linux")]
fn apply_placement(placement: &Placement, name: &str) {
    if !placement.affinity.is_empty() {
        // SAFETY: the cpu_set_t is zero initialized and only manipulated
        // through the libc helpers; core ids were validated at manage time.
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            for &core in &placement.affinity {
                libc::CPU_SET(core, &mut set);
            }
            if libc::sched_setaffinity(
                0,
                std::mem::size_of::<libc::cpu_set_t>(),
                &set,
            ) != 0
            {
                warn!(
                    "Could not set affinity for '{}': {}",
                    name,
                    std::io::Error::last_os_error()
                );
            } else {
                debug!("Actor '{}' pinned to {:?}.", name, placement.affinity);
            }
        }
    }

    if placement.priority > 0 {
        let policy = match placement.class {
            SchedClass::RoundRobin => libc::SCHED_RR,
            _ => libc::SCHED_FIFO,
        };
        let param = libc::sched_param {
            sched_priority: i32::from(placement.priority),
        };
        // SAFETY: pid 0 addresses the calling thread; param outlives the call.
        if unsafe { libc::sched_setscheduler(0, policy, &param) } != 0 {
            warn!(
                "Could not set priority {} for '{}': {}",
                placement.priority,
                name,
                std::io::Error::last_os_error()
            );
        } else {
            debug!(
                "Actor '{}' scheduling set to priority {}.",
                name, placement.priority
            );
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_placement(placement: &Placement, name: &str) {
    if !placement.affinity.is_empty() || placement.priority > 0 {
        warn!(
            "Thread placement for '{}' is only supported on Linux.",
            name
        );
    }
}
