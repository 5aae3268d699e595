// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # ZeroMQ transport
//!
//! This crate provides the ZeroMQ backend for the troupe actor runtime.
//! Every manager binds one ROUTER socket at its endpoint; outbound traffic
//! flows through per endpoint DEALER sockets. The same socket pair carries
//! both delivery paths: fire and forget frames and the request and reply
//! round trip of `fast_send`, matched by request id.
//!
//! The [`run_registry`] entry point hosts the global registry as a
//! standalone peer process.
//!

mod receiver;
mod sender;

pub use receiver::ZmqReceiver;
pub use sender::ZmqSender;

use troupe_actor::{host_registry, Error, Manager, RegistryConfig};

use tracing::info;

/// Runs the global registry as a standalone server, blocking until it
/// receives `Shutdown`.
///
/// # Arguments
///
/// * `endpoint` - Endpoint to bind, e.g. `"tcp://0.0.0.0:5555"`.
/// * `config` - Timing parameters of the registry.
///
/// # Errors
///
/// `Transport` if the endpoint cannot be bound.
pub fn run_registry(
    endpoint: &str,
    config: RegistryConfig,
) -> Result<(), Error> {
    let manager = Manager::new("GlobalRegistryHost");
    host_registry(&manager, config)?;

    let sender = ZmqSender::new()?;
    let receiver = ZmqReceiver::start(endpoint, manager.handle(), sender)?;

    manager.init();
    info!("GlobalRegistry ready at {}.", endpoint);
    manager.run();

    receiver.stop();
    manager.end();
    Ok(())
}
