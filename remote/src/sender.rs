// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # ZeroMQ sender
//!
//! The `sender` module provides `ZmqSender`, the outbound half of the
//! transport. It keeps one DEALER socket per destination endpoint and
//! implements the `RemoteSender` seam of the core crate: `post` for fire
//! and forget frames and `request` for the synchronous round trip of
//! `fast_send`.
//!
//! Sockets are driven by a private tokio runtime; every operation runs to
//! completion with `block_on`, so callers stay plain threads.
//!

use troupe_actor::{
    wire::{RemoteSender, WireCodec, WireFrame},
    Error,
};

use tokio::runtime::Runtime;
use tracing::{debug, warn};
use zeromq::{DealerSocket, Socket, SocketRecv, SocketSend};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Outbound transport: a pool of DEALER sockets, one per endpoint.
pub struct ZmqSender {
    runtime: Runtime,
    sockets: Mutex<HashMap<String, Arc<Mutex<DealerSocket>>>>,
    local_endpoint: RwLock<Option<String>>,
    next_request: AtomicU64,
}

impl ZmqSender {
    /// Creates a sender with no local endpoint.
    ///
    /// # Errors
    ///
    /// `Transport` if the tokio runtime cannot be created.
    pub fn new() -> Result<Arc<Self>, Error> {
        WireCodec::ensure_builtin();
        let runtime =
            Runtime::new().map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Arc::new(ZmqSender {
            runtime,
            sockets: Mutex::new(HashMap::new()),
            local_endpoint: RwLock::new(None),
            next_request: AtomicU64::new(0),
        }))
    }

    /// Creates a sender that stamps outgoing frames with the endpoint
    /// where this process receives messages.
    pub fn with_local_endpoint(endpoint: &str) -> Result<Arc<Self>, Error> {
        let sender = Self::new()?;
        sender.set_local_endpoint(endpoint);
        Ok(sender)
    }

    /// Sets the local endpoint stamped into outgoing frames.
    pub fn set_local_endpoint(&self, endpoint: &str) {
        let mut local = self
            .local_endpoint
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *local = Some(endpoint.to_owned());
    }

    /// Returns the socket connected to `endpoint`, connecting on first
    /// use.
    fn socket_for(
        &self,
        endpoint: &str,
    ) -> Result<Arc<Mutex<DealerSocket>>, Error> {
        let mut sockets =
            self.sockets.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(socket) = sockets.get(endpoint) {
            return Ok(socket.clone());
        }

        debug!("Connecting to {}.", endpoint);
        let socket = self.runtime.block_on(async {
            let mut socket = DealerSocket::new();
            socket.connect(endpoint).await.map_err(|e| {
                Error::Transport(format!("could not connect to {endpoint}: {e}"))
            })?;
            // Small delay to let the connection establish.
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<DealerSocket, Error>(socket)
        })?;

        let socket = Arc::new(Mutex::new(socket));
        sockets.insert(endpoint.to_owned(), socket.clone());
        Ok(socket)
    }
}

impl RemoteSender for ZmqSender {
    fn local_endpoint(&self) -> Option<String> {
        let local = self
            .local_endpoint
            .read()
            .unwrap_or_else(|e| e.into_inner());
        local.clone()
    }

    fn post(&self, endpoint: &str, frame: WireFrame) -> Result<(), Error> {
        let socket = self.socket_for(endpoint)?;
        let bytes = frame.to_bytes()?;
        let mut socket = socket.lock().unwrap_or_else(|e| e.into_inner());
        self.runtime
            .block_on(socket.send(bytes.into()))
            .map_err(|e| Error::Transport(e.to_string()))
    }

    fn request(
        &self,
        endpoint: &str,
        mut frame: WireFrame,
        timeout: Duration,
    ) -> Result<Option<WireFrame>, Error> {
        let socket = self.socket_for(endpoint)?;
        let id = self.next_request.fetch_add(1, Ordering::Relaxed) + 1;
        frame.request_id = Some(id);
        let bytes = frame.to_bytes()?;
        let deadline = Instant::now() + timeout;

        let mut socket = socket.lock().unwrap_or_else(|e| e.into_inner());
        self.runtime.block_on(async {
            socket
                .send(bytes.into())
                .await
                .map_err(|e| Error::Transport(e.to_string()))?;

            loop {
                let remaining =
                    deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(None);
                }
                match tokio::time::timeout(remaining, socket.recv()).await {
                    Ok(Ok(reply)) => {
                        let data = reply
                            .get(0)
                            .map(|frame| frame.as_ref())
                            .unwrap_or(&[]);
                        match WireFrame::from_bytes(data) {
                            Ok(parsed)
                                if parsed.request_id == Some(id) =>
                            {
                                return Ok(Some(parsed));
                            }
                            Ok(stale) => {
                                // A reply from an earlier, timed out
                                // request. Not ours.
                                debug!(
                                    "Discarding stale reply with request id {:?}.",
                                    stale.request_id
                                );
                            }
                            Err(e) => {
                                warn!("Discarding undecodable reply: {}", e);
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        return Err(Error::Transport(e.to_string()));
                    }
                    Err(_elapsed) => return Ok(None),
                }
            }
        })
    }
}
