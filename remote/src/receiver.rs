// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # ZeroMQ receiver
//!
//! The `receiver` module provides `ZmqReceiver`, the inbound half of the
//! transport. It binds a ROUTER socket at the manager's endpoint on a
//! dedicated thread and turns network frames back into local mailbox
//! pushes: asynchronous frames become ordinary sends with the sender
//! reconstructed as a remote reference, fast frames are relayed as a local
//! `fast_send` and their reply is routed back to the requesting peer.
//!
//! Unknown receivers and undecodable frames are logged and dropped;
//! network delivery is best effort.
//!

use crate::sender::ZmqSender;

use troupe_actor::{
    wire::{RemoteSender, WireCodec, WireFrame},
    ActorRef, Error, ManagerHandle,
};

use tracing::{debug, error, info, warn};
use zeromq::{RouterSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{Builder, JoinHandle};
use std::time::Duration;

/// How often the receive loop re-checks its stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Inbound transport: one ROUTER socket bound at the local endpoint,
/// served by a dedicated thread.
pub struct ZmqReceiver {
    endpoint: String,
    stop: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ZmqReceiver {
    /// Binds the endpoint and starts the receive loop.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Endpoint to bind, e.g. `"tcp://0.0.0.0:5001"`.
    /// * `manager` - Handle used to resolve destination actors.
    /// * `sender` - Transport used to reconstruct sender references.
    ///
    /// # Errors
    ///
    /// `Transport` if the endpoint cannot be bound.
    pub fn start(
        endpoint: &str,
        manager: ManagerHandle,
        sender: Arc<ZmqSender>,
    ) -> Result<Self, Error> {
        WireCodec::ensure_builtin();
        let stop = Arc::new(AtomicBool::new(false));
        let (bound_tx, bound_rx) = mpsc::channel::<Result<(), Error>>();

        let bind_endpoint = endpoint.to_owned();
        let loop_stop = stop.clone();
        let sender: Arc<dyn RemoteSender> = sender;

        let thread = Builder::new()
            .name("zmq-receiver".to_owned())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = bound_tx
                            .send(Err(Error::Transport(e.to_string())));
                        return;
                    }
                };
                runtime.block_on(async move {
                    let mut socket = RouterSocket::new();
                    if let Err(e) = socket.bind(&bind_endpoint).await {
                        let _ = bound_tx.send(Err(Error::Transport(format!(
                            "could not bind {bind_endpoint}: {e}"
                        ))));
                        return;
                    }
                    let _ = bound_tx.send(Ok(()));
                    info!("Receiver bound at {}.", bind_endpoint);

                    while !loop_stop.load(Ordering::Acquire) {
                        match tokio::time::timeout(POLL_INTERVAL, socket.recv())
                            .await
                        {
                            Ok(Ok(message)) => {
                                handle_frame(
                                    &mut socket,
                                    message,
                                    &manager,
                                    &sender,
                                )
                                .await;
                            }
                            Ok(Err(e)) => {
                                error!("Receiver failed: {}", e);
                                break;
                            }
                            Err(_elapsed) => continue,
                        }
                    }
                    debug!("Receiver at {} stopped.", bind_endpoint);
                });
            })
            .map_err(|e| Error::Transport(e.to_string()))?;

        bound_rx
            .recv()
            .map_err(|_| {
                Error::Transport("receiver thread exited during bind".to_owned())
            })??;

        Ok(ZmqReceiver {
            endpoint: endpoint.to_owned(),
            stop,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Endpoint this receiver is bound to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stops the receive loop and joins its thread.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        let handle = {
            let mut thread =
                self.thread.lock().unwrap_or_else(|e| e.into_inner());
            thread.take()
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for ZmqReceiver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decodes one frame and delivers it to the destination mailbox.
async fn handle_frame(
    socket: &mut RouterSocket,
    message: ZmqMessage,
    manager: &ManagerHandle,
    sender: &Arc<dyn RemoteSender>,
) {
    let Some(identity) = message.get(0).cloned() else {
        return;
    };
    let Some(data) = message.get(1) else {
        warn!("Dropping frame without payload.");
        return;
    };

    let frame = match WireFrame::from_bytes(data) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Dropping undecodable frame: {}", e);
            return;
        }
    };
    let msg = match WireCodec::decode(frame.kind, &frame.payload) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Dropping frame of kind {}: {}", frame.kind, e);
            return;
        }
    };

    let sender_ref = match (&frame.sender_actor, &frame.sender_endpoint) {
        (Some(name), Some(endpoint)) => {
            ActorRef::remote(name, endpoint, sender.clone())
        }
        _ => ActorRef::Null,
    };

    let target = manager.get_local_actor(&frame.receiver);
    if target.is_null() {
        warn!(
            "No local actor '{}' for remote message of kind {}.",
            frame.receiver, frame.kind
        );
        return;
    }

    if frame.is_fast {
        // Relay the synchronous round trip into the local mailbox and
        // route the reply back to the requesting peer.
        match target.fast_send(msg, sender_ref) {
            Ok(Some(reply)) => {
                let payload = match WireCodec::encode(reply.as_ref()) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!("Could not encode reply: {}", e);
                        return;
                    }
                };
                let reply_frame = WireFrame {
                    sender_actor: Some(frame.receiver.clone()),
                    sender_endpoint: None,
                    receiver: frame.sender_actor.clone().unwrap_or_default(),
                    kind: reply.kind(),
                    is_fast: false,
                    request_id: frame.request_id,
                    payload,
                };
                let bytes = match reply_frame.to_bytes() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!("Could not serialize reply: {}", e);
                        return;
                    }
                };
                let mut reply_message = ZmqMessage::from(bytes);
                reply_message.push_front(identity);
                if let Err(e) = socket.send(reply_message).await {
                    error!("Could not send reply: {}", e);
                }
            }
            Ok(None) => debug!(
                "No reply produced for fast message of kind {}.",
                frame.kind
            ),
            Err(e) => {
                warn!("Fast delivery to '{}' failed: {}", frame.receiver, e)
            }
        }
    } else {
        target.send(msg, sender_ref);
    }
}
