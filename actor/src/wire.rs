// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # Wire protocol
//!
//! The `wire` module defines the transport agnostic frame that carries a
//! message across process boundaries, the codec registry that maps kind ids
//! to their serializers, and the `RemoteSender` seam implemented by
//! concrete transport backends.
//!
//! A frame carries the sender name and endpoint (or nothing), the
//! destination actor name, the numeric message kind, the fast flag, an
//! optional request id for reply matching and the kind specific payload.
//! The kind ids are part of the external contract and must not drift.
//!

use crate::{
    error::Error,
    message::{kind, Message, MsgKind},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};
use std::time::Duration;

/// A message serialized for transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFrame {
    /// Name of the sending actor, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_actor: Option<String>,
    /// Endpoint where the sender can be reached, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_endpoint: Option<String>,
    /// Name of the destination actor.
    pub receiver: String,
    /// Kind id of the payload.
    pub kind: MsgKind,
    /// True for the request leg of a synchronous round trip.
    #[serde(default)]
    pub is_fast: bool,
    /// Matches a reply frame to its request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    /// Kind specific payload.
    pub payload: Value,
}

impl WireFrame {
    /// Serializes the frame for transmission.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        serde_json::to_vec(self).map_err(|e| Error::Transport(e.to_string()))
    }

    /// Parses a received frame.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

/// A message that can cross the wire.
///
/// Implemented through [`define_wire_message!`](crate::define_wire_message).
pub trait WireMessage:
    Message + Serialize + DeserializeOwned + Sized + 'static
{
    /// The fixed kind id of this type.
    const KIND: MsgKind;
}

type EncodeFn = fn(&dyn Message) -> Result<Value, Error>;
type DecodeFn = fn(&Value) -> Result<Box<dyn Message>, Error>;

static CODECS: LazyLock<RwLock<HashMap<MsgKind, (EncodeFn, DecodeFn)>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Process wide registry of wire codecs, indexed by kind id.
///
/// The registry protocol and control messages are registered by
/// [`WireCodec::ensure_builtin`]; applications register their own remote
/// capable types once at startup.
pub struct WireCodec;

impl WireCodec {
    /// Registers the codec for a wire message type. Idempotent.
    pub fn register<M: WireMessage>() {
        let mut codecs =
            CODECS.write().unwrap_or_else(|e| e.into_inner());
        codecs.insert(M::KIND, (Self::encode_as::<M>, Self::decode_as::<M>));
    }

    fn encode_as<M: WireMessage>(msg: &dyn Message) -> Result<Value, Error> {
        let concrete = msg.downcast_ref::<M>().ok_or_else(|| {
            Error::Protocol(format!(
                "message of kind {} has an unexpected type",
                msg.kind()
            ))
        })?;
        serde_json::to_value(concrete)
            .map_err(|e| Error::Transport(e.to_string()))
    }

    fn decode_as<M: WireMessage>(
        payload: &Value,
    ) -> Result<Box<dyn Message>, Error> {
        let concrete: M = serde_json::from_value(payload.clone())
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(Box::new(concrete))
    }

    /// Encodes a message into a frame payload.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if no codec is registered for the message kind
    /// and `Transport` if serialization fails.
    pub fn encode(msg: &dyn Message) -> Result<Value, Error> {
        let codecs = CODECS.read().unwrap_or_else(|e| e.into_inner());
        let (encode, _) = codecs.get(&msg.kind()).ok_or_else(|| {
            Error::Protocol(format!(
                "no wire codec registered for kind {}",
                msg.kind()
            ))
        })?;
        encode(msg)
    }

    /// Decodes a frame payload into a message.
    pub fn decode(
        kind: MsgKind,
        payload: &Value,
    ) -> Result<Box<dyn Message>, Error> {
        let codecs = CODECS.read().unwrap_or_else(|e| e.into_inner());
        let (_, decode) = codecs.get(&kind).ok_or_else(|| {
            Error::Protocol(format!("no wire codec registered for kind {kind}"))
        })?;
        decode(payload)
    }

    /// True if a codec is registered for the kind.
    pub fn knows(kind: MsgKind) -> bool {
        let codecs = CODECS.read().unwrap_or_else(|e| e.into_inner());
        codecs.contains_key(&kind)
    }

    /// Registers the control and registry protocol codecs. Idempotent,
    /// called by every component that touches the wire.
    pub fn ensure_builtin() {
        use crate::message::{
            Heartbeat, HeartbeatAck, LookupActor, LookupResult, RegisterActor,
            RegistrationFailed, RegistrationOk, Shutdown, Start, Timeout,
            UnregisterActor,
        };

        if Self::knows(kind::HEARTBEAT) {
            return;
        }
        debug!("Registering builtin wire codecs.");
        Self::register::<Start>();
        Self::register::<Shutdown>();
        Self::register::<Timeout>();
        Self::register::<RegisterActor>();
        Self::register::<UnregisterActor>();
        Self::register::<RegistrationOk>();
        Self::register::<RegistrationFailed>();
        Self::register::<LookupActor>();
        Self::register::<LookupResult>();
        Self::register::<Heartbeat>();
        Self::register::<HeartbeatAck>();
    }
}

/// Transport seam used by remote actor references.
///
/// A backend translates frames into network traffic: `post` is the
/// asynchronous fire and forget path, `request` is the synchronous round
/// trip of `fast_send`.
pub trait RemoteSender: Send + Sync {
    /// Endpoint where this process receives frames, if configured. Stamped
    /// into outgoing frames so the receiving side can reconstruct a sender
    /// reference.
    fn local_endpoint(&self) -> Option<String>;

    /// Transmits a frame without waiting for a reply.
    fn post(&self, endpoint: &str, frame: WireFrame) -> Result<(), Error>;

    /// Transmits a request frame and waits for the matching reply.
    ///
    /// Returns `Ok(None)` when no reply arrives within `timeout`.
    fn request(
        &self,
        endpoint: &str,
        frame: WireFrame,
        timeout: Duration,
    ) -> Result<Option<WireFrame>, Error>;
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::message::{Heartbeat, LookupResult};

    #[test]
    fn test_frame_round_trip() {
        WireCodec::ensure_builtin();
        let heartbeat = Heartbeat::new("mgr1");
        let frame = WireFrame {
            sender_actor: None,
            sender_endpoint: None,
            receiver: "GlobalRegistry".to_owned(),
            kind: heartbeat.kind(),
            is_fast: false,
            request_id: None,
            payload: WireCodec::encode(&heartbeat).unwrap(),
        };
        let bytes = frame.to_bytes().unwrap();
        let parsed = WireFrame::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.kind, kind::HEARTBEAT);
        let msg = WireCodec::decode(parsed.kind, &parsed.payload).unwrap();
        let decoded = msg.downcast_ref::<Heartbeat>().unwrap();
        assert_eq!(decoded.manager_id, "mgr1");
        assert_eq!(decoded.timestamp_ms, heartbeat.timestamp_ms);
    }

    #[test]
    fn test_optional_endpoint_survives_encoding() {
        WireCodec::ensure_builtin();
        let result = LookupResult {
            actor_name: "pong".to_owned(),
            endpoint: None,
            online: false,
        };
        let payload = WireCodec::encode(&result).unwrap();
        let decoded = WireCodec::decode(kind::LOOKUP_RESULT, &payload).unwrap();
        let result = decoded.downcast_ref::<LookupResult>().unwrap();
        assert!(result.endpoint.is_none());
        assert!(!result.online);
    }

    #[test]
    fn test_unknown_kind_is_a_protocol_error() {
        let error = match WireCodec::decode(4242, &Value::Null) {
            Err(e) => e,
            Ok(_) => panic!("expected decode to fail for an unknown kind"),
        };
        assert!(matches!(error, Error::Protocol(_)));
    }
}
