//! Gateway envelopes.
//!
//! Every frame on the socket is a JSON object `{op, d, s, t}`. Inbound frames
//! decode into [`ReceivePacket`], which keeps `d` as raw JSON text so the
//! shard can route on `op`/`t` without committing to a payload type. The
//! packet owns its buffers and is meant to be reused: [`ReceivePacket::decode_into`]
//! overwrites every field, so nothing from a previous frame survives.

use std::borrow::Cow;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::ProtoError;
use crate::op::GatewayOp;

const NULL: &str = "null";

/// Borrowed view of a frame, used only while decoding.
#[derive(Deserialize)]
struct RawPacket<'a> {
    op: GatewayOp,
    #[serde(borrow, default)]
    d: Option<&'a RawValue>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(borrow, default)]
    t: Option<Cow<'a, str>>,
}

/// An inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivePacket {
    /// Operation code.
    pub op: GatewayOp,
    /// Event name; empty unless `op` is [`GatewayOp::Dispatch`].
    pub event: String,
    /// Raw JSON payload; `null` when the decoded frame carried none, empty
    /// before the first decode.
    pub data: String,
    /// Sequence number of a dispatch.
    pub seq: Option<u64>,
}

impl Default for ReceivePacket {
    fn default() -> Self {
        Self {
            op: GatewayOp::Dispatch,
            event: String::new(),
            data: String::new(),
            seq: None,
        }
    }
}

impl ReceivePacket {
    /// Decode a frame into a new packet.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a valid envelope.
    pub fn decode(frame: &[u8]) -> Result<Self, ProtoError> {
        let mut packet = Self::default();
        packet.decode_into(frame)?;
        Ok(packet)
    }

    /// Decode a frame into this packet, reusing its buffers.
    ///
    /// All fields are overwritten. On error the packet is reset rather than
    /// left half-written.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a valid envelope.
    pub fn decode_into(&mut self, frame: &[u8]) -> Result<(), ProtoError> {
        let raw: RawPacket<'_> = match serde_json::from_slice(frame) {
            Ok(raw) => raw,
            Err(e) => {
                self.reset();
                return Err(ProtoError::decoding(&e));
            }
        };

        self.op = raw.op;
        self.seq = raw.s;
        self.event.clear();
        if let Some(t) = raw.t {
            self.event.push_str(&t);
        }
        self.data.clear();
        self.data.push_str(raw.d.map_or(NULL, RawValue::get));
        Ok(())
    }

    /// Clear the packet back to its default state, keeping allocations.
    pub fn reset(&mut self) {
        self.op = GatewayOp::Dispatch;
        self.seq = None;
        self.event.clear();
        self.data.clear();
    }

    /// Event name, if the frame had one.
    #[must_use]
    pub fn event(&self) -> Option<&str> {
        (!self.event.is_empty()).then_some(self.event.as_str())
    }

    /// Decode the payload as `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if `d` does not match `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtoError> {
        serde_json::from_str(&self.data).map_err(|e| ProtoError::decoding(&e))
    }
}

/// An outbound envelope.
#[derive(Debug, Clone, Serialize)]
pub struct SendPacket<T> {
    /// Operation code.
    pub op: GatewayOp,
    /// Payload.
    pub d: T,
}

impl<T: Serialize> SendPacket<T> {
    /// Create a packet.
    pub const fn new(op: GatewayOp, d: T) -> Self {
        Self { op, d }
    }

    /// Serialize to a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }
}
