//! Dispatch events handed to the shard's owner.

use serde::de::DeserializeOwned;
use shardline_proto::{ProtoError, ReceivePacket};

/// An application event received through a dispatch envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEvent {
    /// Event name, e.g. `MESSAGE_CREATE`.
    pub name: String,
    /// Sequence number of the dispatch.
    pub seq: Option<u64>,
    /// Raw JSON payload.
    pub data: String,
}

impl DispatchEvent {
    /// Decode the payload as `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtoError> {
        serde_json::from_str(&self.data).map_err(|e| ProtoError::Decoding(e.to_string()))
    }
}

impl From<&ReceivePacket> for DispatchEvent {
    fn from(packet: &ReceivePacket) -> Self {
        Self {
            name: packet.event.clone(),
            seq: packet.seq,
            data: packet.data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_packet() {
        let packet = ReceivePacket::decode(
            br#"{"op":0,"t":"MESSAGE_CREATE","s":3,"d":{"content":"hello"}}"#,
        )
        .expect("decode");

        let event = DispatchEvent::from(&packet);
        assert_eq!(event.name, "MESSAGE_CREATE");
        assert_eq!(event.seq, Some(3));

        let payload: serde_json::Value = event.payload().expect("payload");
        assert_eq!(payload["content"], "hello");
    }
}
