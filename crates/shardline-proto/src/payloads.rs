//! Control payloads the shard reads or writes itself.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Event name of the dispatch that confirms a new session.
pub const EVENT_READY: &str = "READY";
/// Event name of the dispatch that confirms a resumed session.
pub const EVENT_RESUMED: &str = "RESUMED";

/// Payload of [`crate::GatewayOp::Hello`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval: u64,
    /// Servers that handled the connection.
    #[serde(rename = "_trace", default)]
    pub trace: Vec<String>,
}

impl Hello {
    /// Heartbeat interval as a duration.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }
}

/// Payload of the `READY` dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ready {
    /// Gateway protocol version.
    #[serde(rename = "v", default)]
    pub version: u32,
    /// Session to resume on reconnect.
    pub session_id: String,
    /// Servers that handled the identify.
    #[serde(rename = "_trace", default)]
    pub trace: Vec<String>,
    /// `[shard_id, shard_count]` echoed back, when sharding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
}

/// Payload of the `RESUMED` dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Resumed {
    /// Servers that handled the resume.
    #[serde(rename = "_trace", default)]
    pub trace: Vec<String>,
}

/// Client properties sent with identify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system.
    pub os: String,
    /// Library name.
    pub browser: String,
    /// Library name.
    pub device: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: env!("CARGO_PKG_NAME").to_string(),
            device: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

/// Payload of [`crate::GatewayOp::Identify`].
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identify {
    /// Authentication token.
    pub token: String,
    /// Client properties.
    pub properties: IdentifyProperties,
    /// Whether the server may compress individual payloads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<bool>,
    /// Member count above which offline members are omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<u32>,
    /// `[shard_id, shard_count]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<[u32; 2]>,
    /// Initial presence, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<serde_json::Value>,
    /// Gateway intents bitfield.
    #[serde(default)]
    pub intents: u64,
}

impl Identify {
    /// Create an identify payload for a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    /// Set the shard pair.
    #[must_use]
    pub const fn with_shard(mut self, id: u32, count: u32) -> Self {
        self.shard = Some([id, count]);
        self
    }

    /// Set the intents bitfield.
    #[must_use]
    pub const fn with_intents(mut self, intents: u64) -> Self {
        self.intents = intents;
        self
    }

    /// Set the large threshold.
    #[must_use]
    pub const fn with_large_threshold(mut self, threshold: u32) -> Self {
        self.large_threshold = Some(threshold);
        self
    }

    /// Set the initial presence.
    #[must_use]
    pub fn with_presence(mut self, presence: serde_json::Value) -> Self {
        self.presence = Some(presence);
        self
    }
}

// The token never goes to logs.
impl std::fmt::Debug for Identify {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identify")
            .field("token", &"<redacted>")
            .field("properties", &self.properties)
            .field("compress", &self.compress)
            .field("large_threshold", &self.large_threshold)
            .field("shard", &self.shard)
            .field("intents", &self.intents)
            .finish_non_exhaustive()
    }
}

/// Payload of [`crate::GatewayOp::Resume`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resume {
    /// Authentication token.
    pub token: String,
    /// Session to resume.
    pub session_id: String,
    /// Last sequence number received.
    pub seq: u64,
}

impl std::fmt::Debug for Resume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resume")
            .field("token", &"<redacted>")
            .field("session_id", &self.session_id)
            .field("seq", &self.seq)
            .finish()
    }
}

/// Payload of [`crate::GatewayOp::InvalidSession`]: whether the session may
/// still be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvalidSession(pub bool);

impl InvalidSession {
    /// Whether a resume can be attempted.
    #[must_use]
    pub const fn resumable(self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::GatewayOp;
    use crate::packet::{ReceivePacket, SendPacket};

    #[test]
    fn hello_interval() {
        let hello = Hello {
            heartbeat_interval: 41_250,
            trace: Vec::new(),
        };
        assert_eq!(hello.interval(), Duration::from_millis(41_250));
    }

    #[test]
    fn ready_from_dispatch() {
        let packet = ReceivePacket::decode(
            br#"{"op":0,"t":"READY","s":1,"d":{"v":10,"session_id":"abc","_trace":["gw"],"user":{}}}"#,
        )
        .expect("decode");

        let ready: Ready = packet.payload().expect("ready");
        assert_eq!(ready.version, 10);
        assert_eq!(ready.session_id, "abc");
        assert_eq!(ready.trace, vec!["gw".to_string()]);
        assert_eq!(ready.shard, None);
    }

    #[test]
    fn ready_without_session_id_is_rejected() {
        let packet =
            ReceivePacket::decode(br#"{"op":0,"t":"READY","s":1,"d":{"v":10}}"#).expect("decode");
        assert!(packet.payload::<Ready>().is_err());
    }

    #[test]
    fn resumed_without_trace() {
        let packet =
            ReceivePacket::decode(br#"{"op":0,"t":"RESUMED","s":5,"d":{}}"#).expect("decode");
        let resumed: Resumed = packet.payload().expect("resumed");
        assert!(resumed.trace.is_empty());
    }

    #[test]
    fn invalid_session_flag() {
        let packet = ReceivePacket::decode(br#"{"op":9,"d":true}"#).expect("decode");
        let flag: InvalidSession = packet.payload().expect("flag");
        assert!(flag.resumable());

        let packet = ReceivePacket::decode(br#"{"op":9,"d":false}"#).expect("decode");
        let flag: InvalidSession = packet.payload().expect("flag");
        assert!(!flag.resumable());
    }

    #[test]
    fn identify_wire_shape() {
        let identify = Identify::new("token").with_shard(1, 4).with_intents(513);
        let json = SendPacket::new(GatewayOp::Identify, &identify)
            .encode()
            .expect("encode");
        let value: serde_json::Value = serde_json::from_str(&json).expect("json");

        assert_eq!(value["op"], 2);
        assert_eq!(value["d"]["token"], "token");
        assert_eq!(value["d"]["shard"], serde_json::json!([1, 4]));
        assert_eq!(value["d"]["intents"], 513);
        assert!(value["d"].get("compress").is_none());
        assert!(value["d"]["properties"]["os"].is_string());
    }

    #[test]
    fn resume_wire_shape() {
        let resume = Resume {
            token: "token".to_string(),
            session_id: "abc".to_string(),
            seq: 42,
        };
        let json = SendPacket::new(GatewayOp::Resume, &resume)
            .encode()
            .expect("encode");
        assert_eq!(
            json,
            r#"{"op":6,"d":{"token":"token","session_id":"abc","seq":42}}"#
        );
    }

    #[test]
    fn debug_redacts_token() {
        let identify = Identify::new("super-secret");
        assert!(!format!("{identify:?}").contains("super-secret"));

        let resume = Resume {
            token: "super-secret".to_string(),
            session_id: "abc".to_string(),
            seq: 1,
        };
        assert!(!format!("{resume:?}").contains("super-secret"));
    }
}
