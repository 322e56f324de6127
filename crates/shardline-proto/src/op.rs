//! Gateway operation codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operation code carried in the `op` field of every envelope.
///
/// The integer values are fixed by the remote protocol. Values this client
/// does not know decode as [`GatewayOp::Unknown`] so a gateway adding an op
/// does not break older shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum GatewayOp {
    /// An application event, with a name (`t`) and a sequence number (`s`).
    Dispatch,
    /// Heartbeat, sent periodically by the client or requested by the server.
    Heartbeat,
    /// Start a new session.
    Identify,
    /// Update the client presence.
    PresenceUpdate,
    /// Join, leave or move between voice channels.
    VoiceStateUpdate,
    /// Resume a previous session.
    Resume,
    /// Server asks the client to reconnect and resume.
    Reconnect,
    /// Request guild member chunks.
    RequestGuildMembers,
    /// The session was invalidated; `d` says whether it can be resumed.
    InvalidSession,
    /// First packet after connecting, carries the heartbeat interval.
    Hello,
    /// Acknowledges a heartbeat.
    HeartbeatAck,
    /// An op this client has no name for.
    Unknown(u8),
}

impl GatewayOp {
    /// Whether the client may send this op.
    #[must_use]
    pub const fn is_send(self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::Identify
                | Self::PresenceUpdate
                | Self::VoiceStateUpdate
                | Self::Resume
                | Self::RequestGuildMembers
        )
    }

    /// Whether the server may send this op.
    #[must_use]
    pub const fn is_receive(self) -> bool {
        matches!(
            self,
            Self::Dispatch
                | Self::Heartbeat
                | Self::Reconnect
                | Self::InvalidSession
                | Self::Hello
                | Self::HeartbeatAck
        )
    }

    /// Whether the op has a name in this client.
    #[must_use]
    pub const fn is_known(self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<GatewayOp> for u8 {
    fn from(op: GatewayOp) -> Self {
        match op {
            GatewayOp::Dispatch => 0,
            GatewayOp::Heartbeat => 1,
            GatewayOp::Identify => 2,
            GatewayOp::PresenceUpdate => 3,
            GatewayOp::VoiceStateUpdate => 4,
            GatewayOp::Resume => 6,
            GatewayOp::Reconnect => 7,
            GatewayOp::RequestGuildMembers => 8,
            GatewayOp::InvalidSession => 9,
            GatewayOp::Hello => 10,
            GatewayOp::HeartbeatAck => 11,
            GatewayOp::Unknown(value) => value,
        }
    }
}

impl From<u8> for GatewayOp {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            4 => Self::VoiceStateUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for GatewayOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(value) => write!(f, "Unknown({value})"),
            op => write!(f, "{op:?}({})", u8::from(*op)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(GatewayOp::Dispatch, 0)]
    #[test_case(GatewayOp::Heartbeat, 1)]
    #[test_case(GatewayOp::Identify, 2)]
    #[test_case(GatewayOp::Resume, 6)]
    #[test_case(GatewayOp::Reconnect, 7)]
    #[test_case(GatewayOp::InvalidSession, 9)]
    #[test_case(GatewayOp::Hello, 10)]
    #[test_case(GatewayOp::HeartbeatAck, 11)]
    fn op_wire_values(op: GatewayOp, value: u8) {
        assert_eq!(u8::from(op), value);
        assert_eq!(GatewayOp::from(value), op);
        assert_eq!(serde_json::to_string(&op).ok(), Some(value.to_string()));
    }

    #[test_case(5 ; "gap in the table")]
    #[test_case(12 ; "past the end")]
    #[test_case(255 ; "max")]
    fn unknown_ops_keep_their_value(value: u8) {
        let op: GatewayOp = serde_json::from_str(&value.to_string()).expect("decode");
        assert_eq!(op, GatewayOp::Unknown(value));
        assert!(!op.is_known());
        assert!(!op.is_receive());
        assert_eq!(u8::from(op), value);
    }

    #[test]
    fn out_of_range_op_is_rejected() {
        assert!(serde_json::from_str::<GatewayOp>("256").is_err());
    }

    #[test]
    fn direction() {
        assert!(GatewayOp::Identify.is_send());
        assert!(!GatewayOp::Identify.is_receive());
        assert!(GatewayOp::Hello.is_receive());
        assert!(!GatewayOp::Hello.is_send());
        // Heartbeats flow both ways.
        assert!(GatewayOp::Heartbeat.is_send());
        assert!(GatewayOp::Heartbeat.is_receive());
    }

    #[test]
    fn display_includes_value() {
        assert_eq!(GatewayOp::HeartbeatAck.to_string(), "HeartbeatAck(11)");
        assert_eq!(GatewayOp::Unknown(12).to_string(), "Unknown(12)");
    }
}
