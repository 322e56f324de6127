//! Error types for shardline.

use std::fmt;

use shardline_proto::{CloseCode, GatewayOp, ProtoError};
use thiserror::Error;

/// Boxed error returned by caller-supplied hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why the shard closed its own connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The owner called [`crate::Shard::close`].
    Requested,
    /// The gateway sent a reconnect request.
    ReconnectRequested,
    /// A heartbeat went a full interval without acknowledgement.
    HeartbeatUnacknowledged,
}

impl CloseReason {
    /// Whether the shard should reconnect after closing for this reason.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        !matches!(self, Self::Requested)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requested => "close requested",
            Self::ReconnectRequested => "reconnect requested by gateway",
            Self::HeartbeatUnacknowledged => "heartbeat unacknowledged",
        })
    }
}

/// Errors that can occur while running a shard.
#[derive(Debug, Error)]
pub enum ShardError {
    /// No gateway URL was configured.
    #[error("gateway URL is not configured")]
    GatewayAbsent,

    /// Invalid options.
    #[error("configuration error: {0}")]
    Config(String),

    /// Opening the socket failed.
    #[error("failed to connect to gateway: {0}")]
    Dial(String),

    /// The gateway closed the connection with a close frame.
    #[error("gateway closed the connection with code {code}: {reason}")]
    RemoteClosed {
        /// Close code from the frame.
        code: CloseCode,
        /// Close reason from the frame.
        reason: String,
    },

    /// The socket dropped without a close frame.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The shard closed the connection itself.
    #[error("connection closed: {0}")]
    Closed(CloseReason),

    /// Writing a frame failed.
    #[error("failed to write frame: {0}")]
    Write(String),

    /// A specific op was required during the handshake.
    #[error("expected op {expected}, got {actual}")]
    UnexpectedOp {
        /// Required op.
        expected: GatewayOp,
        /// Op received.
        actual: GatewayOp,
    },

    /// A specific dispatch event was required during the handshake.
    #[error("expected event {expected}, got {actual:?}")]
    UnexpectedEvent {
        /// Required event name.
        expected: &'static str,
        /// Event name received.
        actual: String,
    },

    /// Malformed envelope or payload.
    #[error("protocol error: {0}")]
    Proto(#[from] ProtoError),

    /// The packet hook rejected a packet.
    #[error("packet hook failed: {0}")]
    Hook(#[source] BoxError),

    /// Mirroring a raw frame failed.
    #[error("output mirror failed: {0}")]
    Output(#[source] std::io::Error),

    /// `open` was called while the shard was already running.
    #[error("shard is already open")]
    AlreadyOpen,

    /// No connection is currently established.
    #[error("shard is not connected")]
    NotConnected,
}

impl ShardError {
    /// Whether the shard should reconnect after a connection attempt ended
    /// with this error.
    ///
    /// Close frames are judged by their close code. A dropped socket or a
    /// failed write on an established connection is recoverable, as are the
    /// shard's own closes except an explicit [`CloseReason::Requested`].
    /// Everything else ends the shard.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::RemoteClosed { code, .. } => code.is_recoverable(),
            Self::ConnectionLost(_) | Self::Write(_) => true,
            Self::Closed(reason) => reason.is_recoverable(),
            _ => false,
        }
    }

    /// Close code carried by the error, if any.
    #[must_use]
    pub const fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::RemoteClosed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn remote(code: u16) -> ShardError {
        ShardError::RemoteClosed {
            code: CloseCode(code),
            reason: String::new(),
        }
    }

    #[test_case(remote(4004), false ; "authentication failed")]
    #[test_case(remote(4010), false ; "invalid shard")]
    #[test_case(remote(4011), false ; "sharding required")]
    #[test_case(remote(4000), true ; "unknown error")]
    #[test_case(remote(1000), true ; "normal close")]
    #[test_case(remote(4009), true ; "session timeout")]
    #[test_case(ShardError::ConnectionLost("reset".into()), true ; "dropped socket")]
    #[test_case(ShardError::Write("broken pipe".into()), true ; "failed write")]
    #[test_case(ShardError::Closed(CloseReason::HeartbeatUnacknowledged), true ; "missed heartbeat")]
    #[test_case(ShardError::Closed(CloseReason::ReconnectRequested), true ; "reconnect request")]
    #[test_case(ShardError::Closed(CloseReason::Requested), false ; "owner close")]
    #[test_case(ShardError::GatewayAbsent, false ; "no url")]
    #[test_case(ShardError::Dial("refused".into()), false ; "dial failure")]
    #[test_case(ShardError::UnexpectedOp { expected: GatewayOp::Hello, actual: GatewayOp::Dispatch }, false ; "protocol violation")]
    #[test_case(ShardError::Proto(ProtoError::Decoding("eof".into())), false ; "decode failure")]
    fn recoverability(err: ShardError, expected: bool) {
        assert_eq!(err.is_recoverable(), expected);
    }

    #[test]
    fn remote_closed_display() {
        let err = ShardError::RemoteClosed {
            code: CloseCode::AUTHENTICATION_FAILED,
            reason: "bad token".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "gateway closed the connection with code 4004 (authentication failed): bad token"
        );
        assert_eq!(err.close_code(), Some(CloseCode::AUTHENTICATION_FAILED));
    }

    #[test]
    fn unexpected_event_display() {
        let err = ShardError::UnexpectedEvent {
            expected: "READY",
            actual: "GUILD_CREATE".to_string(),
        };
        assert_eq!(err.to_string(), r#"expected event READY, got "GUILD_CREATE""#);
    }

    #[test]
    fn close_reason_display() {
        assert_eq!(
            ShardError::Closed(CloseReason::HeartbeatUnacknowledged).to_string(),
            "connection closed: heartbeat unacknowledged"
        );
    }
}
