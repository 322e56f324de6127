//! WebSocket close codes and the reconnect classifier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A close code received in a WebSocket close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure.
    pub const NORMAL: Self = Self(1000);
    /// The peer is going away.
    pub const GOING_AWAY: Self = Self(1001);
    /// Close frame without a status code.
    pub const NO_STATUS: Self = Self(1005);
    /// Connection dropped without a close frame.
    pub const ABNORMAL: Self = Self(1006);

    /// Unknown error on the remote side.
    pub const UNKNOWN_ERROR: Self = Self(4000);
    /// An invalid op code was sent.
    pub const UNKNOWN_OPCODE: Self = Self(4001);
    /// An invalid payload was sent.
    pub const DECODE_ERROR: Self = Self(4002);
    /// A payload was sent before identifying.
    pub const NOT_AUTHENTICATED: Self = Self(4003);
    /// The identify token was rejected.
    pub const AUTHENTICATION_FAILED: Self = Self(4004);
    /// More than one identify was sent.
    pub const ALREADY_AUTHENTICATED: Self = Self(4005);
    /// The resume sequence was invalid.
    pub const INVALID_SEQ: Self = Self(4007);
    /// Payloads were sent too quickly.
    pub const RATE_LIMITED: Self = Self(4008);
    /// The session timed out.
    pub const SESSION_TIMEOUT: Self = Self(4009);
    /// The shard id or count was invalid.
    pub const INVALID_SHARD: Self = Self(4010);
    /// The session would handle too many guilds; sharding is required.
    pub const SHARDING_REQUIRED: Self = Self(4011);
    /// Invalid API version.
    pub const INVALID_VERSION: Self = Self(4012);
    /// Invalid intents.
    pub const INVALID_INTENTS: Self = Self(4013);
    /// Intents the client is not allowed to use.
    pub const DISALLOWED_INTENTS: Self = Self(4014);

    /// Codes after which reconnecting can never succeed.
    pub const UNRECOVERABLE: [Self; 3] = [
        Self::AUTHENTICATION_FAILED,
        Self::INVALID_SHARD,
        Self::SHARDING_REQUIRED,
    ];

    /// Whether a connection closed with this code may be reopened.
    ///
    /// Total over `u16`: only the three codes in [`Self::UNRECOVERABLE`] are
    /// fatal; every other code, known or not, is recoverable.
    #[must_use]
    pub fn is_recoverable(self) -> bool {
        !Self::UNRECOVERABLE.contains(&self)
    }

    /// Name of a well-known code.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            1000 => "normal",
            1001 => "going away",
            1005 => "no status",
            1006 => "abnormal",
            4000 => "unknown error",
            4001 => "unknown opcode",
            4002 => "decode error",
            4003 => "not authenticated",
            4004 => "authentication failed",
            4005 => "already authenticated",
            4007 => "invalid seq",
            4008 => "rate limited",
            4009 => "session timeout",
            4010 => "invalid shard",
            4011 => "sharding required",
            4012 => "invalid version",
            4013 => "invalid intents",
            4014 => "disallowed intents",
            _ => return None,
        })
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.0
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({name})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(4004 ; "authentication failed")]
    #[test_case(4010 ; "invalid shard")]
    #[test_case(4011 ; "sharding required")]
    fn denylisted_codes_are_fatal(code: u16) {
        assert!(!CloseCode(code).is_recoverable());
    }

    #[test_case(1000 ; "normal")]
    #[test_case(1001 ; "going away")]
    #[test_case(1006 ; "abnormal")]
    #[test_case(4000 ; "unknown error")]
    #[test_case(4007 ; "invalid seq")]
    #[test_case(4009 ; "session timeout")]
    #[test_case(4014 ; "disallowed intents")]
    #[test_case(4999 ; "unassigned")]
    fn other_codes_are_recoverable(code: u16) {
        assert!(CloseCode(code).is_recoverable());
    }

    #[test]
    fn display() {
        assert_eq!(CloseCode::INVALID_SHARD.to_string(), "4010 (invalid shard)");
        assert_eq!(CloseCode(4321).to_string(), "4321");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn classification_is_total(code: u16) {
                let fatal = code == 4004 || code == 4010 || code == 4011;
                prop_assert_eq!(CloseCode(code).is_recoverable(), !fatal);
            }
        }
    }
}
