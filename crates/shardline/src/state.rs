//! Shard state types.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Where the shard is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Not connected.
    Disconnected,
    /// Dialing the gateway.
    Connecting,
    /// Connected, waiting for hello.
    AwaitingHello,
    /// Identify sent, waiting for ready.
    Identifying,
    /// Resume sent.
    Resuming,
    /// Steady state: reading and dispatching packets.
    Connected,
    /// `open` returned; the shard will not reconnect on its own.
    Closed,
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Connected => "connected",
            Self::Closed => "closed",
        })
    }
}

/// Atomic wrapper for shard state.
#[derive(Debug)]
pub struct AtomicShardState(AtomicU32);

impl AtomicShardState {
    /// Create a new atomic state.
    #[must_use]
    pub const fn new(state: ShardState) -> Self {
        Self(AtomicU32::new(state as u32))
    }

    /// Load the current state.
    #[must_use]
    pub fn load(&self) -> ShardState {
        match self.0.load(Ordering::SeqCst) {
            0 => ShardState::Disconnected,
            1 => ShardState::Connecting,
            2 => ShardState::AwaitingHello,
            3 => ShardState::Identifying,
            4 => ShardState::Resuming,
            5 => ShardState::Connected,
            _ => ShardState::Closed,
        }
    }

    /// Store a new state.
    pub fn store(&self, state: ShardState) {
        self.0.store(state as u32, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_state_enum() {
        assert_eq!(ShardState::Disconnected as u32, 0);
        assert_eq!(ShardState::Connecting as u32, 1);
        assert_eq!(ShardState::AwaitingHello as u32, 2);
        assert_eq!(ShardState::Identifying as u32, 3);
        assert_eq!(ShardState::Resuming as u32, 4);
        assert_eq!(ShardState::Connected as u32, 5);
        assert_eq!(ShardState::Closed as u32, 6);
    }

    #[test]
    fn test_atomic_shard_state() {
        let state = AtomicShardState::new(ShardState::Disconnected);
        assert_eq!(state.load(), ShardState::Disconnected);

        for next in [
            ShardState::Connecting,
            ShardState::AwaitingHello,
            ShardState::Identifying,
            ShardState::Resuming,
            ShardState::Connected,
            ShardState::Closed,
        ] {
            state.store(next);
            assert_eq!(state.load(), next);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ShardState::AwaitingHello.to_string(), "awaiting hello");
    }
}
