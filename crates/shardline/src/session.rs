//! Session identity shared between the read loop and the heartbeat task.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use shardline_proto::Resume;

/// Session id and last seen sequence number.
///
/// Only the read loop writes the id. The sequence is written by the read loop
/// and read by the heartbeat task, so it lives in an atomic.
#[derive(Debug, Default)]
pub struct Session {
    id: RwLock<String>,
    seq: AtomicU64,
}

impl Session {
    /// Create an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh session has neither an id nor a sequence and must identify.
    /// Anything else resumes.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.id.read().is_empty() && self.sequence() == 0
    }

    /// Current session id; empty when none.
    #[must_use]
    pub fn id(&self) -> String {
        self.id.read().clone()
    }

    /// Store the id from a ready event.
    pub fn set_id(&self, id: impl Into<String>) {
        *self.id.write() = id.into();
    }

    /// Last sequence number seen.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }

    /// Record a dispatch sequence number. The stored value never decreases;
    /// returns the value after the update.
    pub fn observe(&self, seq: u64) -> u64 {
        self.seq.fetch_max(seq, Ordering::AcqRel).max(seq)
    }

    /// Forget the session so the next connection identifies.
    pub fn reset(&self) {
        self.id.write().clear();
        self.seq.store(0, Ordering::Release);
    }

    /// Build a resume payload for this session.
    #[must_use]
    pub fn resume(&self, token: &str) -> Resume {
        Resume {
            token: token.to_string(),
            session_id: self.id(),
            seq: self.sequence(),
        }
    }
}
