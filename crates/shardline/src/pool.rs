//! Reusable inbound packets.

use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;
use shardline_proto::ReceivePacket;

/// Default number of idle packets kept around.
pub const DEFAULT_POOL_CAPACITY: usize = 8;

/// A free list of [`ReceivePacket`]s so the read loop does not allocate
/// fresh buffers for every frame.
#[derive(Debug)]
pub struct PacketPool {
    idle: Mutex<Vec<ReceivePacket>>,
    capacity: usize,
}

impl Default for PacketPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl PacketPool {
    /// Create a pool keeping at most `capacity` idle packets.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Take a packet from the pool, or a new one when it is empty.
    ///
    /// The packet returns to the pool when the guard is dropped.
    pub fn acquire(&self) -> PooledPacket<'_> {
        let packet = self.idle.lock().pop().unwrap_or_default();
        PooledPacket { packet, pool: self }
    }

    /// Number of idle packets.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, mut packet: ReceivePacket) {
        packet.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(packet);
        }
    }
}

/// A packet borrowed from a [`PacketPool`].
#[derive(Debug)]
pub struct PooledPacket<'a> {
    packet: ReceivePacket,
    pool: &'a PacketPool,
}

impl Deref for PooledPacket<'_> {
    type Target = ReceivePacket;

    fn deref(&self) -> &Self::Target {
        &self.packet
    }
}

impl DerefMut for PooledPacket<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.packet
    }
}

impl Drop for PooledPacket<'_> {
    fn drop(&mut self) {
        let packet = std::mem::take(&mut self.packet);
        self.pool.release(packet);
    }
}
