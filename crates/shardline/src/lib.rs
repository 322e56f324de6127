//! # shardline
//!
//! Client for one shard of a sharded realtime gateway.
//!
//! A [`Shard`] dials the gateway, waits for hello, identifies (or resumes an
//! earlier session), and then keeps the connection alive with heartbeats
//! until it fails. Failures the gateway allows us to recover from reconnect
//! and resume; the rest end [`Shard::open`] with the error.
//!
//! ```no_run
//! use shardline::{Identify, Shard, ShardOptions};
//!
//! # async fn run() -> Result<(), shardline::ShardError> {
//! let identify = Identify::new("token").with_shard(0, 1);
//! let shard = Shard::new(ShardOptions::new("wss://gateway.example.com", identify))?;
//! shard.open().await
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod connection;
pub mod error;
pub mod events;
mod heartbeat;
pub mod limiter;
pub mod options;
pub mod pool;
pub mod session;
pub mod shard;
pub mod state;

pub use error::{BoxError, CloseReason, ShardError};
pub use events::DispatchEvent;
pub use limiter::Limiter;
pub use options::{FrameSink, LineSink, PacketHook, ShardOptions};
pub use pool::{PacketPool, PooledPacket};
pub use session::Session;
pub use shard::Shard;
pub use state::ShardState;

pub use shardline_proto::{CloseCode, GatewayOp, Identify, ReceivePacket};
