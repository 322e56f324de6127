//! # shardline-proto
//!
//! Wire vocabulary for gateway shard communication.
//!
//! This crate only describes what travels over the socket: operation codes,
//! close codes, the generic `{op, d, s, t}` envelope, and the handful of
//! control payloads the shard itself has to understand. It performs no I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod close;
pub mod error;
pub mod op;
pub mod packet;
pub mod payloads;

pub use close::CloseCode;
pub use error::ProtoError;
pub use op::GatewayOp;
pub use packet::{ReceivePacket, SendPacket};
pub use payloads::{
    Hello, Identify, IdentifyProperties, InvalidSession, Ready, Resume, Resumed, EVENT_READY,
    EVENT_RESUMED,
};
