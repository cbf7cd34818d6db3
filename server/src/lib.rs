//! # Conduit Server
//! A network host that accepts client connections over a pluggable
//! transport, assigns each one a session id and moves envelopes between the
//! transport and application threads through lock-free queues.

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

#[macro_use]
extern crate cfg_if;

pub mod transport;
pub mod shared {
    pub use conduit_shared::{
        BoundedQueue, CancelToken, ChannelId, DisconnectCause, Envelope, HostConfig, Packet,
        PeerId, QueueConfig, QueueSize, Reliability, ServerSocket, SessionId, SocketEvent,
        TransportError,
    };
}

mod error;
mod server;
mod session;

pub use error::ConduitServerError;
pub use server::{Server, ServerConfig, ServerHandle, ServerStats};
pub use session::SessionTable;
