//! # Conduit Client
//! A network client that keeps one connection to a server alive on a
//! dedicated thread, reconnecting with backoff after failures, and exchanges
//! envelopes with the application through lock-free queues.

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
        BoundedQueue, CancelToken, ChannelId, ClientSocket, DisconnectCause, Envelope, HostConfig,
        Packet, PeerId, QueueConfig, QueueSize, Reliability, SocketEvent, TransportError,
    };
}

mod client;
mod error;

pub use client::{Client, ClientConfig, ClientState, ClientStats, ReconnectBackoff};
pub use error::{ClientSendError, ConduitClientError};
