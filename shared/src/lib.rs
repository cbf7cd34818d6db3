//! # Conduit Shared
//! Lock-free queues, work stealing and the transport contract shared
//! between conduit-server & conduit-client crates.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

#[macro_use]
extern crate cfg_if;

mod cancel_token;
mod envelope;
mod queue;
mod steal;
mod types;

pub mod transport;

pub use cancel_token::CancelToken;
pub use envelope::{Envelope, Packet, Reliability};
pub use queue::{
    proper_size, BoundedQueue, NoOverflow, OverflowPolicy, QueueConfig, QueueSize, DEFAULT_RETRY,
};
pub use steal::{
    DrainJob, StealerConfig, StealerHandle, StealerPool, StealerPoolError, WorkStealing,
    WorkStealingQueue, DEFAULT_STEAL_THREADS,
};
pub use transport::{
    ClientSocket, DisconnectCause, HostConfig, ServerSocket, SocketEvent, TransportError,
};
pub use types::{ChannelId, PeerId, SessionId};
