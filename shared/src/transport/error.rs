use std::net::SocketAddr;

use thiserror::Error;

use crate::types::{ChannelId, PeerId};

/// Errors that can occur inside a transport socket
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transport host could not be created
    #[error("Failed to initialize transport: {reason}")]
    InitFailed { reason: String },

    /// The host could not bind its listen address
    #[error("Failed to bind transport host to {addr}: {reason}")]
    BindFailed { addr: SocketAddr, reason: String },

    /// A packet was addressed to a peer the transport does not know
    #[error("Peer {peer} is not connected to this host")]
    UnknownPeer { peer: PeerId },

    /// A packet was addressed to a channel the host was not created with
    #[error("Channel {channel} is out of range, host has {channel_count} channels")]
    InvalidChannel {
        channel: ChannelId,
        channel_count: u32,
    },

    /// The transport could not queue a packet
    #[error("Failed to send packet: {reason}")]
    SendFailed { reason: String },

    /// The client socket has no live connection to send on
    #[error("No connection to the remote host")]
    NotConnected,

    /// The transport was shut down underneath its user
    #[error("Transport host has been shut down")]
    Closed,
}
