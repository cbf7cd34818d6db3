use std::io;

use thiserror::Error;

use conduit_shared::TransportError;

use crate::ClientState;

/// Errors that prevent a client from starting
#[derive(Debug, Error)]
pub enum ConduitClientError {
    /// The transport host could not be created on the client thread
    #[error("Failed to create the client transport host: {source}")]
    TransportInit {
        #[source]
        source: TransportError,
    },

    /// The client thread could not be spawned
    #[error("Failed to spawn the client thread")]
    ThreadSpawn {
        #[source]
        source: io::Error,
    },

    /// The client thread ended before reporting whether its transport started
    #[error("The client thread exited during startup")]
    ThreadExited,
}

/// Why [`Client::send`](crate::Client::send) refused an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClientSendError {
    #[error("Cannot send while the client is {state:?}")]
    NotConnected { state: ClientState },
}
