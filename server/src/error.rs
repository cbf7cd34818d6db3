use thiserror::Error;

use conduit_shared::TransportError;

/// Errors surfaced by the server host
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConduitServerError {
    /// The transport host could not be created from its configuration
    #[error("Failed to create the server transport host: {source}")]
    TransportInit {
        #[source]
        source: TransportError,
    },

    /// The transport failed while servicing events
    #[error("Server transport failed: {source}")]
    Transport {
        #[source]
        source: TransportError,
    },

    /// Every session id up to the configured maximum is in use
    #[error("No free session id left, all ids up to {max} are assigned")]
    SessionIdExhausted { max: u32 },
}
