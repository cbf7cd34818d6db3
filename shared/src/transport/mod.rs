pub mod error;
pub mod framing;
mod host_config;

cfg_if! {
    if #[cfg(feature = "transport_quic")] {
        pub mod quic;
    } else {}
}

pub use error::TransportError;
pub use host_config::HostConfig;

pub use inner::{ClientSocket, DisconnectCause, ServerSocket, SocketEvent};

mod inner {

    use std::time::Duration;

    use crate::{
        envelope::Packet,
        types::{ChannelId, PeerId},
    };

    use super::TransportError;

    /// Why a connection ended
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum DisconnectCause {
        /// The remote side closed the connection on purpose
        Graceful,
        /// The connection stopped answering
        TimedOut,
        /// The remote host refused the connection attempt
        Refused,
        /// Any other transport-specific reason
        Other(u32),
    }

    impl DisconnectCause {
        /// Wire value used by transports that carry the cause as an integer
        pub const GRACEFUL_CODE: u32 = 1;

        pub fn from_code(code: u32) -> Self {
            if code == Self::GRACEFUL_CODE {
                DisconnectCause::Graceful
            } else {
                DisconnectCause::Other(code)
            }
        }

        pub fn code(&self) -> u32 {
            match self {
                DisconnectCause::Graceful => Self::GRACEFUL_CODE,
                DisconnectCause::TimedOut => 2,
                DisconnectCause::Refused => 3,
                DisconnectCause::Other(code) => *code,
            }
        }
    }

    /// The outcome of one poll of a transport host
    #[derive(Debug)]
    pub enum SocketEvent {
        Connect {
            peer: PeerId,
        },
        Receive {
            peer: PeerId,
            channel: ChannelId,
            payload: Box<[u8]>,
        },
        Disconnect {
            peer: PeerId,
            cause: DisconnectCause,
        },
        /// The timeout elapsed with nothing to report
        None,
    }

    pub trait ServerSocket {
        /// Waits at most `timeout` for the next event
        fn service(&mut self, timeout: Duration) -> Result<SocketEvent, TransportError>;
        /// Queues `packet` for `peer`. The transport drops the packet once it
        /// is done with it, which releases the underlying envelope.
        fn send(
            &mut self,
            peer: PeerId,
            channel: ChannelId,
            packet: Packet,
        ) -> Result<(), TransportError>;
        /// Asks the transport to close the connection to `peer`
        fn disconnect(&mut self, peer: PeerId, cause: DisconnectCause);
    }

    pub trait ClientSocket {
        /// Starts a connection attempt to the configured remote host. The
        /// outcome arrives later as a Connect or Disconnect event.
        fn connect(&mut self) -> Result<(), TransportError>;
        /// Waits at most `timeout` for the next event
        fn service(&mut self, timeout: Duration) -> Result<SocketEvent, TransportError>;
        /// Queues `packet` for the remote host
        fn send(&mut self, channel: ChannelId, packet: Packet) -> Result<(), TransportError>;
        /// Drops the current connection, if any, without waiting for the
        /// remote side
        fn reset(&mut self);
    }
}
