cfg_if! {
    if #[cfg(feature = "transport_quic")] {
        pub mod quic;
    } else {}
}

pub use conduit_shared::transport::{ClientSocket, DisconnectCause, SocketEvent, TransportError};
