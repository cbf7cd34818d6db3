cfg_if! {
    if #[cfg(feature = "transport_quic")] {
        pub mod quic;
    } else {}
}

pub use conduit_shared::transport::{
    DisconnectCause, HostConfig, ServerSocket, SocketEvent, TransportError,
};
