use std::{default::Default, net::SocketAddr};

/// Contains Config properties used to create a transport host
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Address the server host binds to
    pub listen_addr: SocketAddr,
    /// Maximum simultaneous peers; further connects are refused
    pub max_connections: usize,
    /// Number of channels per connection
    pub channel_count: u32,
    /// Incoming bandwidth limit in bytes/second, 0 for unlimited. Advisory
    /// for transports that cannot shape traffic.
    pub incoming_bandwidth: u32,
    /// Outgoing bandwidth limit in bytes/second, 0 for unlimited. Advisory
    /// for transports that cannot shape traffic.
    pub outgoing_bandwidth: u32,
}

impl HostConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Self::default()
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 14191)),
            max_connections: 256,
            channel_count: 1,
            incoming_bandwidth: 0,
            outgoing_bandwidth: 0,
        }
    }
}
