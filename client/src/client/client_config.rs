use std::{default::Default, net::SocketAddr, time::Duration};

use conduit_shared::{QueueConfig, QueueSize};

use super::ReconnectBackoff;

/// Contains Config properties which will be used by the Client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Address of the server to connect to
    pub server_addr: SocketAddr,
    /// Number of channels to open with the server
    pub channel_count: u32,
    /// Queue of envelopes received from the server
    pub inbound: QueueConfig,
    /// Queue of envelopes waiting to be sent
    pub outbound: QueueConfig,
    /// How long one loop iteration waits on the transport for an event
    pub poll_timeout: Duration,
    /// A connection attempt still pending after this long counts as failed
    pub connect_timeout: Duration,
    /// Delay between a failure and the next attempt
    pub backoff: ReconnectBackoff,
}

impl ClientConfig {
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 14191)),
            channel_count: 1,
            inbound: QueueSize::K2.into(),
            outbound: QueueSize::K2.into(),
            poll_timeout: Duration::from_millis(1),
            connect_timeout: Duration::from_secs(5),
            backoff: ReconnectBackoff::default(),
        }
    }
}
