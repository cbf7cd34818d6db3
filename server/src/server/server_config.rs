use std::{default::Default, time::Duration};

use conduit_shared::{HostConfig, QueueConfig, QueueSize};

/// Contains Config properties which will be used by the Server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Used to create the transport host
    pub host: HostConfig,
    /// Queue of envelopes received from clients, waiting for the application
    pub inbound: QueueConfig,
    /// Queue of envelopes the application wants sent
    pub outbound: QueueConfig,
    /// Capacity of the queue of pending disconnect requests
    pub disconnect_queue_size: usize,
    /// How long one service iteration waits on the transport for an event
    pub poll_timeout: Duration,
    /// Largest session id the server will assign
    pub max_session_id: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: HostConfig::default(),
            inbound: QueueSize::K2.into(),
            outbound: QueueSize::K2.into(),
            disconnect_queue_size: QueueSize::K003.slots(),
            poll_timeout: Duration::from_millis(1),
            max_session_id: u32::MAX,
        }
    }
}
