/// In-memory transport for end-to-end testing
/// Routes packets between one server socket and any number of client
/// sockets without network I/O

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex, MutexGuard};

use conduit_shared::{
    ChannelId, ClientSocket, DisconnectCause, HostConfig, Packet, PeerId, ServerSocket,
    SocketEvent, TransportError,
};

/// The "network" both sides of a test talk through.
///
/// Besides routing it lets a test refuse connections, cut a link as if the
/// network failed, and hold on to sent packets to observe when the
/// transport lets go of them.
#[derive(Clone)]
pub struct LocalHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    state: Mutex<HubState>,
    changed: Condvar,
    max_connections: usize,
    channel_count: u32,
}

#[derive(Default)]
struct HubState {
    server_open: bool,
    server_events: VecDeque<SocketEvent>,
    /// Events waiting for each client socket, by endpoint
    client_events: HashMap<u64, VecDeque<SocketEvent>>,
    links: HashMap<PeerId, u64>,
    endpoints: HashMap<u64, PeerId>,
    next_peer: u64,
    next_endpoint: u64,
    refuse: bool,
    hold: bool,
    held: Vec<Packet>,
}

impl HubState {
    fn client_inbox(&mut self, endpoint: u64) -> &mut VecDeque<SocketEvent> {
        self.client_events.entry(endpoint).or_default()
    }

    fn unlink(&mut self, peer: &PeerId) -> Option<u64> {
        let endpoint = self.links.remove(peer)?;
        self.endpoints.remove(&endpoint);
        Some(endpoint)
    }

    fn deliver(&mut self, packet: Packet) {
        if self.hold {
            self.held.push(packet);
        }
    }
}

impl LocalHub {
    pub fn new(host: &HostConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                state: Mutex::new(HubState::default()),
                changed: Condvar::new(),
                max_connections: host.max_connections,
                channel_count: host.channel_count,
            }),
        }
    }

    /// The server end. Clients can connect once it exists.
    pub fn server_socket(&self) -> LocalServerSocket {
        self.update(|state| state.server_open = true);
        LocalServerSocket { hub: self.clone() }
    }

    /// A new client end
    pub fn client_socket(&self) -> LocalClientSocket {
        let endpoint = self.update(|state| {
            state.next_endpoint += 1;
            state.next_endpoint
        });
        LocalClientSocket {
            hub: self.clone(),
            endpoint,
        }
    }

    /// While set, connection attempts are refused
    pub fn refuse_connections(&self, refuse: bool) {
        self.update(|state| state.refuse = refuse);
    }

    /// Cuts the link to `peer` as if the network failed: both sides see a
    /// timed out disconnect
    pub fn drop_link(&self, peer: PeerId) {
        self.update(|state| {
            if let Some(endpoint) = state.unlink(&peer) {
                let cause = DisconnectCause::TimedOut;
                state.server_events.push_back(SocketEvent::Disconnect { peer, cause });
                state
                    .client_inbox(endpoint)
                    .push_back(SocketEvent::Disconnect { peer, cause });
            }
        });
    }

    /// While set, every packet sent through the hub is kept alive by the hub
    /// until [`release_held`](Self::release_held)
    pub fn hold_packets(&self, hold: bool) {
        self.update(|state| state.hold = hold);
    }

    pub fn held_count(&self) -> usize {
        self.inner.state.lock().held.len()
    }

    /// Drops every held packet, releasing its envelope
    pub fn release_held(&self) -> usize {
        let held = self.update(|state| std::mem::take(&mut state.held));
        held.len()
    }

    pub fn connected_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.inner.state.lock().links.keys().copied().collect();
        peers.sort();
        peers
    }

    fn update<R>(&self, f: impl FnOnce(&mut HubState) -> R) -> R {
        let result = {
            let mut state = self.inner.state.lock();
            f(&mut state)
        };
        self.inner.changed.notify_all();
        result
    }

    /// Waits until `take` finds something or `timeout` passes
    fn wait_for<R>(
        &self,
        timeout: Duration,
        mut take: impl FnMut(&mut MutexGuard<'_, HubState>) -> Option<R>,
    ) -> Option<R> {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        loop {
            if let Some(found) = take(&mut state) {
                return Some(found);
            }
            if self
                .inner
                .changed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return take(&mut state);
            }
        }
    }
}

pub struct LocalServerSocket {
    hub: LocalHub,
}

impl ServerSocket for LocalServerSocket {
    fn service(&mut self, timeout: Duration) -> Result<SocketEvent, TransportError> {
        let event = self
            .hub
            .wait_for(timeout, |state| state.server_events.pop_front());
        Ok(event.unwrap_or(SocketEvent::None))
    }

    fn send(
        &mut self,
        peer: PeerId,
        channel: ChannelId,
        packet: Packet,
    ) -> Result<(), TransportError> {
        let channel_count = self.hub.inner.channel_count;
        if channel >= channel_count {
            return Err(TransportError::InvalidChannel {
                channel,
                channel_count,
            });
        }
        self.hub.update(|state| -> Result<(), TransportError> {
            let endpoint = *state
                .links
                .get(&peer)
                .ok_or(TransportError::UnknownPeer { peer })?;
            let payload = packet.data().into();
            state.client_inbox(endpoint).push_back(SocketEvent::Receive {
                peer,
                channel,
                payload,
            });
            state.deliver(packet);
            Ok(())
        })
    }

    fn disconnect(&mut self, peer: PeerId, cause: DisconnectCause) {
        self.hub.update(|state| {
            if let Some(endpoint) = state.unlink(&peer) {
                state
                    .client_inbox(endpoint)
                    .push_back(SocketEvent::Disconnect { peer, cause });
            }
        });
    }
}

impl Drop for LocalServerSocket {
    fn drop(&mut self) {
        self.hub.update(|state| {
            state.server_open = false;
            state.server_events.clear();
            let links: Vec<(PeerId, u64)> = state.links.drain().collect();
            state.endpoints.clear();
            for (peer, endpoint) in links {
                state.client_inbox(endpoint).push_back(SocketEvent::Disconnect {
                    peer,
                    cause: DisconnectCause::Graceful,
                });
            }
        });
    }
}

pub struct LocalClientSocket {
    hub: LocalHub,
    endpoint: u64,
}

impl LocalClientSocket {
    fn peer(&self, state: &HubState) -> Option<PeerId> {
        state.endpoints.get(&self.endpoint).copied()
    }
}

impl ClientSocket for LocalClientSocket {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.reset();
        let max_connections = self.hub.inner.max_connections;
        let endpoint = self.endpoint;
        self.hub.update(|state| {
            state.next_peer += 1;
            let peer = PeerId::new(state.next_peer);
            if !state.server_open || state.refuse || state.links.len() >= max_connections {
                state.client_inbox(endpoint).push_back(SocketEvent::Disconnect {
                    peer,
                    cause: DisconnectCause::Refused,
                });
                return;
            }
            state.links.insert(peer, endpoint);
            state.endpoints.insert(endpoint, peer);
            state.server_events.push_back(SocketEvent::Connect { peer });
            state.client_inbox(endpoint).push_back(SocketEvent::Connect { peer });
        });
        Ok(())
    }

    fn service(&mut self, timeout: Duration) -> Result<SocketEvent, TransportError> {
        let endpoint = self.endpoint;
        let event = self.hub.wait_for(timeout, |state| {
            state.client_events.get_mut(&endpoint)?.pop_front()
        });
        Ok(event.unwrap_or(SocketEvent::None))
    }

    fn send(&mut self, channel: ChannelId, packet: Packet) -> Result<(), TransportError> {
        let channel_count = self.hub.inner.channel_count;
        if channel >= channel_count {
            return Err(TransportError::InvalidChannel {
                channel,
                channel_count,
            });
        }
        self.hub.update(|state| -> Result<(), TransportError> {
            let peer = self.peer(state).ok_or(TransportError::NotConnected)?;
            state.server_events.push_back(SocketEvent::Receive {
                peer,
                channel,
                payload: packet.data().into(),
            });
            state.deliver(packet);
            Ok(())
        })
    }

    fn reset(&mut self) {
        let endpoint = self.endpoint;
        self.hub.update(|state| {
            state.client_events.remove(&endpoint);
            if let Some(peer) = state.endpoints.get(&endpoint).copied() {
                state.unlink(&peer);
                state.server_events.push_back(SocketEvent::Disconnect {
                    peer,
                    cause: DisconnectCause::TimedOut,
                });
            }
        });
    }
}

impl Drop for LocalClientSocket {
    fn drop(&mut self) {
        self.reset();
    }
}
