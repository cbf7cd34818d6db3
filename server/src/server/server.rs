use std::sync::Arc;

use log::{debug, info, warn};

use conduit_shared::{
    ChannelId, DisconnectCause, Envelope, HostConfig, Packet, PeerId, Reliability, ServerSocket,
    SessionId, SocketEvent, TransportError,
};

use crate::{
    server::ServerIo, ConduitServerError, ServerConfig, ServerHandle, ServerStats, SessionTable,
};

/// A network host that accepts client connections through a
/// [`ServerSocket`], gives each one a session id and moves envelopes between
/// the transport and the application.
///
/// One thread drives the server by calling [`service`](Self::service) or
/// [`run`](Self::run). Any number of application threads read and send
/// through a [`ServerHandle`].
pub struct Server<S: ServerSocket> {
    socket: S,
    sessions: SessionTable,
    io: Arc<ServerIo>,
    config: ServerConfig,
}

impl<S: ServerSocket> Server<S> {
    /// Creates the transport host with `factory` and wraps it in a server
    pub fn listen<F>(config: ServerConfig, factory: F) -> Result<Self, ConduitServerError>
    where
        F: FnOnce(&HostConfig) -> Result<S, TransportError>,
    {
        let socket = factory(&config.host)
            .map_err(|source| ConduitServerError::TransportInit { source })?;
        info!(
            "Server listening on {}, up to {} connections",
            config.host.listen_addr, config.host.max_connections
        );
        Ok(Self::new(config, socket))
    }

    /// Wraps an already created transport host
    pub fn new(config: ServerConfig, socket: S) -> Self {
        Self {
            socket,
            sessions: SessionTable::with_max_id(config.max_session_id),
            io: Arc::new(ServerIo::new(&config)),
            config,
        }
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle::new(self.io.clone())
    }

    /// Drives the server until [`stop`](Self::stop) is called, then shuts the
    /// inbound queue down so blocked readers see end-of-stream.
    pub fn run(&mut self) -> Result<(), ConduitServerError> {
        let result = loop {
            if self.io.cancel.is_cancelled() {
                break Ok(());
            }
            if let Err(error) = self.service() {
                warn!("Server stopping: {}", error);
                break Err(error);
            }
        };
        self.io.inbound.shutdown();
        info!("Server stopped with {} sessions open", self.sessions.len());
        result
    }

    /// Runs one iteration: polls the transport for one event, then handles
    /// pending disconnect requests and outbound envelopes.
    pub fn service(&mut self) -> Result<(), ConduitServerError> {
        let event = self
            .socket
            .service(self.config.poll_timeout)
            .map_err(|source| ConduitServerError::Transport { source })?;
        self.dispatch(event);
        self.process_disconnects();
        self.flush_outbound();
        Ok(())
    }

    // Application-side conveniences, the same as on ServerHandle

    pub fn read(&self) -> Option<Arc<Envelope>> {
        self.io.inbound.pop()
    }

    pub fn try_read(&self) -> Option<Arc<Envelope>> {
        self.io.inbound.try_pop()
    }

    pub fn send(&self, envelope: Arc<Envelope>) {
        self.send_with(envelope, Reliability::Reliable);
    }

    pub fn send_with(&self, envelope: Arc<Envelope>, reliability: Reliability) {
        self.io.outbound.push(Packet::new(envelope, reliability));
    }

    pub fn request_disconnect(&self, session_id: SessionId) {
        self.io.disconnects.push(session_id);
    }

    pub fn stop(&self) {
        self.io.cancel.cancel();
    }

    pub fn stats(&self) -> ServerStats {
        self.io.stats.snapshot()
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }

    fn dispatch(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Connect { peer } => self.on_connect(peer),
            SocketEvent::Receive {
                peer,
                channel,
                payload,
            } => self.on_receive(peer, channel, payload),
            SocketEvent::Disconnect { peer, cause } => self.on_disconnect(peer, cause),
            SocketEvent::None => {}
        }
    }

    fn on_connect(&mut self, peer: PeerId) {
        match self.sessions.connect(peer) {
            Ok(session_id) => {
                self.io.stats.connected();
                info!("{} connected as {}", peer, session_id);
            }
            Err(error) => {
                warn!("Refusing {}: {}", peer, error);
                self.socket.disconnect(peer, DisconnectCause::Refused);
            }
        }
    }

    fn on_receive(&mut self, peer: PeerId, channel: ChannelId, payload: Box<[u8]>) {
        let Some(session_id) = self.sessions.session(&peer) else {
            debug!("Dropping {} bytes from {} without a session", payload.len(), peer);
            self.io.stats.dropped_receive();
            return;
        };
        self.io
            .inbound
            .push(Envelope::addressed(session_id, channel, payload).shared());
        self.io.stats.received();
    }

    fn on_disconnect(&mut self, peer: PeerId, cause: DisconnectCause) {
        if let Some(session_id) = self.sessions.remove_peer(&peer) {
            self.io.stats.disconnected();
            info!("{} disconnected ({:?})", session_id, cause);
        }
    }

    fn process_disconnects(&mut self) {
        while self.io.disconnects.readable() {
            let Some(session_id) = self.io.disconnects.try_pop() else {
                return;
            };
            let Some(peer) = self.sessions.remove_session(&session_id) else {
                debug!("Disconnect requested for unknown {}", session_id);
                continue;
            };
            self.socket.disconnect(peer, DisconnectCause::Graceful);
            self.io.stats.disconnected();
            info!("{} disconnected by request", session_id);
        }
    }

    fn flush_outbound(&mut self) {
        // bounded so a busy sender cannot starve the receive side
        for _ in 0..self.io.outbound.capacity() {
            let Some(packet) = self.io.outbound.try_pop() else {
                return;
            };
            let envelope = packet.envelope();
            let session_id = envelope.session_id();
            let channel = envelope.channel_id();

            let Some(peer) = self.sessions.peer(&session_id) else {
                debug!("Dropping envelope for unknown {}", session_id);
                self.io.stats.dropped_send();
                continue;
            };
            let reliability = packet.reliability();
            match self.socket.send(peer, channel, packet) {
                Ok(()) => self.io.stats.sent(),
                Err(error) => {
                    debug!("Transport refused {:?} packet for {}: {}", reliability, session_id, error);
                    self.io.stats.dropped_send();
                }
            }
        }
    }
}

impl<S: ServerSocket> Drop for Server<S> {
    fn drop(&mut self) {
        // handles outlive the server, their readers must see end-of-stream
        self.io.cancel.cancel();
        self.io.inbound.shutdown();
    }
}
