use std::{
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, info, warn};

use conduit_shared::{
    BoundedQueue, CancelToken, ClientSocket, DisconnectCause, Envelope, Packet, Reliability,
    SocketEvent, TransportError,
};

use super::{
    client_state::AtomicClientState, ClientConfig, ClientState, ClientStats, StatCounters,
};
use crate::{ClientSendError, ConduitClientError};

/// A client that keeps a connection to one server alive on its own thread.
///
/// The thread runs a connect / retry cycle: it connects, exchanges envelopes
/// while connected, and after a failure waits out the configured backoff
/// before trying again. A graceful close from the server ends the cycle for
/// good. The transport socket is created, used and dropped on that thread.
pub struct Client {
    io: Arc<ClientIo>,
    thread: Option<JoinHandle<()>>,
}

struct ClientIo {
    inbound: BoundedQueue<Arc<Envelope>>,
    outbound: BoundedQueue<Packet>,
    state: AtomicClientState,
    cancel: CancelToken,
    stats: StatCounters,
}

impl Client {
    /// Spawns the client thread, which builds its socket with `factory` and
    /// starts connecting. Returns once the socket exists, or with the error
    /// that prevented it.
    pub fn connect<S, F>(config: ClientConfig, factory: F) -> Result<Self, ConduitClientError>
    where
        S: ClientSocket + 'static,
        F: FnOnce(&ClientConfig) -> Result<S, TransportError> + Send + 'static,
    {
        let io = Arc::new(ClientIo {
            inbound: BoundedQueue::with_config(&config.inbound),
            outbound: BoundedQueue::with_config(&config.outbound),
            state: AtomicClientState::new(ClientState::NotStarted),
            cancel: CancelToken::new(),
            stats: StatCounters::default(),
        });

        let (init_sender, init_receiver) = mpsc::sync_channel(1);
        let thread_io = io.clone();
        let thread = thread::Builder::new()
            .name("conduit-client".to_string())
            .spawn(move || {
                let socket = match factory(&config) {
                    Ok(socket) => socket,
                    Err(error) => {
                        let _ = init_sender.send(Err(error));
                        return;
                    }
                };
                let _ = init_sender.send(Ok(()));
                ClientDriver::new(socket, thread_io, config).run();
            })
            .map_err(|source| ConduitClientError::ThreadSpawn { source })?;

        match init_receiver.recv() {
            Ok(Ok(())) => Ok(Self {
                io,
                thread: Some(thread),
            }),
            Ok(Err(source)) => {
                let _ = thread.join();
                Err(ConduitClientError::TransportInit { source })
            }
            Err(_) => {
                let _ = thread.join();
                Err(ConduitClientError::ThreadExited)
            }
        }
    }

    /// Blocks until an envelope arrives from the server. Returns `None` once
    /// the client has quit or been disconnected and everything received has
    /// been read.
    pub fn read(&self) -> Option<Arc<Envelope>> {
        self.io.inbound.pop()
    }

    pub fn try_read(&self) -> Option<Arc<Envelope>> {
        self.io.inbound.try_pop()
    }

    /// Queues `envelope` for reliable delivery. Only accepted while
    /// connected; blocks while the outbound queue is full.
    pub fn send(&self, envelope: Arc<Envelope>) -> Result<(), ClientSendError> {
        self.send_with(envelope, Reliability::Reliable)
    }

    pub fn send_with(
        &self,
        envelope: Arc<Envelope>,
        reliability: Reliability,
    ) -> Result<(), ClientSendError> {
        let state = self.state();
        if state != ClientState::Connected {
            return Err(ClientSendError::NotConnected { state });
        }
        self.io.outbound.push(Packet::new(envelope, reliability));
        Ok(())
    }

    pub fn state(&self) -> ClientState {
        self.io.state.load()
    }

    pub fn stats(&self) -> ClientStats {
        self.io.stats.snapshot()
    }

    /// Stops the client thread at its next opportunity. The thread closes
    /// the inbound stream on its way out, so readers get everything received
    /// before `None`.
    pub fn quit(&self) {
        self.io.cancel.cancel();
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.quit();
        if let Some(thread) = self.thread.take() {
            while !thread.is_finished() {
                // the client thread may be blocked handing over an envelope
                while self.io.inbound.try_pop().is_some() {}
                thread::sleep(Duration::from_millis(1));
            }
            if thread.join().is_err() {
                warn!("Client thread panicked");
            }
        }
        while self.io.inbound.try_pop().is_some() {}
        while self.io.outbound.try_pop().is_some() {}
    }
}

/// Runs on the client thread and owns the socket for its whole life
struct ClientDriver<S: ClientSocket> {
    socket: S,
    io: Arc<ClientIo>,
    config: ClientConfig,
    failures: u32,
}

impl<S: ClientSocket> ClientDriver<S> {
    fn new(socket: S, io: Arc<ClientIo>, config: ClientConfig) -> Self {
        Self {
            socket,
            io,
            config,
            failures: 0,
        }
    }

    fn run(mut self) {
        while !self.io.cancel.is_cancelled() {
            self.io.stats.connect_attempt();
            self.io.state.store(ClientState::Connecting);
            debug!("Connecting to {}", self.config.server_addr);

            let outcome = match self.socket.connect() {
                Ok(()) => self.drive(),
                Err(error) => {
                    warn!("Connection attempt to {} failed: {}", self.config.server_addr, error);
                    ClientState::Error
                }
            };

            match outcome {
                ClientState::Disconnected => {
                    self.io.state.store(ClientState::Disconnected);
                    info!("Server {} closed the connection", self.config.server_addr);
                    break;
                }
                ClientState::Error => {
                    self.io.state.store(ClientState::Error);
                    self.socket.reset();
                    self.discard_outbound();

                    self.failures = self.failures.saturating_add(1);
                    let delay = self.config.backoff.delay(self.failures);
                    info!("Reconnecting to {} in {:?}", self.config.server_addr, delay);
                    if !self.io.cancel.sleep(delay) {
                        break;
                    }
                }
                // cancelled mid-connection
                _ => break,
            }
        }

        self.socket.reset();
        self.io.inbound.shutdown();
        self.discard_outbound();
        debug!("Client thread for {} exiting", self.config.server_addr);
    }

    /// Services one connection until it ends or the client is cancelled.
    /// Returns the state the connection ended in.
    fn drive(&mut self) -> ClientState {
        let started = Instant::now();
        let mut state = ClientState::Connecting;

        while !self.io.cancel.is_cancelled() {
            let event = match self.socket.service(self.config.poll_timeout) {
                Ok(event) => event,
                Err(error) => {
                    warn!("Client transport failed: {}", error);
                    return ClientState::Error;
                }
            };

            match event {
                SocketEvent::Connect { .. } => {
                    state = ClientState::Connected;
                    self.io.state.store(state);
                    self.failures = 0;
                    info!("Connected to {}", self.config.server_addr);
                }
                SocketEvent::Receive {
                    channel, payload, ..
                } => {
                    self.io.inbound.push(Envelope::new(channel, payload).shared());
                    self.io.stats.received();
                }
                SocketEvent::Disconnect {
                    cause: DisconnectCause::Graceful,
                    ..
                } => return ClientState::Disconnected,
                SocketEvent::Disconnect { cause, .. } => {
                    warn!("Lost connection to {} ({:?})", self.config.server_addr, cause);
                    return ClientState::Error;
                }
                SocketEvent::None => {}
            }

            match state {
                ClientState::Connecting if started.elapsed() >= self.config.connect_timeout => {
                    warn!(
                        "Connecting to {} timed out after {:?}",
                        self.config.server_addr, self.config.connect_timeout
                    );
                    return ClientState::Error;
                }
                ClientState::Connected => self.flush_outbound(),
                _ => {}
            }
        }
        state
    }

    fn flush_outbound(&mut self) {
        for _ in 0..self.io.outbound.capacity() {
            let Some(packet) = self.io.outbound.try_pop() else {
                return;
            };
            let channel = packet.envelope().channel_id();
            match self.socket.send(channel, packet) {
                Ok(()) => self.io.stats.sent(),
                Err(error) => {
                    debug!("Transport refused packet on channel {}: {}", channel, error);
                    self.io.stats.dropped_send();
                }
            }
        }
    }

    /// Envelopes queued for a connection that no longer exists are not
    /// carried over to the next one
    fn discard_outbound(&mut self) {
        let mut discarded = 0;
        while self.io.outbound.try_pop().is_some() {
            self.io.stats.dropped_send();
            discarded += 1;
        }
        if discarded > 0 {
            debug!("Discarded {} unsent envelopes", discarded);
        }
    }
}
