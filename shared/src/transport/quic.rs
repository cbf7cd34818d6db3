//! QUIC plumbing used by both the server and the client socket.
//!
//! Reliable packets travel on one unidirectional stream per channel, so
//! order holds within a channel and a stalled channel never blocks another.
//! Unreliable packets travel as datagrams.

use std::{collections::HashMap, sync::mpsc, time::Duration};

use log::{debug, warn};
use quinn::{Connection, ConnectionError, RecvStream, SendStream, TransportConfig, VarInt, WriteError};
use tokio::{
    runtime::Handle,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};

use crate::{
    envelope::{Packet, Reliability},
    types::{ChannelId, PeerId},
};

use super::{framing, DisconnectCause, SocketEvent, TransportError};

const DATAGRAM_BUFFER_SIZE: usize = 10_000_000; // 10MB

/// Protocol name negotiated during the TLS handshake
pub const ALPN_PROTOCOL: &[u8] = b"conduit-quic";

/// Tuning shared by QUIC server and client endpoints
#[derive(Debug, Clone)]
pub struct QuicTransportConfig {
    pub datagram_receive_buffer_size: usize,
    pub datagram_send_buffer_size: usize,
    pub idle_timeout: Duration,
    pub keep_alive_interval: Duration,
    pub initial_rtt: Duration,
}

impl Default for QuicTransportConfig {
    fn default() -> Self {
        Self {
            datagram_receive_buffer_size: DATAGRAM_BUFFER_SIZE,
            datagram_send_buffer_size: DATAGRAM_BUFFER_SIZE,
            idle_timeout: Duration::from_secs(30),
            keep_alive_interval: Duration::from_secs(5),
            initial_rtt: Duration::from_millis(100),
        }
    }
}

impl QuicTransportConfig {
    pub fn build(&self) -> Result<TransportConfig, TransportError> {
        let idle_millis = u64::try_from(self.idle_timeout.as_millis()).unwrap_or(u64::MAX);
        let idle_timeout = VarInt::from_u64(idle_millis).map_err(|_| TransportError::InitFailed {
            reason: format!("Invalid idle timeout {:?}", self.idle_timeout),
        })?;

        let mut transport_config = TransportConfig::default();
        transport_config.datagram_receive_buffer_size(Some(self.datagram_receive_buffer_size));
        transport_config.datagram_send_buffer_size(self.datagram_send_buffer_size);
        transport_config.max_idle_timeout(Some(idle_timeout.into()));
        transport_config.keep_alive_interval(Some(self.keep_alive_interval));
        transport_config.initial_rtt(self.initial_rtt);
        Ok(transport_config)
    }
}

/// Maps how a connection ended to the cause reported to the host. `None`
/// when this side closed it, as the host already knows.
pub fn disconnect_cause(error: &ConnectionError) -> Option<DisconnectCause> {
    match error {
        ConnectionError::LocallyClosed => None,
        ConnectionError::ApplicationClosed(close) => {
            let code = u32::try_from(close.error_code.into_inner()).unwrap_or(u32::MAX);
            Some(DisconnectCause::from_code(code))
        }
        ConnectionError::TimedOut | ConnectionError::Reset => Some(DisconnectCause::TimedOut),
        _ => Some(DisconnectCause::Other(0)),
    }
}

/// Closes `connection` with the wire code of `cause`
pub fn close(connection: &Connection, cause: DisconnectCause) {
    connection.close(VarInt::from_u32(cause.code()), b"");
}

/// Spawns the tasks that turn everything `peer` sends into Receive events.
/// They end when the connection closes or the event receiver is dropped.
pub fn spawn_receivers(
    runtime: &Handle,
    connection: &Connection,
    peer: PeerId,
    events: mpsc::Sender<SocketEvent>,
) {
    runtime.spawn(receive_datagrams(connection.clone(), peer, events.clone()));
    runtime.spawn(accept_streams(connection.clone(), peer, events));
}

async fn receive_datagrams(connection: Connection, peer: PeerId, events: mpsc::Sender<SocketEvent>) {
    while let Ok(datagram) = connection.read_datagram().await {
        let Some((channel, payload)) = framing::decode_datagram(&datagram) else {
            debug!("Ignoring runt datagram from {}", peer);
            continue;
        };
        let event = SocketEvent::Receive {
            peer,
            channel,
            payload: payload.into(),
        };
        if events.send(event).is_err() {
            return;
        }
    }
}

async fn accept_streams(connection: Connection, peer: PeerId, events: mpsc::Sender<SocketEvent>) {
    while let Ok(stream) = connection.accept_uni().await {
        tokio::spawn(read_channel(stream, peer, events.clone()));
    }
}

async fn read_channel(mut stream: RecvStream, peer: PeerId, events: mpsc::Sender<SocketEvent>) {
    let mut word = [0u8; 4];
    if stream.read_exact(&mut word).await.is_err() {
        return;
    }
    let channel = framing::read_header(word);

    loop {
        if stream.read_exact(&mut word).await.is_err() {
            return;
        }
        let len = framing::read_header(word) as usize;
        if len > framing::MAX_FRAME_SIZE {
            warn!("{} sent a {} byte frame on channel {}, dropping stream", peer, len, channel);
            let _ = stream.stop(VarInt::from_u32(0));
            return;
        }
        let mut payload = vec![0u8; len];
        if stream.read_exact(&mut payload).await.is_err() {
            return;
        }
        let event = SocketEvent::Receive {
            peer,
            channel,
            payload: payload.into_boxed_slice(),
        };
        if events.send(event).is_err() {
            return;
        }
    }
}

/// The sending half of one connection: lazily opened per-channel streams for
/// reliable packets and datagrams for the rest.
pub struct ChannelWriters {
    connection: Connection,
    runtime: Handle,
    channel_count: u32,
    writers: HashMap<ChannelId, UnboundedSender<Packet>>,
}

impl ChannelWriters {
    pub fn new(connection: Connection, runtime: Handle, channel_count: u32) -> Self {
        Self {
            connection,
            runtime,
            channel_count,
            writers: HashMap::new(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Queues `packet`. A reliable packet is held by its stream's writer task
    /// until written, then dropped; an unreliable one is copied into a
    /// datagram and dropped right away.
    pub fn send(&mut self, channel: ChannelId, packet: Packet) -> Result<(), TransportError> {
        if channel >= self.channel_count {
            return Err(TransportError::InvalidChannel {
                channel,
                channel_count: self.channel_count,
            });
        }

        match packet.reliability() {
            Reliability::Unreliable => {
                let datagram = framing::encode_datagram(channel, packet.data());
                self.connection
                    .send_datagram(datagram.into())
                    .map_err(|error| TransportError::SendFailed {
                        reason: error.to_string(),
                    })
            }
            Reliability::Reliable => {
                let writer = self.writers.entry(channel).or_insert_with(|| {
                    let (sender, receiver) = unbounded_channel();
                    self.runtime
                        .spawn(write_channel(self.connection.clone(), channel, receiver));
                    sender
                });
                writer.send(packet).map_err(|_| TransportError::Closed)
            }
        }
    }
}

async fn write_channel(connection: Connection, channel: ChannelId, mut packets: UnboundedReceiver<Packet>) {
    let mut stream = match connection.open_uni().await {
        Ok(stream) => stream,
        Err(error) => {
            debug!("Could not open stream for channel {}: {}", channel, error);
            return;
        }
    };
    if stream.write_all(&framing::channel_header(channel)).await.is_err() {
        return;
    }

    while let Some(packet) = packets.recv().await {
        let Some(header) = framing::frame_header(packet.len()) else {
            warn!("Dropping {} byte packet on channel {}, too large for a frame", packet.len(), channel);
            continue;
        };
        if let Err(error) = write_frame(&mut stream, &header, packet.data()).await {
            debug!("Stream for channel {} closed: {}", channel, error);
            return;
        }
    }
    let _ = stream.finish();
}

async fn write_frame(stream: &mut SendStream, header: &[u8], payload: &[u8]) -> Result<(), WriteError> {
    stream.write_all(header).await?;
    stream.write_all(payload).await
}
