use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{mpsc, Arc},
    time::Duration,
};

use log::{debug, info, warn};
use parking_lot::Mutex;
use quinn::{crypto::rustls::QuicServerConfig, Endpoint, ServerConfig as EndpointConfig, VarInt};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::runtime::{Handle, Runtime};

use conduit_shared::{
    transport::quic::{self as link, ChannelWriters, QuicTransportConfig, ALPN_PROTOCOL},
    ChannelId, DisconnectCause, HostConfig, Packet, PeerId, ServerSocket, SocketEvent,
    TransportError,
};

type PeerMap = Arc<Mutex<HashMap<PeerId, ChannelWriters>>>;

/// A [`ServerSocket`] backed by a quinn endpoint.
///
/// The endpoint lives on a small tokio runtime owned by the socket. Accepted
/// connections and everything they receive reach
/// [`service`](ServerSocket::service) as events over a channel.
pub struct Socket {
    runtime: Runtime,
    endpoint: Endpoint,
    peers: PeerMap,
    events: mpsc::Receiver<SocketEvent>,
}

impl Socket {
    /// Binds an endpoint to `host.listen_addr` and starts accepting
    pub fn listen(host: &HostConfig, config: QuicConfig) -> Result<Self, TransportError> {
        // Install default crypto provider if not already installed
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("conduit-quic-server")
            .enable_all()
            .build()
            .map_err(|error| TransportError::InitFailed {
                reason: format!("Failed to create tokio runtime: {}", error),
            })?;

        let endpoint_config = create_endpoint_config(&config)?;
        let endpoint = {
            let _guard = runtime.enter();
            Endpoint::server(endpoint_config, host.listen_addr).map_err(|error| {
                TransportError::BindFailed {
                    addr: host.listen_addr,
                    reason: error.to_string(),
                }
            })?
        };

        let peers: PeerMap = Arc::new(Mutex::new(HashMap::new()));
        let (sender, events) = mpsc::channel();
        let acceptor = Acceptor {
            runtime: runtime.handle().clone(),
            peers: peers.clone(),
            events: sender,
            max_connections: host.max_connections,
            channel_count: host.channel_count,
        };
        runtime.spawn(acceptor.run(endpoint.clone()));

        info!("QUIC endpoint listening on {:?}", endpoint.local_addr());
        Ok(Self {
            runtime,
            endpoint,
            peers,
            events,
        })
    }

    /// The address actually bound, useful when listening on port 0
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.endpoint
            .local_addr()
            .map_err(|error| TransportError::InitFailed {
                reason: error.to_string(),
            })
    }
}

impl ServerSocket for Socket {
    fn service(&mut self, timeout: Duration) -> Result<SocketEvent, TransportError> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(event),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(SocketEvent::None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn send(
        &mut self,
        peer: PeerId,
        channel: ChannelId,
        packet: Packet,
    ) -> Result<(), TransportError> {
        let mut peers = self.peers.lock();
        let writers = peers
            .get_mut(&peer)
            .ok_or(TransportError::UnknownPeer { peer })?;
        writers.send(channel, packet)
    }

    fn disconnect(&mut self, peer: PeerId, cause: DisconnectCause) {
        if let Some(writers) = self.peers.lock().remove(&peer) {
            link::close(writers.connection(), cause);
        }
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.endpoint
            .close(VarInt::from_u32(DisconnectCause::GRACEFUL_CODE), b"server shutdown");
        let endpoint = self.endpoint.clone();
        // give the close frames a moment to leave
        self.runtime.block_on(async move {
            let _ = tokio::time::timeout(Duration::from_millis(500), endpoint.wait_idle()).await;
        });
    }
}

struct Acceptor {
    runtime: Handle,
    peers: PeerMap,
    events: mpsc::Sender<SocketEvent>,
    max_connections: usize,
    channel_count: u32,
}

impl Acceptor {
    async fn run(self, endpoint: Endpoint) {
        let acceptor = Arc::new(self);
        let mut next_peer = 1u64;
        while let Some(incoming) = endpoint.accept().await {
            if acceptor.peers.lock().len() >= acceptor.max_connections {
                info!("Refusing {}, server is full", incoming.remote_address());
                incoming.refuse();
                continue;
            }
            let peer = PeerId::new(next_peer);
            next_peer += 1;
            tokio::spawn(acceptor.clone().serve(incoming, peer));
        }
        debug!("QUIC endpoint closed");
    }

    async fn serve(self: Arc<Self>, incoming: quinn::Incoming, peer: PeerId) {
        let connection = match incoming.await {
            Ok(connection) => connection,
            Err(error) => {
                warn!("QUIC handshake failed: {}", error);
                return;
            }
        };

        {
            let mut peers = self.peers.lock();
            // handshakes run concurrently, so the limit is checked again here
            if peers.len() >= self.max_connections {
                link::close(&connection, DisconnectCause::Refused);
                return;
            }
            peers.insert(
                peer,
                ChannelWriters::new(connection.clone(), self.runtime.clone(), self.channel_count),
            );
        }

        debug!("{} connected from {}", peer, connection.remote_address());
        if self.events.send(SocketEvent::Connect { peer }).is_err() {
            return;
        }
        link::spawn_receivers(&self.runtime, &connection, peer, self.events.clone());

        let error = connection.closed().await;
        let still_mapped = self.peers.lock().remove(&peer).is_some();
        if let (true, Some(cause)) = (still_mapped, link::disconnect_cause(&error)) {
            let _ = self.events.send(SocketEvent::Disconnect { peer, cause });
        }
    }
}

fn create_endpoint_config(config: &QuicConfig) -> Result<EndpointConfig, TransportError> {
    let init_failed = |reason: String| TransportError::InitFailed { reason };

    let (cert_chain, private_key) = match &config.certificate_config {
        CertificateConfig::SelfSigned { hostnames } => generate_self_signed_cert(hostnames)?,
        CertificateConfig::FromBytes {
            cert_chain,
            private_key,
        } => {
            let certs: Vec<CertificateDer> = cert_chain
                .iter()
                .map(|bytes| CertificateDer::from(bytes.clone()))
                .collect();
            let key = PrivateKeyDer::try_from(private_key.clone())
                .map_err(|_| init_failed("Invalid private key format".to_string()))?;
            (certs, key)
        }
    };

    let mut server_crypto = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .map_err(|error| init_failed(format!("Failed to create rustls config: {}", error)))?;
    server_crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let quic_crypto = QuicServerConfig::try_from(server_crypto)
        .map_err(|error| init_failed(format!("Failed to create QUIC config: {}", error)))?;
    let mut endpoint_config = EndpointConfig::with_crypto(Arc::new(quic_crypto));
    endpoint_config.transport_config(Arc::new(config.transport.build()?));
    Ok(endpoint_config)
}

fn generate_self_signed_cert(
    hostnames: &[String],
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), TransportError> {
    let cert = rcgen::generate_simple_self_signed(hostnames.to_vec()).map_err(|error| {
        TransportError::InitFailed {
            reason: format!("Failed to generate certificate: {}", error),
        }
    })?;

    let key_der = cert.key_pair.serialize_der();
    let cert_der = cert.cert.der().to_vec();
    let key = PrivateKeyDer::try_from(key_der).map_err(|_| TransportError::InitFailed {
        reason: "Failed to convert private key".to_string(),
    })?;
    Ok((vec![CertificateDer::from(cert_der)], key))
}

/// QUIC specific settings of the server socket
#[derive(Debug, Clone, Default)]
pub struct QuicConfig {
    pub transport: QuicTransportConfig,
    pub certificate_config: CertificateConfig,
}

/// Where the server certificate comes from
#[derive(Debug, Clone)]
pub enum CertificateConfig {
    /// Generate self-signed certificate (for development)
    SelfSigned { hostnames: Vec<String> },
    /// Provide certificate and private key as DER bytes
    FromBytes {
        cert_chain: Vec<Vec<u8>>,
        private_key: Vec<u8>,
    },
}

impl Default for CertificateConfig {
    fn default() -> Self {
        CertificateConfig::SelfSigned {
            hostnames: vec!["localhost".to_string()],
        }
    }
}
