use std::{
    net::SocketAddr,
    sync::{mpsc, Arc},
    time::Duration,
};

use log::{debug, info};
use parking_lot::Mutex;
use quinn::{
    crypto::rustls::QuicClientConfig, ClientConfig as EndpointConfig, ConnectionError, Endpoint,
    VarInt,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::runtime::Runtime;

use conduit_shared::{
    transport::quic::{self as link, ChannelWriters, QuicTransportConfig, ALPN_PROTOCOL},
    ChannelId, ClientSocket, DisconnectCause, Packet, PeerId, SocketEvent, TransportError,
};

use crate::ClientConfig;

/// The live connection, tagged with the attempt that opened it
type LinkSlot = Arc<Mutex<Option<(PeerId, ChannelWriters)>>>;

/// A [`ClientSocket`] backed by a quinn client endpoint.
///
/// Each [`connect`](ClientSocket::connect) starts a handshake on the
/// socket's tokio runtime and gets a fresh event channel, so events of an
/// abandoned attempt never reach the client.
pub struct Socket {
    runtime: Runtime,
    endpoint: Endpoint,
    server_addr: SocketAddr,
    server_name: String,
    channel_count: u32,
    link: LinkSlot,
    events: mpsc::Receiver<SocketEvent>,
    attempts: u64,
}

impl Socket {
    pub fn new(config: &ClientConfig, quic: QuicConfig) -> Result<Self, TransportError> {
        // Install default crypto provider if not already installed
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("conduit-quic-client")
            .enable_all()
            .build()
            .map_err(|error| TransportError::InitFailed {
                reason: format!("Failed to create tokio runtime: {}", error),
            })?;

        let endpoint_config = create_endpoint_config(&quic)?;
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], 0));
        let mut endpoint = {
            let _guard = runtime.enter();
            Endpoint::client(bind_addr).map_err(|error| TransportError::BindFailed {
                addr: bind_addr,
                reason: error.to_string(),
            })?
        };
        endpoint.set_default_client_config(endpoint_config);

        let (_, events) = mpsc::channel();
        Ok(Self {
            runtime,
            endpoint,
            server_addr: config.server_addr,
            server_name: quic.server_name,
            channel_count: config.channel_count,
            link: Arc::new(Mutex::new(None)),
            events,
            attempts: 0,
        })
    }
}

impl ClientSocket for Socket {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.reset();

        self.attempts += 1;
        let peer = PeerId::new(self.attempts);
        let (sender, events) = mpsc::channel();
        self.events = events;

        let connecting = self
            .endpoint
            .connect(self.server_addr, &self.server_name)
            .map_err(|error| TransportError::InitFailed {
                reason: format!("Failed to initiate connection: {}", error),
            })?;

        let attempt = Attempt {
            peer,
            link: self.link.clone(),
            events: sender,
            channel_count: self.channel_count,
        };
        self.runtime.spawn(attempt.run(connecting, self.runtime.handle().clone()));
        Ok(())
    }

    fn service(&mut self, timeout: Duration) -> Result<SocketEvent, TransportError> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(event),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(SocketEvent::None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn send(&mut self, channel: ChannelId, packet: Packet) -> Result<(), TransportError> {
        match self.link.lock().as_mut() {
            Some((_, writers)) => writers.send(channel, packet),
            None => Err(TransportError::NotConnected),
        }
    }

    fn reset(&mut self) {
        if let Some((_, writers)) = self.link.lock().take() {
            link::close(writers.connection(), DisconnectCause::Other(0));
        }
        // drop the receiver so a pending attempt notices it was abandoned
        let (_, events) = mpsc::channel();
        self.events = events;
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.endpoint
            .close(VarInt::from_u32(DisconnectCause::GRACEFUL_CODE), b"client shutdown");
        let endpoint = self.endpoint.clone();
        self.runtime.block_on(async move {
            let _ = tokio::time::timeout(Duration::from_millis(500), endpoint.wait_idle()).await;
        });
    }
}

struct Attempt {
    peer: PeerId,
    link: LinkSlot,
    events: mpsc::Sender<SocketEvent>,
    channel_count: u32,
}

impl Attempt {
    async fn run(self, connecting: quinn::Connecting, runtime: tokio::runtime::Handle) {
        let peer = self.peer;
        let connection = match connecting.await {
            Ok(connection) => connection,
            Err(error) => {
                debug!("QUIC handshake failed: {}", error);
                let cause = match error {
                    ConnectionError::TimedOut => DisconnectCause::TimedOut,
                    _ => DisconnectCause::Refused,
                };
                let _ = self.events.send(SocketEvent::Disconnect { peer, cause });
                return;
            }
        };

        *self.link.lock() = Some((
            peer,
            ChannelWriters::new(connection.clone(), runtime.clone(), self.channel_count),
        ));
        if self.events.send(SocketEvent::Connect { peer }).is_err() {
            // abandoned while the handshake ran
            self.clear_link();
            link::close(&connection, DisconnectCause::Other(0));
            return;
        }
        info!("QUIC connection established to {}", connection.remote_address());
        link::spawn_receivers(&runtime, &connection, peer, self.events.clone());

        let error = connection.closed().await;
        self.clear_link();
        if let Some(cause) = link::disconnect_cause(&error) {
            let _ = self.events.send(SocketEvent::Disconnect { peer, cause });
        }
    }

    fn clear_link(&self) {
        let mut link = self.link.lock();
        if matches!(link.as_ref(), Some((owner, _)) if *owner == self.peer) {
            *link = None;
        }
    }
}

fn create_endpoint_config(config: &QuicConfig) -> Result<EndpointConfig, TransportError> {
    let init_failed = |reason: String| TransportError::InitFailed { reason };

    let mut client_crypto = match &config.cert_verification {
        CertificateVerification::Trusted { certificates } => {
            let mut roots = rustls::RootCertStore::empty();
            for certificate in certificates {
                roots
                    .add(CertificateDer::from(certificate.clone()))
                    .map_err(|error| init_failed(format!("Invalid trusted certificate: {}", error)))?;
            }
            rustls::ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        }
        CertificateVerification::SkipVerification => rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
            .with_no_client_auth(),
    };
    client_crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let quic_crypto = QuicClientConfig::try_from(client_crypto)
        .map_err(|error| init_failed(format!("Failed to create QUIC client config: {}", error)))?;
    let mut endpoint_config = EndpointConfig::new(Arc::new(quic_crypto));
    endpoint_config.transport_config(Arc::new(config.transport.build()?));
    Ok(endpoint_config)
}

/// QUIC specific settings of the client socket
#[derive(Debug, Clone)]
pub struct QuicConfig {
    pub transport: QuicTransportConfig,
    pub cert_verification: CertificateVerification,
    /// Name the server certificate must be valid for
    pub server_name: String,
}

impl Default for QuicConfig {
    fn default() -> Self {
        Self {
            transport: QuicTransportConfig::default(),
            cert_verification: CertificateVerification::SkipVerification, // Dev-friendly default
            server_name: "localhost".to_string(),
        }
    }
}

/// How the client checks the server certificate
#[derive(Debug, Clone)]
pub enum CertificateVerification {
    /// Trust exactly these DER encoded certificates
    Trusted { certificates: Vec<Vec<u8>> },
    /// Skip certificate verification (dev only!)
    SkipVerification,
}

// Accepts any server certificate, for development with self-signed certs
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
