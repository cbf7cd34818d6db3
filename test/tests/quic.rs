#![cfg(feature = "transport_quic")]

/// Server and client over real QUIC sockets on the loopback interface

use std::{net::SocketAddr, thread, time::Duration};

use conduit_client::{
    transport::quic::{QuicConfig as ClientQuicConfig, Socket as ClientSocket},
    Client, ClientConfig, ClientState, ReconnectBackoff,
};
use conduit_server::{
    transport::quic::{QuicConfig as ServerQuicConfig, Socket as ServerSocket},
    Server, ServerConfig,
};
use conduit_shared::{Envelope, HostConfig, Reliability};
use conduit_test::{init_logger, wait_until};

fn quic_server() -> (Server<ServerSocket>, SocketAddr) {
    let config = ServerConfig {
        host: HostConfig {
            channel_count: 2,
            ..HostConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)))
        },
        ..ServerConfig::default()
    };
    let server = Server::listen(config, |host| ServerSocket::listen(host, ServerQuicConfig::default()))
        .unwrap();
    let addr = server.socket().local_addr().unwrap();
    (server, addr)
}

fn quic_client(addr: SocketAddr) -> Client {
    let config = ClientConfig {
        channel_count: 2,
        backoff: ReconnectBackoff::Fixed(Duration::from_millis(100)),
        ..ClientConfig::new(addr)
    };
    Client::connect(config, |config| ClientSocket::new(config, ClientQuicConfig::default())).unwrap()
}

#[test]
fn envelopes_cross_a_quic_connection() {
    init_logger();
    let (mut server, addr) = quic_server();
    let handle = server.handle();
    let server_thread = thread::spawn(move || server.run());

    let client = quic_client(addr);
    assert!(wait_until(|| client.state() == ClientState::Connected));

    client.send(Envelope::new(1, b"reliable".to_vec()).shared()).unwrap();
    let request = handle.read().unwrap();
    assert_eq!(request.channel_id(), 1);
    assert_eq!(request.payload(), b"reliable");

    handle.send(request.reply(b"echo".to_vec()).shared());
    let reply = client.read().unwrap();
    assert_eq!(reply.payload(), b"echo");
    assert_eq!(reply.channel_id(), 1);

    // datagrams may be lost, so only check that sending is accepted
    client
        .send_with(Envelope::new(0, b"datagram".to_vec()).shared(), Reliability::Unreliable)
        .unwrap();

    handle.request_disconnect(request.session_id());
    assert!(wait_until(|| client.state() == ClientState::Disconnected));

    handle.stop();
    server_thread.join().unwrap().unwrap();
}

#[test]
fn reliable_channel_keeps_order() {
    init_logger();
    let (mut server, addr) = quic_server();
    let handle = server.handle();
    let server_thread = thread::spawn(move || server.run());

    let client = quic_client(addr);
    assert!(wait_until(|| client.state() == ClientState::Connected));

    for index in 0..100u32 {
        client
            .send(Envelope::new(0, index.to_be_bytes().to_vec()).shared())
            .unwrap();
    }
    for index in 0..100u32 {
        let envelope = handle.read().unwrap();
        assert_eq!(envelope.payload(), &index.to_be_bytes());
    }

    drop(client);
    assert!(wait_until(|| handle.stats().disconnects == 1));
    handle.stop();
    server_thread.join().unwrap().unwrap();
}
