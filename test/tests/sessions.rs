/// Integration tests for session id assignment and server side bookkeeping
/// over the in-memory transport

use std::sync::Arc;

use conduit_client::{Client, ClientState};
use conduit_server::{ConduitServerError, Server, ServerConfig};
use conduit_shared::{Envelope, HostConfig, SessionId, TransportError};
use conduit_test::{connect_client, fast_client_config, init_logger, wait_until, LocalHub, TestServer};

fn connected_client(hub: &LocalHub) -> Client {
    let client = connect_client(hub, fast_client_config());
    assert!(
        wait_until(|| client.state() == ClientState::Connected),
        "client never connected, state {:?}",
        client.state()
    );
    client
}

/// Sends a marker from `client` and returns the session id the server
/// tagged it with
fn session_of(server: &TestServer, client: &Client, marker: &[u8]) -> SessionId {
    client
        .send(Envelope::new(0, marker.to_vec()).shared())
        .expect("client is connected");
    let envelope = server.handle().read().expect("server is running");
    assert_eq!(envelope.payload(), marker);
    envelope.session_id()
}

#[test]
fn freed_session_id_is_reused_and_others_keep_theirs() {
    init_logger();
    let hub = LocalHub::new(&HostConfig::default());
    let server = TestServer::start(&hub, ServerConfig::default());

    let client_a = connected_client(&hub);
    assert_eq!(session_of(&server, &client_a, b"a"), SessionId::new(1));

    let client_b = connected_client(&hub);
    assert_eq!(session_of(&server, &client_b, b"b"), SessionId::new(2));

    drop(client_a);
    assert!(wait_until(|| server.handle().stats().disconnects == 1));

    let client_c = connected_client(&hub);
    assert_eq!(session_of(&server, &client_c, b"c"), SessionId::new(1));
    assert_eq!(session_of(&server, &client_b, b"b again"), SessionId::new(2));

    let stats = server.handle().stats();
    assert_eq!(stats.connects, 3);
    assert_eq!(stats.received, 4);
}

#[test]
fn send_to_unknown_session_is_dropped_and_counted() {
    init_logger();
    let hub = LocalHub::new(&HostConfig::default());
    let server = TestServer::start(&hub, ServerConfig::default());

    server
        .handle()
        .send(Envelope::addressed(SessionId::new(77), 0, b"nobody".to_vec()).shared());

    assert!(wait_until(|| server.handle().stats().dropped_sends == 1));
    assert_eq!(server.handle().stats().sent, 0);
}

#[test]
fn connections_beyond_the_limit_are_refused() {
    init_logger();
    let host = HostConfig {
        max_connections: 1,
        ..HostConfig::default()
    };
    let hub = LocalHub::new(&host);
    let _server = TestServer::start(&hub, ServerConfig::default());

    let _first = connected_client(&hub);
    let second = connect_client(&hub, fast_client_config());

    assert!(wait_until(|| second.stats().connect_attempts >= 3));
    assert_ne!(second.state(), ClientState::Connected);
    assert_eq!(hub.connected_peers().len(), 1);
}

#[test]
fn transport_failure_at_listen_is_reported() {
    let result = Server::<conduit_test::LocalServerSocket>::listen(ServerConfig::default(), |host| {
        Err(TransportError::BindFailed {
            addr: host.listen_addr,
            reason: "address in use".to_string(),
        })
    });
    assert!(matches!(
        result,
        Err(ConduitServerError::TransportInit {
            source: TransportError::BindFailed { .. }
        })
    ));
}

#[test]
fn stopping_the_server_ends_the_read_stream() {
    init_logger();
    let hub = LocalHub::new(&HostConfig::default());
    let server = TestServer::start(&hub, ServerConfig::default());
    let handle = server.handle().clone();

    let reader = std::thread::spawn(move || handle.read());
    server.stop().unwrap();

    assert!(reader.join().unwrap().is_none());
}

#[test]
fn requested_disconnect_frees_the_session() {
    init_logger();
    let hub = LocalHub::new(&HostConfig::default());
    let server = TestServer::start(&hub, ServerConfig::default());

    let client = connected_client(&hub);
    let session_id = session_of(&server, &client, b"hello");

    server.handle().request_disconnect(session_id);
    assert!(wait_until(|| hub.connected_peers().is_empty()));
    assert!(wait_until(|| client.state() == ClientState::Disconnected));

    let envelope: Arc<Envelope> = Envelope::addressed(session_id, 0, b"late".to_vec()).shared();
    server.handle().send(envelope);
    assert!(wait_until(|| server.handle().stats().dropped_sends == 1));
}
