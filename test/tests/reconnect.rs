/// Connection loss, refusal and recovery of the client's connect cycle

use conduit_client::{ClientSendError, ClientState};
use conduit_server::ServerConfig;
use conduit_shared::{Envelope, HostConfig, SessionId};
use conduit_test::{connect_client, fast_client_config, init_logger, wait_until, LocalHub, TestServer};

#[test]
fn client_reconnects_after_the_link_drops() {
    init_logger();
    let hub = LocalHub::new(&HostConfig::default());
    let server = TestServer::start(&hub, ServerConfig::default());
    let client = connect_client(&hub, fast_client_config());
    assert!(wait_until(|| client.state() == ClientState::Connected));

    let peers = hub.connected_peers();
    assert_eq!(peers.len(), 1);
    hub.drop_link(peers[0]);

    assert!(wait_until(|| client.stats().connect_attempts >= 2
        && client.state() == ClientState::Connected));
    assert!(wait_until(|| server.handle().stats().connects == 2));
    assert_eq!(server.handle().stats().disconnects, 1);

    // the freed id goes to the new connection
    client.send(Envelope::new(0, b"back".to_vec()).shared()).unwrap();
    let envelope = server.handle().read().unwrap();
    assert_eq!(envelope.session_id(), SessionId::new(1));
    assert_eq!(envelope.payload(), b"back");
}

#[test]
fn refused_client_keeps_retrying_until_accepted() {
    init_logger();
    let hub = LocalHub::new(&HostConfig::default());
    let server = TestServer::start(&hub, ServerConfig::default());
    hub.refuse_connections(true);

    let client = connect_client(&hub, fast_client_config());
    assert!(wait_until(|| client.stats().connect_attempts >= 2));

    let refused = client.send(Envelope::new(0, b"early".to_vec()).shared());
    assert!(matches!(refused, Err(ClientSendError::NotConnected { state }) if state != ClientState::Connected));

    hub.refuse_connections(false);
    assert!(wait_until(|| client.state() == ClientState::Connected));
    client.send(Envelope::new(0, b"late".to_vec()).shared()).unwrap();
    assert_eq!(server.handle().read().unwrap().payload(), b"late");
}

#[test]
fn client_retries_while_no_server_exists() {
    init_logger();
    let hub = LocalHub::new(&HostConfig::default());
    let client = connect_client(&hub, fast_client_config());

    assert!(wait_until(|| client.stats().connect_attempts >= 3));
    assert_ne!(client.state(), ClientState::Connected);

    let _server = TestServer::start(&hub, ServerConfig::default());
    assert!(wait_until(|| client.state() == ClientState::Connected));
}

#[test]
fn quit_interrupts_the_backoff_wait() {
    init_logger();
    let hub = LocalHub::new(&HostConfig::default());
    let mut config = fast_client_config();
    config.backoff = conduit_client::ReconnectBackoff::Fixed(std::time::Duration::from_secs(60));
    let client = connect_client(&hub, config);
    assert!(wait_until(|| client.state() == ClientState::Error));

    let started = std::time::Instant::now();
    drop(client);
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}
