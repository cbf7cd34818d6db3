/// End-to-end traffic between a server and its clients over the in-memory
/// transport

use std::sync::Arc;

use conduit_client::{Client, ClientConfig, ClientSendError, ClientState, ConduitClientError};
use conduit_server::ServerConfig;
use conduit_shared::{Envelope, HostConfig, Reliability, TransportError};
use conduit_test::{connect_client, fast_client_config, init_logger, wait_until, LocalHub, TestServer};

fn two_channel_hub() -> LocalHub {
    LocalHub::new(&HostConfig {
        channel_count: 2,
        ..HostConfig::default()
    })
}

fn connected_client(hub: &LocalHub, config: ClientConfig) -> Client {
    let client = connect_client(hub, config);
    assert!(wait_until(|| client.state() == ClientState::Connected));
    client
}

#[test]
fn client_payload_arrives_once_on_its_channel() {
    init_logger();
    let hub = two_channel_hub();
    let server = TestServer::start(&hub, ServerConfig::default());
    let client = connected_client(&hub, fast_client_config());

    let payload: Vec<u8> = (0..10).collect();
    client.send(Envelope::new(1, payload.clone()).shared()).unwrap();

    let envelope = server.handle().read().unwrap();
    assert_eq!(envelope.channel_id(), 1);
    assert_eq!(envelope.payload(), &payload[..]);
    assert!(envelope.session_id().is_bound());
    assert!(server.handle().try_read().is_none());
    assert_eq!(client.stats().sent, 1);
}

#[test]
fn server_reply_reaches_the_client() {
    init_logger();
    let hub = two_channel_hub();
    let server = TestServer::start(&hub, ServerConfig::default());
    let client = connected_client(&hub, fast_client_config());

    client.send(Envelope::new(0, b"ping".to_vec()).shared()).unwrap();
    let request = server.handle().read().unwrap();
    server.handle().send(request.reply(b"pong".to_vec()).shared());

    let reply = client.read().unwrap();
    assert_eq!(reply.payload(), b"pong");
    assert_eq!(reply.channel_id(), 0);
    assert!(wait_until(|| server.handle().stats().sent == 1));
    assert_eq!(client.stats().received, 1);
}

#[test]
fn unreliable_envelopes_travel_like_reliable_ones_locally() {
    init_logger();
    let hub = two_channel_hub();
    let server = TestServer::start(&hub, ServerConfig::default());
    let client = connected_client(&hub, fast_client_config());

    client
        .send_with(Envelope::new(1, b"state".to_vec()).shared(), Reliability::Unreliable)
        .unwrap();
    let envelope = server.handle().read().unwrap();
    assert_eq!(envelope.payload(), b"state");
}

#[test]
fn envelope_on_unknown_channel_is_dropped_by_the_transport() {
    init_logger();
    let hub = two_channel_hub();
    let server = TestServer::start(&hub, ServerConfig::default());
    let client = connected_client(&hub, fast_client_config());

    client.send(Envelope::new(5, b"lost".to_vec()).shared()).unwrap();
    client.send(Envelope::new(0, b"kept".to_vec()).shared()).unwrap();

    assert_eq!(server.handle().read().unwrap().payload(), b"kept");
    assert!(wait_until(|| client.stats().dropped_sends == 1));
}

#[test]
fn requested_disconnect_ends_the_client() {
    init_logger();
    let hub = two_channel_hub();
    let server = TestServer::start(&hub, ServerConfig::default());
    let client = connected_client(&hub, fast_client_config());

    client.send(Envelope::new(0, b"hi".to_vec()).shared()).unwrap();
    let session_id = server.handle().read().unwrap().session_id();
    server.handle().request_disconnect(session_id);

    assert!(wait_until(|| client.state() == ClientState::Disconnected));
    assert!(client.read().is_none());
    assert_eq!(
        client.send(Envelope::new(0, b"too late".to_vec()).shared()),
        Err(ClientSendError::NotConnected {
            state: ClientState::Disconnected
        })
    );
    // a graceful close is final
    assert_eq!(client.stats().connect_attempts, 1);
}

#[test]
fn dropping_the_server_disconnects_every_client() {
    init_logger();
    let hub = two_channel_hub();
    let server = TestServer::start(&hub, ServerConfig::default());
    let first = connected_client(&hub, fast_client_config());
    let second = connected_client(&hub, fast_client_config());

    drop(server);

    assert!(wait_until(|| first.state() == ClientState::Disconnected));
    assert!(wait_until(|| second.state() == ClientState::Disconnected));
}

#[test]
fn quitting_the_client_ends_its_read_stream() {
    init_logger();
    let hub = two_channel_hub();
    let server = TestServer::start(&hub, ServerConfig::default());
    let client = Arc::new(connected_client(&hub, fast_client_config()));

    let reader = {
        let client = client.clone();
        std::thread::spawn(move || client.read())
    };
    client.quit();

    assert!(reader.join().unwrap().is_none());
    assert!(wait_until(|| server.handle().stats().disconnects == 1));
}

#[test]
fn transport_failure_at_client_start_is_reported() {
    let result = Client::connect(fast_client_config(), |_| {
        Err::<conduit_test::LocalClientSocket, _>(TransportError::InitFailed {
            reason: "no sockets left".to_string(),
        })
    });
    assert!(matches!(
        result,
        Err(ConduitClientError::TransportInit {
            source: TransportError::InitFailed { .. }
        })
    ));
}

#[test]
fn many_clients_exchange_with_one_server() {
    init_logger();
    let hub = two_channel_hub();
    let server = TestServer::start(&hub, ServerConfig::default());
    let clients: Vec<Client> = (0..8)
        .map(|_| connected_client(&hub, fast_client_config()))
        .collect();

    for (index, client) in clients.iter().enumerate() {
        for round in 0..25u8 {
            client
                .send(Envelope::new(0, vec![index as u8, round]).shared())
                .unwrap();
        }
    }

    let mut echoed = 0;
    while echoed < clients.len() * 25 {
        let envelope = server.handle().read().unwrap();
        server.handle().send(envelope.reply(envelope.payload().to_vec()).shared());
        echoed += 1;
    }

    for (index, client) in clients.iter().enumerate() {
        for round in 0..25u8 {
            let envelope = client.read().unwrap();
            // one channel, so order holds per client
            assert_eq!(envelope.payload(), &[index as u8, round]);
        }
    }
}

#[test]
fn quit_keeps_received_envelopes_readable_before_end_of_stream() {
    init_logger();
    let hub = two_channel_hub();
    let server = TestServer::start(&hub, ServerConfig::default());
    let client = connected_client(&hub, fast_client_config());

    client.send(Envelope::new(0, b"hi".to_vec()).shared()).unwrap();
    let request = server.handle().read().unwrap();
    for index in 0..50u8 {
        server.handle().send(request.reply(vec![index]).shared());
    }
    assert!(wait_until(|| client.stats().received == 50));

    client.quit();
    for index in 0..50u8 {
        let envelope = client.read().expect("received before quit");
        assert_eq!(envelope.payload(), &[index]);
    }
    assert!(client.read().is_none());
    assert!(client.read().is_none());
}
