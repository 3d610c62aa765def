//! Endpoints exchanging datagrams over an in-memory transport.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use cdtls::{CloseReason, Config, Endpoint, Error, Event, HandshakeState, Transport};

use crate::common::*;

#[derive(Default)]
struct Wire {
    sent: Vec<(SocketAddr, Vec<u8>)>,
    broken: bool,
}

impl Transport for Wire {
    fn send_datagram(&mut self, peer: SocketAddr, bytes: &[u8]) -> io::Result<()> {
        if self.broken {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "wire cut"));
        }
        self.sent.push((peer, bytes.to_vec()));
        Ok(())
    }
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

const CLIENT: u16 = 5684;
const SERVER: u16 = 5685;

fn endpoints() -> (Endpoint<Wire>, Endpoint<Wire>) {
    let client = Endpoint::new(default_config(), cert(), Wire::default());
    let server = Endpoint::new(default_config(), cert(), Wire::default());
    (client, server)
}

/// Move datagrams both ways until the wire is quiet.
fn pump(client: &mut Endpoint<Wire>, server: &mut Endpoint<Wire>, now: Instant) {
    for _ in 0..20 {
        let to_server = std::mem::take(&mut client.transport_mut().sent);
        let to_client = std::mem::take(&mut server.transport_mut().sent);
        if to_server.is_empty() && to_client.is_empty() {
            break;
        }
        for (peer, bytes) in to_server {
            assert_eq!(peer, addr(SERVER));
            let _ = server.on_datagram_received(addr(CLIENT), &bytes, now);
        }
        for (peer, bytes) in to_client {
            assert_eq!(peer, addr(CLIENT));
            let _ = client.on_datagram_received(addr(SERVER), &bytes, now);
        }
    }
}

fn events(endpoint: &mut Endpoint<Wire>) -> Vec<Event> {
    std::iter::from_fn(|| endpoint.poll_event()).collect()
}

#[test]
fn connect_and_exchange_data() {
    init_log();
    let now = Instant::now();
    let (mut client, mut server) = endpoints();

    client.open(addr(SERVER), now).unwrap();
    // Held until connected.
    client.send_secure(addr(SERVER), b"early bird").unwrap();

    pump(&mut client, &mut server, now);

    let client_events = events(&mut client);
    assert!(client_events.contains(&Event::Connected(addr(SERVER))));
    assert!(client_events
        .iter()
        .any(|e| matches!(e, Event::PeerCertificate(p, _) if *p == addr(SERVER))));

    let server_events = events(&mut server);
    assert!(server_events.contains(&Event::Connected(addr(CLIENT))));
    assert!(server_events.contains(&Event::ApplicationData(
        addr(CLIENT),
        b"early bird".to_vec()
    )));

    server.send_secure(addr(CLIENT), b"reply").unwrap();
    pump(&mut client, &mut server, now);
    assert_eq!(
        events(&mut client),
        vec![Event::ApplicationData(addr(SERVER), b"reply".to_vec())]
    );

    assert_eq!(
        client.connection(addr(SERVER)).unwrap().state(),
        HandshakeState::Established
    );
}

#[test]
fn close_is_reported_on_both_sides() {
    let now = Instant::now();
    let (mut client, mut server) = endpoints();
    client.open(addr(SERVER), now).unwrap();
    pump(&mut client, &mut server, now);
    events(&mut client);
    events(&mut server);

    client.close(addr(SERVER)).unwrap();
    assert_eq!(
        events(&mut client),
        vec![Event::Closed(addr(SERVER), CloseReason::Local)]
    );
    assert!(client.connection(addr(SERVER)).is_none());

    pump(&mut client, &mut server, now);
    assert_eq!(
        events(&mut server),
        vec![Event::Closed(addr(CLIENT), CloseReason::Peer)]
    );
    assert_eq!(server.connections().count(), 0);
}

#[test]
fn second_open_resumes_session() {
    let now = Instant::now();
    let (mut client, mut server) = endpoints();

    client.open(addr(SERVER), now).unwrap();
    pump(&mut client, &mut server, now);
    client.close(addr(SERVER)).unwrap();
    pump(&mut client, &mut server, now);
    events(&mut client);
    events(&mut server);

    client.open(addr(SERVER), now).unwrap();
    pump(&mut client, &mut server, now);

    assert!(events(&mut client).contains(&Event::Connected(addr(SERVER))));
    assert!(client.connection(addr(SERVER)).unwrap().dtls().is_resumed());
    assert!(server.connection(addr(CLIENT)).unwrap().dtls().is_resumed());
    assert_eq!(server.session_cache().len(), 1);
}

#[test]
fn unknown_peer_without_handshake_is_refused() {
    let now = Instant::now();
    let (_, mut server) = endpoints();

    let err = server
        .on_datagram_received(addr(CLIENT), &[23, 0xfe, 0xfd, 0, 1], now)
        .unwrap_err();
    assert_eq!(err, Error::UnknownPeer(addr(CLIENT)));
    assert_eq!(server.connections().count(), 0);

    assert_eq!(
        server.send_secure(addr(CLIENT), b"x"),
        Err(Error::UnknownPeer(addr(CLIENT)))
    );
}

#[test]
fn idle_connection_is_closed() {
    let mut now = Instant::now();
    let config = std::sync::Arc::new(
        Config::builder()
            .idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap(),
    );
    let mut client = Endpoint::new(config, cert(), Wire::default());
    let mut server = Endpoint::new(default_config(), cert(), Wire::default());

    client.open(addr(SERVER), now).unwrap();
    pump(&mut client, &mut server, now);
    events(&mut client);

    let deadline = client.poll_timeout().unwrap();
    assert!(deadline <= now + Duration::from_secs(30));

    now += Duration::from_secs(31);
    client.handle_timeout(now).unwrap();
    assert_eq!(
        events(&mut client),
        vec![Event::Closed(addr(SERVER), CloseReason::IdleTimeout)]
    );
    assert!(client.poll_timeout().is_none());

    // The close_notify reaches the server.
    pump(&mut client, &mut server, now);
    assert!(events(&mut server).contains(&Event::Closed(addr(CLIENT), CloseReason::Peer)));
}

#[test]
fn handshake_failure_is_reported() {
    let mut now = Instant::now();
    let config = std::sync::Arc::new(
        Config::builder()
            .handshake_timeout(Duration::from_secs(5))
            .build()
            .unwrap(),
    );
    let mut client = Endpoint::new(config, cert(), Wire::default());
    client.open(addr(SERVER), now).unwrap();

    // Nobody answers.
    now += Duration::from_secs(6);
    client.handle_timeout(now).unwrap();

    let events = events(&mut client);
    assert!(matches!(
        events.last(),
        Some(Event::Closed(_, CloseReason::Failed(Error::Timeout(_))))
    ));
    assert!(client.connection(addr(SERVER)).is_none());
}

#[test]
fn held_data_survives_a_full_transmit_queue() {
    let now = Instant::now();
    let config = std::sync::Arc::new(Config::builder().max_queue_tx(2).build().unwrap());
    let mut client = Endpoint::new(default_config(), cert(), Wire::default());
    let mut server = Endpoint::new(config, cert(), Wire::default());

    client.open(addr(SERVER), now).unwrap();
    for (_, bytes) in std::mem::take(&mut client.transport_mut().sent) {
        server.on_datagram_received(addr(CLIENT), &bytes, now).unwrap();
    }

    // Each payload needs a datagram of its own.
    server.send_secure(addr(CLIENT), &[1; 1100]).unwrap();
    server.send_secure(addr(CLIENT), &[2; 1100]).unwrap();
    assert_eq!(server.connection(addr(CLIENT)).unwrap().pending_len(), 2);

    pump(&mut client, &mut server, now);
    assert!(events(&mut server).contains(&Event::Connected(addr(CLIENT))));
    assert_eq!(server.connection(addr(CLIENT)).unwrap().pending_len(), 1);

    let received: Vec<Event> = events(&mut client)
        .into_iter()
        .filter(|e| matches!(e, Event::ApplicationData(..)))
        .collect();
    assert_eq!(received, vec![Event::ApplicationData(addr(SERVER), vec![1; 1100])]);

    server.send_secure(addr(CLIENT), b"x").unwrap();
    pump(&mut client, &mut server, now);
    assert_eq!(server.connection(addr(CLIENT)).unwrap().pending_len(), 0);
    assert_eq!(
        events(&mut client),
        vec![
            Event::ApplicationData(addr(SERVER), vec![2; 1100]),
            Event::ApplicationData(addr(SERVER), b"x".to_vec()),
        ]
    );
}

#[test]
fn oversized_held_data_is_refused() {
    let now = Instant::now();
    let (mut client, _) = endpoints();
    client.open(addr(SERVER), now).unwrap();

    let max = client.connection(addr(SERVER)).unwrap().dtls().max_application_data();
    assert_eq!(
        client.send_secure(addr(SERVER), &vec![0; max + 1]),
        Err(Error::PayloadTooLarge(max + 1))
    );
    assert_eq!(client.connection(addr(SERVER)).unwrap().pending_len(), 0);
}

#[test]
fn failed_connection_is_removed_when_transport_breaks() {
    let mut now = Instant::now();
    let config = std::sync::Arc::new(
        Config::builder()
            .handshake_timeout(Duration::from_secs(5))
            .build()
            .unwrap(),
    );
    let mut client = Endpoint::new(config, cert(), Wire::default());
    client.transport_mut().broken = true;

    assert!(matches!(
        client.open(addr(SERVER), now),
        Err(Error::Transport(_))
    ));
    assert!(client.connection(addr(SERVER)).is_some());

    now += Duration::from_secs(6);
    assert!(matches!(client.handle_timeout(now), Err(Error::Transport(_))));

    assert!(client.connection(addr(SERVER)).is_none());
    assert!(matches!(
        events(&mut client).last(),
        Some(Event::Closed(_, CloseReason::Failed(Error::Timeout(_))))
    ));
}
