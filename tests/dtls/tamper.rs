//! Replayed, corrupted and garbage datagrams.

use std::time::Instant;

use cdtls::{Dtls, Error, HandshakeState};

use crate::common::*;

fn established() -> (Dtls, Dtls, Instant) {
    let now = Instant::now();
    let (mut client, mut server, _) = new_pair(default_config(), default_config(), now);
    run_handshake(&mut client, &mut server, now);
    assert!(client.is_established());
    assert!(server.is_established());
    (client, server, now)
}

fn app_packet(from: &mut Dtls, data: &[u8]) -> Vec<u8> {
    from.send_application_data(data).unwrap();
    let mut out = collect_packets(from);
    assert_eq!(out.len(), 1);
    out.remove(0)
}

#[test]
fn corrupted_application_data_is_dropped() {
    init_log();
    let (mut client, mut server, now) = established();

    let mut packet = app_packet(&mut client, b"hello");
    let last = packet.len() - 1;
    packet[last] ^= 0x01;

    assert_eq!(server.handle_packet(&packet, now), Ok(()));
    assert!(drain_outputs(&mut server).app_data.is_empty());
    assert_eq!(server.stats().undecryptable, 1);
    assert!(server.is_established());

    // The connection still works.
    let packet = app_packet(&mut client, b"again");
    server.handle_packet(&packet, now).unwrap();
    assert_eq!(drain_outputs(&mut server).app_data, vec![b"again".to_vec()]);
}

#[test]
fn replayed_datagram_is_dropped() {
    let (mut client, mut server, now) = established();

    let packet = app_packet(&mut client, b"once");
    server.handle_packet(&packet, now).unwrap();
    server.handle_packet(&packet, now).unwrap();

    assert_eq!(drain_outputs(&mut server).app_data, vec![b"once".to_vec()]);
    assert_eq!(server.stats().replayed, 1);
    assert!(server.is_established());
}

#[test]
fn garbage_is_counted() {
    let (_client, mut server, now) = established();

    let before = server.stats().malformed;
    server.handle_packet(&[0x16, 0xfe, 0xfd, 0x00], now).unwrap();
    assert_eq!(server.stats().malformed, before + 1);
    assert!(server.is_established());
}

#[test]
fn tampered_finished_fails_handshake() {
    let now = Instant::now();
    let (mut client, mut server, _) = new_pair(no_cookie_config(), no_cookie_config(), now);

    let f1 = collect_packets(&mut client);
    deliver_packets(&f1, &mut server, now);
    let f4 = collect_packets(&mut server);
    deliver_packets(&f4, &mut client, now);
    let f5 = collect_packets(&mut client);
    deliver_packets(&f5, &mut server, now);

    let mut f6 = collect_packets(&mut server);
    let datagram = f6.last_mut().unwrap();
    let last = datagram.len() - 1;
    datagram[last] ^= 0x80;

    let err = f6
        .iter()
        .map(|p| client.handle_packet(p, now))
        .find_map(|r| r.err())
        .expect("handshake fails");
    assert_eq!(err, Error::HandshakeDecryptionFailed);
    assert_eq!(client.state(), HandshakeState::Failed);
    assert!(client.session().is_none());
}

#[test]
fn application_data_in_plaintext_is_dropped() {
    let (_client, mut server, now) = established();

    let record = [23, 0xfe, 0xfd, 0, 0, 0, 0, 0, 0, 0, 50, 0, 3, 1, 2, 3];
    server.handle_packet(&record, now).unwrap();
    assert!(drain_outputs(&mut server).app_data.is_empty());
    assert!(server.is_established());
}

#[test]
fn plaintext_alert_after_epoch_change_is_ignored() {
    let (_client, mut server, now) = established();

    // fatal handshake_failure, unprotected
    let record = [21, 0xfe, 0xfd, 0, 0, 0, 0, 0, 0, 0, 60, 0, 2, 2, 40];
    server.handle_packet(&record, now).unwrap();
    assert!(server.is_established());
}
