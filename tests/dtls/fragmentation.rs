//! Handshake messages larger than the MTU.

use std::sync::Arc;
use std::time::Instant;

use cdtls::{Config, Error, HandshakeState};

use crate::common::*;

#[test]
fn small_mtu_handshake() {
    init_log();
    let now = Instant::now();
    let config = config_with_mtu(256);
    let (mut client, mut server, _) = new_pair(config.clone(), config, now);

    let (client_out, server_out) = run_handshake(&mut client, &mut server, now);

    for p in client_out.packets.iter().chain(server_out.packets.iter()) {
        assert!(p.len() <= 256, "datagram of {} bytes", p.len());
    }

    // The certificate does not fit one datagram.
    let certificate_fragments = server_out
        .packets
        .iter()
        .flat_map(|p| parse_handshake_types(p))
        .filter(|t| *t == CERTIFICATE)
        .count();
    assert!(certificate_fragments > 1);

    assert!(client.is_established());
    assert!(server.is_established());
}

#[test]
fn application_data_is_bounded_by_mtu() {
    let now = Instant::now();
    let config = config_with_mtu(256);
    let (mut client, mut server, _) = new_pair(config.clone(), config, now);
    run_handshake(&mut client, &mut server, now);

    let max = client.max_application_data();
    assert!(max > 0 && max < 256);

    let data = vec![7u8; max];
    client.send_application_data(&data).unwrap();
    let out = collect_packets(&mut client);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].len(), 256);

    deliver_packets(&out, &mut server, now);
    assert_eq!(drain_outputs(&mut server).app_data, vec![data]);
}

#[test]
fn oversized_application_data_is_refused() {
    let now = Instant::now();
    let config = config_with_mtu(256);
    let (mut client, mut server, _) = new_pair(config.clone(), config, now);
    run_handshake(&mut client, &mut server, now);

    let data = vec![0u8; client.max_application_data() + 1];
    assert_eq!(
        client.send_application_data(&data),
        Err(Error::PayloadTooLarge(data.len()))
    );
    // Not fatal.
    assert!(client.is_established());
}

#[test]
fn mtu_below_minimum_is_rejected() {
    let result = cdtls::Config::builder().mtu(100).build();
    assert!(matches!(result, Err(Error::ConfigError(_))));
}

#[test]
fn flight_larger_than_transmit_queue_fails() {
    let now = Instant::now();
    let server_config = Arc::new(
        Config::builder()
            .mtu(256)
            .max_queue_tx(1)
            .cookie_exchange(false)
            .build()
            .unwrap(),
    );
    let (mut client, mut server, _) = new_pair(no_cookie_config(), server_config, now);

    let f1 = collect_packets(&mut client);
    let err = f1
        .iter()
        .map(|p| server.handle_packet(p, now))
        .find_map(|r| r.err())
        .expect("server flight overflows");

    assert_eq!(err, Error::FlightOverflow);
    assert_eq!(server.state(), HandshakeState::Failed);
}
