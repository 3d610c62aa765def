//! Full handshakes: cookie exchange, certificates, client authentication.

use std::sync::Arc;
use std::time::Instant;

use cdtls::certificate::{
    calculate_fingerprint, generate_self_signed_certificate,
    generate_self_signed_certificate_on, FingerprintVerifier,
};
use cdtls::curve::SECP384R1;
use cdtls::message::CipherSuite;
use cdtls::{Config, Dtls, Error, HandshakeState, SessionCache};

use crate::common::*;

#[test]
fn cookie_exchange_then_full_handshake() {
    init_log();
    let now = Instant::now();

    let server_cert = cert();
    let config = default_config();
    let sessions = Arc::new(SessionCache::new(8));

    let mut client = Dtls::new_client(config.clone(), cert(), now).expect("client");
    let mut server =
        Dtls::new_server(config, server_cert.clone(), sessions.clone(), now).expect("server");

    assert_eq!(client.state(), HandshakeState::AwaitingPeerHello);
    assert_eq!(server.state(), HandshakeState::AwaitingPeerHello);

    // FLIGHT 1: ClientHello without cookie
    let f1 = collect_packets(&mut client);
    assert_eq!(flight_types(&f1), vec![CLIENT_HELLO]);
    deliver_packets(&f1, &mut server, now);

    // FLIGHT 2: HelloVerifyRequest, server stays where it was
    let f2 = collect_packets(&mut server);
    assert_eq!(flight_types(&f2), vec![HELLO_VERIFY_REQUEST]);
    assert_eq!(server.state(), HandshakeState::AwaitingPeerHello);
    deliver_packets(&f2, &mut client, now);

    // FLIGHT 3: ClientHello with cookie
    let f3 = collect_packets(&mut client);
    assert_eq!(flight_types(&f3), vec![CLIENT_HELLO]);
    deliver_packets(&f3, &mut server, now);

    // FLIGHT 4
    let f4 = collect_packets(&mut server);
    assert_eq!(
        flight_types(&f4),
        vec![SERVER_HELLO, CERTIFICATE, SERVER_KEY_EXCHANGE, SERVER_HELLO_DONE]
    );
    assert_eq!(server.state(), HandshakeState::KeyExchangeInFlight);
    deliver_packets(&f4, &mut client, now);

    // FLIGHT 5: no certificate requested
    let out5 = drain_outputs(&mut client);
    assert_eq!(flight_types(&out5.packets), vec![CLIENT_KEY_EXCHANGE]);
    assert_eq!(out5.peer_cert.as_deref(), Some(&server_cert.certificate[..]));
    assert_eq!(client.state(), HandshakeState::AwaitingFinished);

    let ctypes: Vec<u8> = collect_headers(&out5.packets).iter().map(|h| h.ctype).collect();
    assert!(ctypes.contains(&CHANGE_CIPHER_SPEC));
    deliver_packets(&out5.packets, &mut server, now);

    // FLIGHT 6
    let out6 = drain_outputs(&mut server);
    assert!(out6.connected);
    assert!(server.is_established());
    let hdrs = collect_headers(&out6.packets);
    assert_eq!(hdrs[0].ctype, CHANGE_CIPHER_SPEC);
    assert_eq!(hdrs[1].epoch, 1);
    deliver_packets(&out6.packets, &mut client, now);

    let done = drain_outputs(&mut client);
    assert!(done.connected);
    assert!(done.packets.is_empty());
    assert!(client.is_established());

    let cs = client.session().expect("client session");
    let ss = server.session().expect("server session");
    assert_eq!(cs.master_secret(), ss.master_secret());
    assert_eq!(cs.id(), ss.id());
    assert_eq!(sessions.len(), 1);
}

#[test]
fn handshake_without_cookie_exchange() {
    let now = Instant::now();
    let (mut client, mut server, _) = new_pair(no_cookie_config(), no_cookie_config(), now);

    let f1 = collect_packets(&mut client);
    deliver_packets(&f1, &mut server, now);

    let f2 = collect_packets(&mut server);
    let types = flight_types(&f2);
    assert_eq!(types[0], SERVER_HELLO);
    assert!(!types.contains(&HELLO_VERIFY_REQUEST));
    deliver_packets(&f2, &mut client, now);

    let (_, _) = run_handshake(&mut client, &mut server, now);
    assert!(client.is_established());
    assert!(server.is_established());
}

#[test]
fn retransmitted_hello_after_cookie_gets_same_cookie() {
    let now = Instant::now();
    let (mut client, mut server, _) = new_pair(default_config(), default_config(), now);

    let f1 = collect_packets(&mut client);
    deliver_packets(&f1, &mut server, now);
    let first = collect_packets(&mut server);

    // The same ClientHello again: the saved HelloVerifyRequest is resent.
    deliver_packets(&f1, &mut server, now);
    let second = collect_packets(&mut server);

    assert_eq!(flight_types(&second), vec![HELLO_VERIFY_REQUEST]);
    // Same content, only the record sequence number differs.
    assert_eq!(first[0][13..], second[0][13..]);
}

#[test]
fn application_data_both_ways() {
    let now = Instant::now();
    let (mut client, mut server, _) = new_pair(default_config(), default_config(), now);
    run_handshake(&mut client, &mut server, now);
    assert!(client.is_established());

    client.send_application_data(b"ping").expect("client send");
    let c = drain_outputs(&mut client);
    let hdrs = collect_headers(&c.packets);
    assert_eq!(hdrs.len(), 1);
    assert_eq!(hdrs[0].ctype, APPLICATION_DATA);
    assert_eq!(hdrs[0].epoch, 1);
    deliver_packets(&c.packets, &mut server, now);

    let s = drain_outputs(&mut server);
    assert_eq!(s.app_data, vec![b"ping".to_vec()]);

    server.send_application_data(b"pong").expect("server send");
    let s = drain_outputs(&mut server);
    deliver_packets(&s.packets, &mut client, now);
    let c = drain_outputs(&mut client);
    assert_eq!(c.app_data, vec![b"pong".to_vec()]);
}

#[test]
fn application_data_before_handshake_is_refused() {
    let now = Instant::now();
    let (mut client, _server, _) = new_pair(default_config(), default_config(), now);
    assert_eq!(
        client.send_application_data(b"early"),
        Err(Error::NotEstablished)
    );
    // Not fatal.
    assert_eq!(client.state(), HandshakeState::AwaitingPeerHello);
}

#[test]
fn client_certificate_is_requested_and_verified() {
    init_log();
    let now = Instant::now();

    let client_cert = cert();
    let config = Arc::new(
        Config::builder()
            .require_client_certificate(true)
            .build()
            .expect("config"),
    );
    let sessions = Arc::new(SessionCache::new(8));
    let mut client = Dtls::new_client(config.clone(), client_cert.clone(), now).unwrap();
    let mut server = Dtls::new_server(config, cert(), sessions, now).unwrap();

    // Through flight 3.
    for _ in 0..2 {
        let c = collect_packets(&mut client);
        deliver_packets(&c, &mut server, now);
        let s = collect_packets(&mut server);
        if flight_types(&s).contains(&SERVER_HELLO) {
            assert!(flight_types(&s).contains(&CERTIFICATE_REQUEST));
            deliver_packets(&s, &mut client, now);
            break;
        }
        deliver_packets(&s, &mut client, now);
    }

    let f5 = collect_packets(&mut client);
    assert_eq!(
        flight_types(&f5),
        vec![CERTIFICATE, CLIENT_KEY_EXCHANGE, CERTIFICATE_VERIFY]
    );
    deliver_packets(&f5, &mut server, now);

    let out = drain_outputs(&mut server);
    assert_eq!(out.peer_cert.as_deref(), Some(&client_cert.certificate[..]));
    assert!(out.connected);
    deliver_packets(&out.packets, &mut client, now);

    assert!(drain_outputs(&mut client).connected);
    assert!(client.is_established());
}

#[test]
fn fingerprint_pinning_accepts_known_certificate() {
    let now = Instant::now();
    let server_cert = cert();

    let verifier = FingerprintVerifier::new()
        .with_fingerprint(calculate_fingerprint(&server_cert.certificate));
    let client_config = Arc::new(
        Config::builder()
            .cert_verifier(Arc::new(verifier))
            .build()
            .unwrap(),
    );

    let sessions = Arc::new(SessionCache::new(8));
    let mut client = Dtls::new_client(client_config, cert(), now).unwrap();
    let mut server = Dtls::new_server(default_config(), server_cert, sessions, now).unwrap();

    run_handshake(&mut client, &mut server, now);
    assert!(client.is_established());
    assert!(server.is_established());
}

#[test]
fn unknown_certificate_fails_both_sides() {
    let now = Instant::now();

    let verifier = FingerprintVerifier::new().with_fingerprint(vec![0; 32]);
    let client_config = Arc::new(
        Config::builder()
            .cert_verifier(Arc::new(verifier))
            .build()
            .unwrap(),
    );

    let (mut client, mut server, sessions) = new_pair(client_config, default_config(), now);
    let (client_out, _) = run_handshake(&mut client, &mut server, now);

    assert_eq!(client.state(), HandshakeState::Failed);
    assert!(!client_out.connected);

    // The bad_certificate alert ended the server as well.
    assert_eq!(server.state(), HandshakeState::Failed);
    assert!(sessions.is_empty());

    // Nothing more comes out of a failed connection.
    assert_eq!(
        client.send_application_data(b"x"),
        Err(Error::ConnectionClosed)
    );
}

#[test]
fn alert_is_sent_on_failure() {
    let now = Instant::now();

    let verifier = FingerprintVerifier::new().with_fingerprint(vec![0; 32]);
    let client_config = Arc::new(
        Config::builder()
            .cert_verifier(Arc::new(verifier))
            .cookie_exchange(false)
            .build()
            .unwrap(),
    );
    let (mut client, mut server, _) = new_pair(client_config, no_cookie_config(), now);

    let f1 = collect_packets(&mut client);
    deliver_packets(&f1, &mut server, now);
    let f2 = collect_packets(&mut server);

    let err = f2
        .iter()
        .map(|p| client.handle_packet(p, now))
        .find_map(|r| r.err())
        .expect("certificate rejected");
    assert!(matches!(err, Error::CertificateError(_)));

    let out = collect_packets(&mut client);
    let hdrs = collect_headers(&out);
    assert_eq!(hdrs.len(), 1);
    assert_eq!(hdrs[0].ctype, ALERT);
    // level fatal(2), description bad_certificate(42)
    assert_eq!(&out[0][13..], &[2, 42]);
}

#[test]
fn p384_certificate_and_aes256() {
    let now = Instant::now();

    let config = Arc::new(
        Config::builder()
            .cipher_suites([CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384])
            .named_curves([SECP384R1])
            .build()
            .unwrap(),
    );

    let client_cert = generate_self_signed_certificate_on(SECP384R1).unwrap();
    let server_cert = generate_self_signed_certificate_on(SECP384R1).unwrap();
    let sessions = Arc::new(SessionCache::new(8));

    let mut client = Dtls::new_client(config.clone(), client_cert, now).unwrap();
    let mut server = Dtls::new_server(config, server_cert, sessions, now).unwrap();

    run_handshake(&mut client, &mut server, now);
    assert!(client.is_established());
    assert!(server.is_established());
    assert_eq!(
        client.session().unwrap().cipher_suite(),
        CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384
    );
    assert_eq!(client.session().unwrap().master_secret().len(), 48);
}

#[test]
fn server_picks_its_preferred_suite() {
    let now = Instant::now();

    let client_config = Arc::new(
        Config::builder()
            .cipher_suites([
                CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
                CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384,
            ])
            .build()
            .unwrap(),
    );
    let server_config = Arc::new(
        Config::builder()
            .cipher_suites([
                CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384,
                CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
            ])
            .build()
            .unwrap(),
    );

    let (mut client, mut server, _) = new_pair(client_config, server_config, now);
    run_handshake(&mut client, &mut server, now);

    assert_eq!(
        server.session().unwrap().cipher_suite(),
        CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384
    );
}

#[test]
fn no_common_curve_fails() {
    let now = Instant::now();

    let client_config = Arc::new(
        Config::builder()
            .named_curves([SECP384R1])
            .cookie_exchange(false)
            .build()
            .unwrap(),
    );
    let server_config = Arc::new(
        Config::builder()
            .named_curves([cdtls::curve::SECP256R1])
            .cookie_exchange(false)
            .build()
            .unwrap(),
    );

    let (mut client, mut server, _) = new_pair(client_config, server_config, now);
    let f1 = collect_packets(&mut client);
    let err = server.handle_packet(&f1[0], now).unwrap_err();
    assert!(matches!(err, Error::UnsupportedCurve(_)));
    assert_eq!(server.state(), HandshakeState::Failed);
}

#[test]
fn close_notify_closes_peer() {
    let now = Instant::now();
    let (mut client, mut server, _) = new_pair(default_config(), default_config(), now);
    run_handshake(&mut client, &mut server, now);

    client.close().unwrap();
    assert_eq!(client.state(), HandshakeState::Closed);

    let out = collect_packets(&mut client);
    assert_eq!(collect_headers(&out)[0].ctype, ALERT);

    let err = server.handle_packet(&out[0], now).unwrap_err();
    assert!(matches!(err, Error::AlertReceived(_)));
    assert_eq!(server.state(), HandshakeState::Closed);

    // Nothing is echoed.
    assert!(collect_packets(&mut server).is_empty());
}

#[test]
fn self_signed_certificate_generation() {
    let c = generate_self_signed_certificate().unwrap();
    assert!(!c.certificate.is_empty());
    assert!(!c.private_key.is_empty());
}
