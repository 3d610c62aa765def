//! Abbreviated handshakes from the server's session cache.

use std::sync::Arc;
use std::time::Instant;

use cdtls::{Dtls, Session, SessionCache};

use crate::common::*;

fn full_handshake(now: Instant) -> (Session, Arc<SessionCache>) {
    let (mut client, mut server, sessions) = new_pair(default_config(), default_config(), now);
    run_handshake(&mut client, &mut server, now);
    assert!(client.is_established());
    assert!(!client.is_resumed());

    let session = client.session().cloned().expect("session");
    assert!(session.is_resumable());
    (session, sessions)
}

#[test]
fn resumed_handshake_skips_key_exchange() {
    init_log();
    let now = Instant::now();
    let (session, sessions) = full_handshake(now);

    let mut client =
        Dtls::new_client_resuming(default_config(), cert(), session.clone(), now).unwrap();
    let mut server = Dtls::new_server(default_config(), cert(), sessions.clone(), now).unwrap();

    // Cookie exchange first.
    let f1 = collect_packets(&mut client);
    deliver_packets(&f1, &mut server, now);
    let f2 = collect_packets(&mut server);
    assert_eq!(flight_types(&f2), vec![HELLO_VERIFY_REQUEST]);
    deliver_packets(&f2, &mut client, now);
    let f3 = collect_packets(&mut client);
    deliver_packets(&f3, &mut server, now);

    // ServerHello, ChangeCipherSpec, Finished.
    let f4 = drain_outputs(&mut server);
    assert_eq!(flight_types(&f4.packets), vec![SERVER_HELLO]);
    let ctypes: Vec<u8> = collect_headers(&f4.packets).iter().map(|h| h.ctype).collect();
    assert_eq!(ctypes, vec![HANDSHAKE, CHANGE_CIPHER_SPEC, HANDSHAKE]);
    assert!(!server.is_established());
    deliver_packets(&f4.packets, &mut client, now);

    // ChangeCipherSpec, Finished.
    let f5 = drain_outputs(&mut client);
    assert!(f5.connected);
    assert!(f5.peer_cert.is_none());
    let hdrs = collect_headers(&f5.packets);
    assert_eq!(hdrs.len(), 2);
    assert_eq!(hdrs[0].ctype, CHANGE_CIPHER_SPEC);
    assert_eq!(hdrs[1].epoch, 1);
    deliver_packets(&f5.packets, &mut server, now);

    assert!(drain_outputs(&mut server).connected);
    assert!(client.is_resumed());
    assert!(server.is_resumed());

    let cs = client.session().unwrap();
    let ss = server.session().unwrap();
    assert_eq!(cs.master_secret(), session.master_secret());
    assert_eq!(ss.master_secret(), session.master_secret());
    assert_eq!(cs.id(), session.id());
    assert_eq!(sessions.len(), 1);
}

#[test]
fn resumed_connection_carries_application_data() {
    let now = Instant::now();
    let (session, sessions) = full_handshake(now);

    let mut client = Dtls::new_client_resuming(default_config(), cert(), session, now).unwrap();
    let mut server = Dtls::new_server(default_config(), cert(), sessions, now).unwrap();
    run_handshake(&mut client, &mut server, now);
    assert!(client.is_resumed());

    server.send_application_data(b"welcome back").unwrap();
    let out = collect_packets(&mut server);
    deliver_packets(&out, &mut client, now);
    assert_eq!(
        drain_outputs(&mut client).app_data,
        vec![b"welcome back".to_vec()]
    );
}

#[test]
fn unknown_session_falls_back_to_full_handshake() {
    let now = Instant::now();
    let (session, _) = full_handshake(now);

    // A server that never saw the session.
    let other = Arc::new(SessionCache::new(8));
    let mut client = Dtls::new_client_resuming(default_config(), cert(), session.clone(), now).unwrap();
    let mut server = Dtls::new_server(default_config(), cert(), other.clone(), now).unwrap();

    let (client_out, _) = run_handshake(&mut client, &mut server, now);
    assert!(client.is_established());
    assert!(!client.is_resumed());
    assert!(!server.is_resumed());
    assert!(client_out.peer_cert.is_some());
    assert_ne!(client.session().unwrap().master_secret(), session.master_secret());
    assert_eq!(other.len(), 1);
}

#[test]
fn disabled_cache_stores_nothing() {
    let now = Instant::now();
    let sessions = Arc::new(SessionCache::new(0));
    let mut client = Dtls::new_client(default_config(), cert(), now).unwrap();
    let mut server = Dtls::new_server(default_config(), cert(), sessions.clone(), now).unwrap();

    run_handshake(&mut client, &mut server, now);
    assert!(server.is_established());
    assert!(sessions.is_empty());
    assert!(!client.session().unwrap().is_resumable());
}
