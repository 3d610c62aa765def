//! Flight timers, lost flights and the handshake timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cdtls::{Config, Error, HandshakeState};

use crate::common::*;

#[test]
fn client_hello_is_resent_on_timeout() {
    init_log();
    let mut now = Instant::now();
    let (mut client, _server, _) = new_pair(default_config(), default_config(), now);

    let f1 = collect_packets(&mut client);
    assert_eq!(flight_types(&f1), vec![CLIENT_HELLO]);

    // Nothing before the timer fires.
    client.handle_timeout(now + Duration::from_millis(500)).unwrap();
    assert!(collect_packets(&mut client).is_empty());

    trigger_timeout(&mut client, &mut now);
    let resent = collect_packets(&mut client);
    assert_eq!(flight_types(&resent), vec![CLIENT_HELLO]);

    assert_epochs_and_seq_increased(&collect_headers(&f1), &collect_headers(&resent));
    assert_eq!(client.stats().resends, 1);
}

#[test]
fn poll_timeout_reports_flight_deadline() {
    let now = Instant::now();
    let (client, _server, _) = new_pair(default_config(), default_config(), now);

    let at = client.poll_timeout();
    assert!(at > now);
    // Start RTO is one second with jitter.
    assert!(at < now + Duration::from_millis(1300));
}

#[test]
fn retries_exhausted_fails_the_connection() {
    let mut now = Instant::now();

    let config = Arc::new(
        Config::builder()
            .flight_retries(2)
            .flight_max_rto(Duration::from_secs(2))
            .handshake_timeout(Duration::from_secs(600))
            .build()
            .unwrap(),
    );
    let (mut client, _server, _) = new_pair(config, default_config(), now);
    collect_packets(&mut client);

    for _ in 0..2 {
        now += Duration::from_secs(10);
        client.handle_timeout(now).unwrap();
        assert_eq!(flight_types(&collect_packets(&mut client)), vec![CLIENT_HELLO]);
    }

    now += Duration::from_secs(10);
    assert_eq!(client.handle_timeout(now), Err(Error::RetryExhausted));
    assert_eq!(client.state(), HandshakeState::Failed);

    // No peer key material yet, the alert goes out in plaintext.
    let out = collect_packets(&mut client);
    assert_eq!(collect_headers(&out)[0].ctype, ALERT);

    // Terminal: further timeouts are no-ops.
    now += Duration::from_secs(10);
    assert_eq!(client.handle_timeout(now), Ok(()));
    assert!(collect_packets(&mut client).is_empty());
}

#[test]
fn handshake_timeout_fails_the_connection() {
    let mut now = Instant::now();
    let (mut client, _server, _) = new_pair(default_config(), default_config(), now);
    collect_packets(&mut client);

    now += Duration::from_secs(41);
    let err = client.handle_timeout(now).unwrap_err();
    assert!(matches!(err, Error::Timeout(_)));
    assert_eq!(client.state(), HandshakeState::Failed);
}

#[test]
fn lost_server_flight_is_recovered() {
    init_log();
    let mut now = Instant::now();
    let (mut client, mut server, _) = new_pair(default_config(), default_config(), now);

    // Flights 1 to 3.
    let f1 = collect_packets(&mut client);
    deliver_packets(&f1, &mut server, now);
    let f2 = collect_packets(&mut server);
    deliver_packets(&f2, &mut client, now);
    let f3 = collect_packets(&mut client);
    deliver_packets(&f3, &mut server, now);

    // Flight 4 is lost.
    let lost = collect_packets(&mut server);
    assert!(flight_types(&lost).contains(&SERVER_HELLO_DONE));

    // The client resends flight 3, which makes the server resend flight 4.
    trigger_timeout(&mut client, &mut now);
    let f3_again = collect_packets(&mut client);
    assert_eq!(flight_types(&f3_again), vec![CLIENT_HELLO]);
    deliver_packets(&f3_again, &mut server, now);

    let f4 = collect_packets(&mut server);
    assert_eq!(flight_types(&f4), flight_types(&lost));
    assert_epochs_and_seq_increased(&collect_headers(&lost), &collect_headers(&f4));
    deliver_packets(&f4, &mut client, now);

    run_handshake(&mut client, &mut server, now);
    assert!(client.is_established());
    assert!(server.is_established());
    assert_eq!(
        client.session().unwrap().master_secret(),
        server.session().unwrap().master_secret()
    );
}

#[test]
fn lost_final_flight_is_recovered() {
    let mut now = Instant::now();
    let (mut client, mut server, _) = new_pair(no_cookie_config(), no_cookie_config(), now);

    let f1 = collect_packets(&mut client);
    deliver_packets(&f1, &mut server, now);
    let f4 = collect_packets(&mut server);
    deliver_packets(&f4, &mut client, now);
    let f5 = collect_packets(&mut client);
    deliver_packets(&f5, &mut server, now);

    // Server is done, its flight 6 gets lost.
    assert!(drain_outputs(&mut server).connected);
    assert!(server.is_established());
    assert_eq!(client.state(), HandshakeState::AwaitingFinished);

    trigger_timeout(&mut client, &mut now);
    let f5_again = collect_packets(&mut client);
    assert!(!f5_again.is_empty());
    deliver_packets(&f5_again, &mut server, now);

    let f6 = collect_packets(&mut server);
    assert!(!f6.is_empty());
    deliver_packets(&f6, &mut client, now);

    assert!(drain_outputs(&mut client).connected);
    assert!(client.is_established());
    assert!(server.stats().resends >= 1);
}

#[test]
fn reordered_flight_is_reassembled() {
    let now = Instant::now();
    let config = config_with_mtu(300);
    let (mut client, mut server, _) = new_pair(config.clone(), config, now);

    let f1 = collect_packets(&mut client);
    deliver_packets(&f1, &mut server, now);
    let f2 = collect_packets(&mut server);
    deliver_packets(&f2, &mut client, now);
    let f3 = collect_packets(&mut client);
    deliver_packets(&f3, &mut server, now);

    let mut f4 = collect_packets(&mut server);
    assert!(f4.len() > 1);
    f4.reverse();
    deliver_packets(&f4, &mut client, now);

    run_handshake(&mut client, &mut server, now);
    assert!(client.is_established());
    assert!(server.is_established());
}

#[test]
fn finished_before_change_cipher_spec_is_held() {
    let now = Instant::now();
    let (mut client, mut server, _) = new_pair(no_cookie_config(), no_cookie_config(), now);

    let f1 = collect_packets(&mut client);
    deliver_packets(&f1, &mut server, now);
    let f4 = collect_packets(&mut server);
    deliver_packets(&f4, &mut client, now);
    let f5 = collect_packets(&mut client);
    deliver_packets(&f5, &mut server, now);

    // Split flight 6 into single records and deliver them backwards.
    let f6 = collect_packets(&mut server);
    let mut records: Vec<Vec<u8>> = Vec::new();
    for datagram in &f6 {
        let mut i = 0;
        while i + 13 <= datagram.len() {
            let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;
            records.push(datagram[i..i + 13 + len].to_vec());
            i += 13 + len;
        }
    }
    assert_eq!(records.len(), 2);
    records.reverse();
    deliver_packets(&records, &mut client, now);

    assert!(drain_outputs(&mut client).connected);
    assert!(client.is_established());
}

#[test]
fn late_duplicate_reply_resends_without_advancing() {
    let mut now = Instant::now();
    let (mut client, mut server, _) = new_pair(default_config(), default_config(), now);

    let f1 = collect_packets(&mut client);
    trigger_timeout(&mut client, &mut now);
    let f1_again = collect_packets(&mut client);

    // The server answers both copies.
    deliver_packets(&f1, &mut server, now);
    let hvr = collect_packets(&mut server);
    deliver_packets(&f1_again, &mut server, now);
    let hvr_again = collect_packets(&mut server);
    assert_eq!(flight_types(&hvr_again), vec![HELLO_VERIFY_REQUEST]);

    deliver_packets(&hvr, &mut client, now);
    let f3 = collect_packets(&mut client);
    assert_eq!(flight_types(&f3), vec![CLIENT_HELLO]);
    let resends = client.stats().resends;

    // The second reply only brings back flight 3 as it was.
    deliver_packets(&hvr_again, &mut client, now);
    let dup = collect_packets(&mut client);
    assert_epochs_and_seq_increased(&collect_headers(&f3), &collect_headers(&dup));
    assert_eq!(dup[0][13..], f3[0][13..]);
    assert_eq!(client.stats().resends, resends + 1);

    deliver_packets(&f3, &mut server, now);
    run_handshake(&mut client, &mut server, now);
    assert!(client.is_established());
    assert!(server.is_established());
}
