//! Shared helpers for the integration tests.

#![allow(unused)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use cdtls::certificate::{generate_self_signed_certificate, DtlsCertificate};
use cdtls::{Config, Dtls, Output, SessionCache};

/// Parsed DTLS 1.2 record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecHdr {
    pub ctype: u8,
    pub epoch: u16,
    pub seq: u64,
}

/// Content types.
pub const CHANGE_CIPHER_SPEC: u8 = 20;
pub const ALERT: u8 = 21;
pub const HANDSHAKE: u8 = 22;
pub const APPLICATION_DATA: u8 = 23;

/// Handshake message types (RFC 5246 / 6347).
pub const CLIENT_HELLO: u8 = 1;
pub const SERVER_HELLO: u8 = 2;
pub const HELLO_VERIFY_REQUEST: u8 = 3;
pub const CERTIFICATE: u8 = 11;
pub const SERVER_KEY_EXCHANGE: u8 = 12;
pub const CERTIFICATE_REQUEST: u8 = 13;
pub const SERVER_HELLO_DONE: u8 = 14;
pub const CERTIFICATE_VERIFY: u8 = 15;
pub const CLIENT_KEY_EXCHANGE: u8 = 16;

pub fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Parse DTLS 1.2 record headers from a datagram.
pub fn parse_records(datagram: &[u8]) -> Vec<RecHdr> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 13 <= datagram.len() {
        let ctype = datagram[i];
        let epoch = u16::from_be_bytes([datagram[i + 3], datagram[i + 4]]);
        let seq_bytes = [
            0u8,
            0u8,
            datagram[i + 5],
            datagram[i + 6],
            datagram[i + 7],
            datagram[i + 8],
            datagram[i + 9],
            datagram[i + 10],
        ];
        let seq = u64::from_be_bytes(seq_bytes);
        let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;
        out.push(RecHdr { ctype, epoch, seq });
        i += 13 + len;
    }
    out
}

/// Collect record headers from a slice of datagrams.
pub fn collect_headers(datagrams: &[Vec<u8>]) -> Vec<RecHdr> {
    datagrams.iter().flat_map(|d| parse_records(d)).collect()
}

/// Handshake message types of the plaintext (epoch 0) handshake records
/// in a datagram. Each fragment counts.
pub fn parse_handshake_types(datagram: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 13 <= datagram.len() {
        let ctype = datagram[i];
        let epoch = u16::from_be_bytes([datagram[i + 3], datagram[i + 4]]);
        let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;

        if ctype == HANDSHAKE && epoch == 0 && i + 13 < datagram.len() {
            out.push(datagram[i + 13]);
        }
        i += 13 + len;
    }
    out
}

/// Handshake types over a whole flight, fragments of the same message folded.
pub fn flight_types(datagrams: &[Vec<u8>]) -> Vec<u8> {
    let mut types: Vec<u8> = datagrams.iter().flat_map(|p| parse_handshake_types(p)).collect();
    types.dedup();
    types
}

/// Assert that retransmitted records have the same epochs but increased sequence numbers.
pub fn assert_epochs_and_seq_increased(init: &[RecHdr], resend: &[RecHdr]) {
    assert_eq!(
        init.len(),
        resend.len(),
        "record count must match between initial and resend"
    );
    for (a, b) in init.iter().zip(resend.iter()) {
        assert_eq!(
            a.epoch, b.epoch,
            "epoch must match for the same record on resend"
        );
        assert!(
            b.seq > a.seq,
            "sequence must increase on resend: {:?} -> {:?}",
            a,
            b
        );
    }
}

/// Poll until `Timeout`, collecting only packets.
pub fn collect_packets(endpoint: &mut Dtls) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; 2048];
    loop {
        match endpoint.poll_output(&mut buf) {
            Output::Packet(p) => out.push(p.to_vec()),
            Output::Timeout(_) => break,
            _ => {}
        }
    }
    out
}

/// Collected outputs from polling an endpoint to `Timeout`.
#[derive(Default, Debug)]
pub struct DrainedOutputs {
    pub packets: Vec<Vec<u8>>,
    pub connected: bool,
    pub peer_cert: Option<Vec<u8>>,
    pub app_data: Vec<Vec<u8>>,
    pub timeout: Option<Instant>,
}

impl DrainedOutputs {
    fn merge(&mut self, other: DrainedOutputs) {
        self.packets.extend(other.packets);
        self.connected |= other.connected;
        if other.peer_cert.is_some() {
            self.peer_cert = other.peer_cert;
        }
        self.app_data.extend(other.app_data);
        self.timeout = other.timeout;
    }
}

/// Poll until `Timeout`, collecting everything.
pub fn drain_outputs(endpoint: &mut Dtls) -> DrainedOutputs {
    let mut result = DrainedOutputs::default();
    let mut buf = vec![0u8; 4096];
    loop {
        match endpoint.poll_output(&mut buf) {
            Output::Packet(p) => result.packets.push(p.to_vec()),
            Output::Connected => result.connected = true,
            Output::PeerCert(cert) => result.peer_cert = Some(cert.to_vec()),
            Output::ApplicationData(data) => result.app_data.push(data.to_vec()),
            Output::Timeout(t) => {
                result.timeout = Some(t);
                break;
            }
        }
    }
    result
}

/// Deliver a slice of packets to a destination endpoint.
pub fn deliver_packets(packets: &[Vec<u8>], dest: &mut Dtls, now: Instant) {
    for p in packets {
        // Ignore errors - they may be expected for duplicates/replays
        let _ = dest.handle_packet(p, now);
    }
}

/// Trigger a timeout by advancing time 2 seconds.
pub fn trigger_timeout(ep: &mut Dtls, now: &mut Instant) {
    *now += Duration::from_secs(2);
    ep.handle_timeout(*now).expect("handle_timeout");
}

/// Shuttle packets between client and server until neither has anything to send.
pub fn run_handshake(
    client: &mut Dtls,
    server: &mut Dtls,
    now: Instant,
) -> (DrainedOutputs, DrainedOutputs) {
    let mut client_out = DrainedOutputs::default();
    let mut server_out = DrainedOutputs::default();

    for _ in 0..20 {
        let c = drain_outputs(client);
        let quiet_c = c.packets.is_empty();
        deliver_packets(&c.packets, server, now);
        client_out.merge(c);

        let s = drain_outputs(server);
        let quiet_s = s.packets.is_empty();
        deliver_packets(&s.packets, client, now);
        server_out.merge(s);

        if quiet_c && quiet_s {
            break;
        }
    }

    (client_out, server_out)
}

pub fn cert() -> DtlsCertificate {
    generate_self_signed_certificate().expect("gen cert")
}

pub fn default_config() -> Arc<Config> {
    Arc::new(Config::default())
}

/// Config with the cookie exchange turned off.
pub fn no_cookie_config() -> Arc<Config> {
    Arc::new(
        Config::builder()
            .cookie_exchange(false)
            .build()
            .expect("Failed to build config"),
    )
}

/// Config with custom MTU.
pub fn config_with_mtu(mtu: usize) -> Arc<Config> {
    Arc::new(
        Config::builder()
            .mtu(mtu)
            .build()
            .expect("Failed to build config"),
    )
}

pub fn new_pair(
    client_config: Arc<Config>,
    server_config: Arc<Config>,
    now: Instant,
) -> (Dtls, Dtls, Arc<SessionCache>) {
    let sessions = Arc::new(SessionCache::new(server_config.session_cache_size()));
    let client = Dtls::new_client(client_config, cert(), now).expect("client");
    let server = Dtls::new_server(server_config, cert(), sessions.clone(), now).expect("server");
    (client, server, sessions)
}
