#![no_main]

//! Record and handshake fragment parsing.
//!
//! DTLS 1.2 record header:
//! - ContentType: 1 byte
//! - ProtocolVersion: 2 bytes (0xFEFD)
//! - Epoch: 2 bytes
//! - Sequence Number: 6 bytes (u48)
//! - Length: 2 bytes

use libfuzzer_sys::fuzz_target;

use cdtls::message::{DTLSRecord, Fragment, RECORD_HEADER_LEN};

const MAX_FRAGMENT_SIZE: usize = 16384;

fuzz_target!(|data: &[u8]| {
    let (records, _) = DTLSRecord::parse_datagram(data);
    for record in &records {
        assert!(record.length() >= RECORD_HEADER_LEN);
        let _ = Fragment::parse_all(&record.fragment);
    }

    // The same bytes as the payload of an epoch 0 handshake record.
    let frag_len = data.len().min(MAX_FRAGMENT_SIZE);
    let mut record = Vec::with_capacity(RECORD_HEADER_LEN + frag_len);
    record.push(22u8);
    record.extend_from_slice(&[0xFE, 0xFD]);
    record.extend_from_slice(&[0, 0]);
    record.extend_from_slice(&[0, 0, 0, 0, 0, 1]);
    record.extend_from_slice(&(frag_len as u16).to_be_bytes());
    record.extend_from_slice(&data[..frag_len]);

    let (records, err) = DTLSRecord::parse_datagram(&record);
    assert!(err.is_none());
    assert_eq!(records.len(), 1);
    let _ = Fragment::parse_all(&records[0].fragment);
});
