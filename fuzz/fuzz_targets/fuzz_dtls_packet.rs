#![no_main]

//! Arbitrary datagrams fed to a fresh server and to a client waiting for
//! its ServerHello.

use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::time::Instant;

use cdtls::{certificate, Config, Dtls, Output, SessionCache};

fuzz_target!(|data: &[u8]| {
    let cert = match certificate::generate_self_signed_certificate() {
        Ok(c) => c,
        Err(_) => return,
    };

    let config = Arc::new(Config::default());
    let now = Instant::now();
    let mut buf = vec![0u8; 2048];

    {
        let sessions = Arc::new(SessionCache::new(4));
        let Ok(mut dtls) = Dtls::new_server(Arc::clone(&config), cert.clone(), sessions, now)
        else {
            return;
        };
        let _ = dtls.handle_packet(data, now);
        drain(&mut dtls, &mut buf);
    }

    {
        let Ok(mut dtls) = Dtls::new_client(Arc::clone(&config), cert, now) else {
            return;
        };
        // ClientHello
        drain(&mut dtls, &mut buf);

        let _ = dtls.handle_packet(data, now);
        drain(&mut dtls, &mut buf);
    }
});

fn drain(dtls: &mut Dtls, buf: &mut [u8]) {
    for _ in 0..32 {
        if let Output::Timeout(_) = dtls.poll_output(buf) {
            break;
        }
    }
}
