//! DTLS 1.2 server handshake.
//!
//! The server answers a ClientHello without a valid cookie with a
//! HelloVerifyRequest and keeps no state for that peer beyond the saved
//! reply. The cookie is an HMAC over the client random, keyed with a
//! per-server secret, so a returning ClientHello can be checked without
//! remembering the first one.
//!
//! A ClientHello naming a session found in the [`SessionCache`] is
//! answered with an abbreviated handshake.

use std::sync::Arc;
use std::time::Instant;

use rand::RngCore;
use zeroize::Zeroizing;

use crate::buffer::Buf;
use crate::certificate::DtlsCertificate;
use crate::crypto::{
    decode_public_key, prf, verify_chain, EphemeralKeyPair, SigningKey, VerifyingKey,
};
use crate::engine::Engine;
use crate::event::LocalEvent;
use crate::message::{
    Body, Certificate, CertificateRequest, CipherSuite, ClientHello, CompressionMethod, Cookie,
    EcdhServerKeyExchange, Finished, HashAlgorithm, HelloVerifyRequest, MessageType,
    ProtocolVersion, Random, ServerHello, SessionId, SignatureAlgorithm,
    SignatureAndHashAlgorithm,
};
use crate::session::{Session, SessionCache};
use crate::state::HandshakeState;
use crate::{Config, Error};

pub(crate) struct Server {
    state: State,
    engine: Engine,

    signing_key: SigningKey,
    certificate: Vec<u8>,

    sessions: Arc<SessionCache>,
    cookie_secret: Zeroizing<[u8; 32]>,

    random: Random,
    client_random: Option<Random>,
    session_id: SessionId,
    curve_id: u16,

    /// Cached session the client asked to resume.
    resumed: Option<Session>,

    key_pair: Option<EphemeralKeyPair>,
    client_key: Option<VerifyingKey>,

    /// Set once the handshake completed.
    session: Option<Session>,
}

impl Server {
    pub fn new(
        config: Arc<Config>,
        certificate: DtlsCertificate,
        sessions: Arc<SessionCache>,
    ) -> Result<Server, Error> {
        let signing_key = SigningKey::from_pkcs8_der(&certificate.private_key)?;

        let mut cookie_secret = Zeroizing::new([0; 32]);
        rand::thread_rng().fill_bytes(&mut cookie_secret[..]);

        Ok(Server {
            state: State::AwaitClientHello,
            engine: Engine::new(config, false),
            signing_key,
            certificate: certificate.certificate,
            sessions,
            cookie_secret,
            random: Random::new(),
            client_random: None,
            session_id: SessionId::empty(),
            curve_id: 0,
            resumed: None,
            key_pair: None,
            client_key: None,
            session: None,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn state(&self) -> HandshakeState {
        self.state.public()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_resumed(&self) -> bool {
        self.resumed.is_some()
    }

    pub fn handle_packet(&mut self, packet: &[u8]) -> Result<(), Error> {
        self.engine.handle_packet(packet)?;
        self.make_progress()
    }

    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        self.engine.handle_timeout(now)
    }

    fn make_progress(&mut self) -> Result<(), Error> {
        loop {
            let prev_state = self.state;

            let new_state = prev_state.make_progress(self)?;
            if prev_state != new_state {
                self.state = new_state;
                trace!("{} -> {}", prev_state.name(), new_state.name());
            } else {
                break;
            }
        }
        Ok(())
    }

    fn cookie_for(&self, client_random: &Random) -> Result<Cookie, Error> {
        let mac = prf::hmac_sha256(&self.cookie_secret[..], &client_random.to_bytes())?;
        Cookie::try_new(&mac)
    }

    fn client_random(&self) -> Result<Random, Error> {
        self.client_random.ok_or_else(|| {
            Error::UnexpectedMessageForState("No ClientHello received".into())
        })
    }

    fn suite(&self) -> Result<CipherSuite, Error> {
        self.engine.cipher_suite().ok_or_else(|| {
            Error::UnexpectedMessageForState("No cipher suite selected".into())
        })
    }

    fn establish(&mut self) -> Result<(), Error> {
        let suite = self.suite()?;
        let Some(master_secret) = self.engine.master_secret() else {
            return Err(Error::UnexpectedMessageForState(
                "Handshake complete without keys".into(),
            ));
        };

        let session = Session::new(self.session_id, suite, master_secret);
        if self.resumed.is_none() && session.is_resumable() {
            self.sessions.insert(session.clone());
        }
        self.session = Some(session);
        self.engine.release_application_data();

        debug!(
            "Server handshake complete{}",
            if self.resumed.is_some() { " (resumed)" } else { "" }
        );
        Ok(())
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// The first configured value the client also offers.
fn select<T: Copy + PartialEq>(ours: &[T], theirs: &[T]) -> Option<T> {
    ours.iter().copied().find(|v| theirs.contains(v))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitClientHello,
    SendServerHelloFlight,
    SendResumeFlight,
    AwaitCertificate,
    AwaitClientKeyExchange,
    AwaitCertificateVerify,
    AwaitFinished,
    Established,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::AwaitClientHello => "AwaitClientHello",
            State::SendServerHelloFlight => "SendServerHelloFlight",
            State::SendResumeFlight => "SendResumeFlight",
            State::AwaitCertificate => "AwaitCertificate",
            State::AwaitClientKeyExchange => "AwaitClientKeyExchange",
            State::AwaitCertificateVerify => "AwaitCertificateVerify",
            State::AwaitFinished => "AwaitFinished",
            State::Established => "Established",
        }
    }

    fn public(&self) -> HandshakeState {
        match self {
            State::AwaitClientHello => HandshakeState::AwaitingPeerHello,
            State::SendServerHelloFlight
            | State::SendResumeFlight
            | State::AwaitCertificate
            | State::AwaitClientKeyExchange => HandshakeState::KeyExchangeInFlight,
            State::AwaitCertificateVerify | State::AwaitFinished => {
                HandshakeState::AwaitingFinished
            }
            State::Established => HandshakeState::Established,
        }
    }

    fn make_progress(self, server: &mut Server) -> Result<Self, Error> {
        match self {
            State::AwaitClientHello => self.await_client_hello(server),
            State::SendServerHelloFlight => self.send_server_hello_flight(server),
            State::SendResumeFlight => self.send_resume_flight(server),
            State::AwaitCertificate => self.await_certificate(server),
            State::AwaitClientKeyExchange => self.await_client_key_exchange(server),
            State::AwaitCertificateVerify => self.await_certificate_verify(server),
            State::AwaitFinished => self.await_finished(server),
            State::Established => Ok(self),
        }
    }

    fn await_client_hello(self, server: &mut Server) -> Result<Self, Error> {
        let Some(handshake) = server.engine.next_message(MessageType::ClientHello)? else {
            return Ok(self);
        };
        let Body::ClientHello(client_hello) = handshake.body else {
            unreachable!("next_message checks the type");
        };

        check_client_hello(&client_hello)?;

        if server.engine.config().cookie_exchange() {
            let expected = server.cookie_for(&client_hello.random)?;

            if !constant_time_eq(&client_hello.cookie, &expected) {
                if !client_hello.cookie.is_empty() {
                    debug!("ClientHello with stale cookie");
                }
                debug!("Send HelloVerifyRequest");

                server.engine.flight_begin(2);
                server
                    .engine
                    .create_handshake(&Body::HelloVerifyRequest(HelloVerifyRequest::new(expected)))?;
                // The client drives retransmission of the cookie exchange.
                server.engine.flight_stop_timer();
                server.engine.transcript_reset();

                return Ok(self);
            }
        }

        server.client_random = Some(client_hello.random);

        if let Some(session) = server.sessions.get(&client_hello.session_id) {
            if client_hello.cipher_suites.contains(&session.cipher_suite()) {
                debug!("Resuming session {:?}", session.id());
                server.engine.set_cipher_suite(session.cipher_suite());
                server.session_id = *session.id();
                server.resumed = Some(session);
                return Ok(State::SendResumeFlight);
            }
            debug!("Client no longer offers the cipher suite of {:?}", session.id());
        }

        let config = server.engine.config();

        let Some(suite) = select(config.cipher_suites(), &client_hello.cipher_suites[..]) else {
            return Err(Error::SecurityError(format!(
                "No cipher suite in common: {:?}",
                client_hello.cipher_suites
            )));
        };

        let offered_curves = client_hello.supported_groups()?;
        let curve_id = if offered_curves.is_empty() {
            config.named_curves().first().copied()
        } else {
            select(config.named_curves(), &offered_curves[..])
        };
        let Some(curve_id) = curve_id else {
            return Err(Error::UnsupportedCurve(format!(
                "No curve in common: {:?}",
                offered_curves
            )));
        };

        debug!("Selected {:?} on curve {}", suite, curve_id);

        server.engine.set_cipher_suite(suite);
        server.curve_id = curve_id;
        server.session_id = if server.sessions.is_enabled() {
            SessionId::random()
        } else {
            SessionId::empty()
        };

        Ok(State::SendServerHelloFlight)
    }

    fn send_server_hello_flight(self, server: &mut Server) -> Result<Self, Error> {
        server.engine.flight_begin(4);

        let client_random = server.client_random()?;
        let suite = server.suite()?;

        let hello = ServerHello::new(server.random, server.session_id, suite);
        server.engine.create_handshake(&Body::ServerHello(hello))?;

        let certificate = Certificate::new(vec![server.certificate.clone()]);
        server
            .engine
            .create_handshake(&Body::Certificate(certificate))?;

        let key_pair = EphemeralKeyPair::generate(server.curve_id)?;
        let ske = EcdhServerKeyExchange::new_signed(
            &key_pair,
            &server.signing_key,
            &client_random,
            &server.random,
        )?;
        server.key_pair = Some(key_pair);
        server
            .engine
            .create_handshake(&Body::ServerKeyExchange(ske))?;

        let next = if server.engine.config().require_client_certificate() {
            let request = CertificateRequest::new(&[
                SignatureAndHashAlgorithm::new(HashAlgorithm::SHA256, SignatureAlgorithm::ECDSA),
                SignatureAndHashAlgorithm::new(HashAlgorithm::SHA384, SignatureAlgorithm::ECDSA),
            ]);
            server
                .engine
                .create_handshake(&Body::CertificateRequest(request))?;
            State::AwaitCertificate
        } else {
            State::AwaitClientKeyExchange
        };

        server.engine.create_handshake(&Body::ServerHelloDone)?;

        Ok(next)
    }

    fn send_resume_flight(self, server: &mut Server) -> Result<Self, Error> {
        server.engine.flight_begin(4);

        let client_random = server.client_random()?;
        let suite = server.suite()?;

        let hello = ServerHello::new(server.random, server.session_id, suite);
        server.engine.create_handshake(&Body::ServerHello(hello))?;

        let Some(session) = &server.resumed else {
            return Err(Error::UnexpectedMessageForState(
                "Resume without a session".into(),
            ));
        };
        let master_secret = Zeroizing::new(session.master_secret().to_vec());
        server
            .engine
            .install_keys(master_secret, &client_random, &server.random)?;

        server.engine.send_change_cipher_spec()?;
        let verify_data = server.engine.verify_data(false)?;
        server
            .engine
            .create_handshake(&Body::Finished(Finished::new(verify_data)))?;

        Ok(State::AwaitFinished)
    }

    fn await_certificate(self, server: &mut Server) -> Result<Self, Error> {
        let Some(handshake) = server.engine.next_message(MessageType::Certificate)? else {
            return Ok(self);
        };
        let Body::Certificate(certificate) = handshake.body else {
            unreachable!("next_message checks the type");
        };

        if certificate.certificate_list.is_empty() {
            return Err(Error::CertificateError(
                "Client certificate required".into(),
            ));
        }

        let verifier = server.engine.config().cert_verifier().map(|v| v.as_ref());
        let client_key = verify_chain(&certificate.certificate_list, verifier)?;
        server.client_key = Some(client_key);

        if let Some(leaf) = certificate.leaf() {
            server
                .engine
                .push_event(LocalEvent::PeerCert(Buf::from_slice(leaf)));
        }

        Ok(State::AwaitClientKeyExchange)
    }

    fn await_client_key_exchange(self, server: &mut Server) -> Result<Self, Error> {
        let Some(handshake) = server.engine.next_message(MessageType::ClientKeyExchange)? else {
            return Ok(self);
        };
        let Body::ClientKeyExchange(key_exchange) = handshake.body else {
            unreachable!("next_message checks the type");
        };

        let client_random = server.client_random()?;
        let Some(key_pair) = server.key_pair.take() else {
            return Err(Error::UnexpectedMessageForState(
                "ClientKeyExchange before ServerKeyExchange".into(),
            ));
        };

        let client_public = decode_public_key(key_pair.curve_id(), &key_exchange.public_point)?;
        let pre_master_secret = key_pair.compute_shared_secret(&client_public)?;

        let master_secret =
            server
                .engine
                .derive_master_secret(&pre_master_secret, &client_random, &server.random)?;
        server
            .engine
            .install_keys(master_secret, &client_random, &server.random)?;

        if server.client_key.is_some() {
            Ok(State::AwaitCertificateVerify)
        } else {
            Ok(State::AwaitFinished)
        }
    }

    fn await_certificate_verify(self, server: &mut Server) -> Result<Self, Error> {
        if server.engine.peek_message().is_none() {
            return Ok(self);
        }

        // The signature covers the transcript up to, not including, CertificateVerify.
        let signed = server.engine.transcript().to_vec();

        let Some(handshake) = server.engine.next_message(MessageType::CertificateVerify)? else {
            return Ok(self);
        };
        let Body::CertificateVerify(verify) = handshake.body else {
            unreachable!("next_message checks the type");
        };

        let Some(client_key) = &server.client_key else {
            return Err(Error::UnexpectedMessageForState(
                "CertificateVerify without certificate".into(),
            ));
        };

        if verify.algorithm != client_key.algorithm() {
            return Err(Error::SecurityError(format!(
                "CertificateVerify uses {:?}, certificate key is {:?}",
                verify.algorithm,
                client_key.algorithm()
            )));
        }

        client_key
            .verify(&signed, &verify.signature)
            .map_err(|_| Error::SignatureVerificationFailed)?;
        trace!("Client CertificateVerify verified");

        Ok(State::AwaitFinished)
    }

    fn await_finished(self, server: &mut Server) -> Result<Self, Error> {
        if server.engine.peek_message().is_none() {
            return Ok(self);
        }

        // Computed before the client Finished joins the transcript.
        let expected = server.engine.verify_data(true)?;

        let Some(handshake) = server.engine.next_message(MessageType::Finished)? else {
            return Ok(self);
        };
        let Body::Finished(finished) = handshake.body else {
            unreachable!("next_message checks the type");
        };

        if finished.verify_data != expected {
            return Err(Error::FinishedMismatch);
        }
        trace!("Client Finished verified");

        if server.resumed.is_none() {
            server.engine.flight_begin(6);

            server.engine.send_change_cipher_spec()?;
            let verify_data = server.engine.verify_data(false)?;
            server
                .engine
                .create_handshake(&Body::Finished(Finished::new(verify_data)))?;
        }

        server.establish()?;
        Ok(State::Established)
    }
}

fn check_client_hello(client_hello: &ClientHello) -> Result<(), Error> {
    if client_hello.client_version != ProtocolVersion::DTLS1_2 {
        return Err(Error::SecurityError(format!(
            "Unsupported DTLS version from client: {:?}",
            client_hello.client_version
        )));
    }

    if !client_hello
        .compression_methods
        .contains(&CompressionMethod::Null)
    {
        return Err(Error::SecurityError(
            "Client did not offer null compression".into(),
        ));
    }

    Ok(())
}
