//! DTLS 1.2 client handshake.
//!
//! ```text
//!   Client                                Server
//!
//!   ClientHello            -------->                     Flight 1
//!                          <--------   HelloVerifyRequest  Flight 2
//!   ClientHello            -------->                     Flight 3
//!                                             ServerHello
//!                                             Certificate
//!                                       ServerKeyExchange
//!                                     CertificateRequest*
//!                          <--------      ServerHelloDone  Flight 4
//!   Certificate*
//!   ClientKeyExchange
//!   CertificateVerify*
//!   [ChangeCipherSpec]
//!   Finished               -------->                     Flight 5
//!                                      [ChangeCipherSpec]
//!                          <--------             Finished  Flight 6
//! ```
//!
//! Offering a cached session turns flight 4 into ServerHello,
//! ChangeCipherSpec and Finished, answered by our ChangeCipherSpec and
//! Finished.

use std::sync::Arc;
use std::time::Instant;

use zeroize::Zeroizing;

use crate::buffer::Buf;
use crate::certificate::DtlsCertificate;
use crate::crypto::{verify_chain, EphemeralKeyPair, SigningKey, VerifyingKey};
use crate::engine::Engine;
use crate::event::LocalEvent;
use crate::message::{
    Body, Certificate, CertificateRequest, CertificateVerify, ClientHello, ClientKeyExchange,
    CompressionMethod, Cookie, Finished, MessageType, ProtocolVersion, Random, SessionId,
    TrustState,
};
use crate::session::Session;
use crate::state::HandshakeState;
use crate::{Config, Error};

pub(crate) struct Client {
    state: State,
    engine: Engine,

    signing_key: SigningKey,
    certificate: Vec<u8>,

    random: Random,
    server_random: Option<Random>,

    /// Session offered in the ClientHello.
    offered_session: Option<Session>,
    /// Session id assigned by the server.
    session_id: SessionId,
    resumed: bool,

    server_key: Option<VerifyingKey>,
    key_pair: Option<EphemeralKeyPair>,
    pre_master_secret: Option<Zeroizing<Vec<u8>>>,
    certificate_request: Option<CertificateRequest>,

    /// Set once the handshake completed.
    session: Option<Session>,
}

impl Client {
    pub fn new(
        config: Arc<Config>,
        certificate: DtlsCertificate,
        session: Option<Session>,
    ) -> Result<Client, Error> {
        let signing_key = SigningKey::from_pkcs8_der(&certificate.private_key)?;

        let offered_session = session.filter(|s| {
            s.is_resumable() && config.cipher_suites().contains(&s.cipher_suite())
        });

        Ok(Client {
            state: State::SendClientHello,
            engine: Engine::new(config, true),
            signing_key,
            certificate: certificate.certificate,
            random: Random::new(),
            server_random: None,
            offered_session,
            session_id: SessionId::empty(),
            resumed: false,
            server_key: None,
            key_pair: None,
            pre_master_secret: None,
            certificate_request: None,
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
        self.resumed
    }

    pub fn handle_packet(&mut self, packet: &[u8]) -> Result<(), Error> {
        self.engine.handle_packet(packet)?;
        self.make_progress()
    }

    /// The first call sends the ClientHello.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        if self.state == State::SendClientHello {
            self.make_progress()?;
        }
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

    fn client_hello(&self, cookie: Cookie) -> ClientHello {
        let session_id = self
            .offered_session
            .as_ref()
            .map(|s| *s.id())
            .unwrap_or_else(SessionId::empty);

        let config = self.engine.config();
        ClientHello::new(
            self.random,
            session_id,
            cookie,
            config.cipher_suites(),
            config.named_curves(),
        )
    }

    fn server_random(&self) -> Result<Random, Error> {
        self.server_random.ok_or_else(|| {
            Error::UnexpectedMessageForState("No ServerHello received".into())
        })
    }

    fn establish(&mut self) -> Result<(), Error> {
        let (Some(suite), Some(master_secret)) =
            (self.engine.cipher_suite(), self.engine.master_secret())
        else {
            return Err(Error::UnexpectedMessageForState(
                "Handshake complete without keys".into(),
            ));
        };

        self.session = Some(Session::new(self.session_id, suite, master_secret));
        self.engine.release_application_data();

        debug!(
            "Client handshake complete{}",
            if self.resumed { " (resumed)" } else { "" }
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SendClientHello,
    AwaitServerHello,
    AwaitCertificate,
    AwaitServerKeyExchange,
    AwaitCertificateRequest,
    AwaitServerHelloDone,
    SendClientFlight,
    AwaitFinished,
    SendFinished,
    Established,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::SendClientHello => "SendClientHello",
            State::AwaitServerHello => "AwaitServerHello",
            State::AwaitCertificate => "AwaitCertificate",
            State::AwaitServerKeyExchange => "AwaitServerKeyExchange",
            State::AwaitCertificateRequest => "AwaitCertificateRequest",
            State::AwaitServerHelloDone => "AwaitServerHelloDone",
            State::SendClientFlight => "SendClientFlight",
            State::AwaitFinished => "AwaitFinished",
            State::SendFinished => "SendFinished",
            State::Established => "Established",
        }
    }

    fn public(&self) -> HandshakeState {
        match self {
            State::SendClientHello => HandshakeState::Idle,
            State::AwaitServerHello => HandshakeState::AwaitingPeerHello,
            State::AwaitCertificate
            | State::AwaitServerKeyExchange
            | State::AwaitCertificateRequest
            | State::AwaitServerHelloDone
            | State::SendClientFlight => HandshakeState::KeyExchangeInFlight,
            State::AwaitFinished | State::SendFinished => HandshakeState::AwaitingFinished,
            State::Established => HandshakeState::Established,
        }
    }

    fn make_progress(self, client: &mut Client) -> Result<Self, Error> {
        match self {
            State::SendClientHello => self.send_client_hello(client),
            State::AwaitServerHello => self.await_server_hello(client),
            State::AwaitCertificate => self.await_certificate(client),
            State::AwaitServerKeyExchange => self.await_server_key_exchange(client),
            State::AwaitCertificateRequest => self.await_certificate_request(client),
            State::AwaitServerHelloDone => self.await_server_hello_done(client),
            State::SendClientFlight => self.send_client_flight(client),
            State::AwaitFinished => self.await_finished(client),
            State::SendFinished => self.send_finished(client),
            State::Established => Ok(self),
        }
    }

    fn send_client_hello(self, client: &mut Client) -> Result<Self, Error> {
        client.engine.flight_begin(1);

        if let Some(session) = &client.offered_session {
            debug!("Offering session {:?}", session.id());
        }

        let hello = client.client_hello(Cookie::empty());
        client.engine.create_handshake(&Body::ClientHello(hello))?;

        Ok(State::AwaitServerHello)
    }

    fn await_server_hello(self, client: &mut Client) -> Result<Self, Error> {
        match client.engine.peek_message() {
            None => Ok(self),
            Some(MessageType::HelloVerifyRequest) => self.handle_hello_verify_request(client),
            Some(MessageType::ServerHello) => self.handle_server_hello(client),
            Some(other) => Err(Error::UnexpectedMessageForState(format!(
                "{:?} while awaiting ServerHello",
                other
            ))),
        }
    }

    fn handle_hello_verify_request(self, client: &mut Client) -> Result<Self, Error> {
        let Some(handshake) = client.engine.next_message(MessageType::HelloVerifyRequest)? else {
            return Ok(self);
        };
        let Body::HelloVerifyRequest(hvr) = handshake.body else {
            unreachable!("next_message checks the type");
        };

        debug!("HelloVerifyRequest with {} byte cookie", hvr.cookie.len());

        // The first ClientHello and the HelloVerifyRequest stay out of the transcript.
        client.engine.transcript_reset();

        client.engine.flight_begin(3);
        let hello = client.client_hello(Cookie::empty()).with_cookie(hvr.cookie);
        client.engine.create_handshake(&Body::ClientHello(hello))?;

        Ok(self)
    }

    fn handle_server_hello(self, client: &mut Client) -> Result<Self, Error> {
        let Some(handshake) = client.engine.next_message(MessageType::ServerHello)? else {
            return Ok(self);
        };
        let Body::ServerHello(server_hello) = handshake.body else {
            unreachable!("next_message checks the type");
        };

        if server_hello.server_version != ProtocolVersion::DTLS1_2 {
            return Err(Error::SecurityError(format!(
                "Unsupported DTLS version from server: {:?}",
                server_hello.server_version
            )));
        }

        let suite = server_hello.cipher_suite;
        if !client.engine.config().cipher_suites().contains(&suite) {
            return Err(Error::SecurityError(format!(
                "Server selected cipher suite {:?} that was not offered",
                suite
            )));
        }

        if server_hello.compression_method != CompressionMethod::Null {
            return Err(Error::SecurityError(format!(
                "Server selected compression {:?}",
                server_hello.compression_method
            )));
        }

        debug!("Server selected {:?}", suite);
        client.engine.set_cipher_suite(suite);
        client.server_random = Some(server_hello.random);
        client.session_id = server_hello.session_id;

        if let Some(offered) = &client.offered_session {
            if *offered.id() == server_hello.session_id {
                if offered.cipher_suite() != suite {
                    return Err(Error::SecurityError(
                        "Resumed session with a different cipher suite".into(),
                    ));
                }

                debug!("Server resumes session {:?}", offered.id());
                let master_secret = Zeroizing::new(offered.master_secret().to_vec());
                client
                    .engine
                    .install_keys(master_secret, &client.random, &server_hello.random)?;
                client.resumed = true;

                return Ok(State::AwaitFinished);
            }
        }

        Ok(State::AwaitCertificate)
    }

    fn await_certificate(self, client: &mut Client) -> Result<Self, Error> {
        let Some(handshake) = client.engine.next_message(MessageType::Certificate)? else {
            return Ok(self);
        };
        let Body::Certificate(certificate) = handshake.body else {
            unreachable!("next_message checks the type");
        };

        trace!(
            "Server certificate chain of {} certificates",
            certificate.certificate_list.len()
        );

        let verifier = client.engine.config().cert_verifier().map(|v| v.as_ref());
        let server_key = verify_chain(&certificate.certificate_list, verifier)?;
        client.server_key = Some(server_key);

        if let Some(leaf) = certificate.leaf() {
            client
                .engine
                .push_event(LocalEvent::PeerCert(Buf::from_slice(leaf)));
        }

        Ok(State::AwaitServerKeyExchange)
    }

    fn await_server_key_exchange(self, client: &mut Client) -> Result<Self, Error> {
        let Some(handshake) = client.engine.next_message(MessageType::ServerKeyExchange)? else {
            return Ok(self);
        };
        let Body::ServerKeyExchange(mut ske) = handshake.body else {
            unreachable!("next_message checks the type");
        };

        let curve_id = ske.curve_id();
        if !client.engine.config().named_curves().contains(&curve_id) {
            return Err(Error::UnsupportedCurve(format!(
                "Server chose curve {} that was not offered",
                curve_id
            )));
        }

        let server_random = client.server_random()?;
        let Some(server_key) = &client.server_key else {
            return Err(Error::UnexpectedMessageForState(
                "ServerKeyExchange before Certificate".into(),
            ));
        };

        match ske.verify_signature(server_key, &client.random, &server_random)? {
            TrustState::Authenticated => {
                trace!("ServerKeyExchange signature verified");
            }
            TrustState::Anonymous if client.engine.config().allow_anonymous_key_exchange() => {
                warn!("Accepting unsigned ServerKeyExchange");
            }
            TrustState::Anonymous => {
                return Err(Error::SecurityError(
                    "Unsigned ServerKeyExchange refused".into(),
                ));
            }
        }

        let key_pair = EphemeralKeyPair::generate(curve_id)?;
        let pre_master_secret = key_pair.compute_shared_secret(ske.public_key()?)?;

        client.key_pair = Some(key_pair);
        client.pre_master_secret = Some(pre_master_secret);

        Ok(State::AwaitCertificateRequest)
    }

    fn await_certificate_request(self, client: &mut Client) -> Result<Self, Error> {
        match client.engine.peek_message() {
            None => Ok(self),
            Some(MessageType::ServerHelloDone) => Ok(State::AwaitServerHelloDone),
            Some(MessageType::CertificateRequest) => {
                let Some(handshake) =
                    client.engine.next_message(MessageType::CertificateRequest)?
                else {
                    return Ok(self);
                };
                let Body::CertificateRequest(request) = handshake.body else {
                    unreachable!("next_message checks the type");
                };
                debug!(
                    "Server requests a certificate, accepts {:?}",
                    request.supported_signature_algorithms
                );
                client.certificate_request = Some(request);
                Ok(State::AwaitServerHelloDone)
            }
            Some(other) => Err(Error::UnexpectedMessageForState(format!(
                "{:?} while awaiting ServerHelloDone",
                other
            ))),
        }
    }

    fn await_server_hello_done(self, client: &mut Client) -> Result<Self, Error> {
        if client
            .engine
            .next_message(MessageType::ServerHelloDone)?
            .is_none()
        {
            return Ok(self);
        }

        Ok(State::SendClientFlight)
    }

    fn send_client_flight(self, client: &mut Client) -> Result<Self, Error> {
        client.engine.flight_begin(5);

        let server_random = client.server_random()?;

        // None: no certificate requested. Some(false): requested, but not
        // with an algorithm our key can produce.
        let send_certificate = client
            .certificate_request
            .as_ref()
            .map(|request| request.supports(client.signing_key.algorithm()));

        match send_certificate {
            Some(true) => {
                let certificate = Certificate::new(vec![client.certificate.clone()]);
                client
                    .engine
                    .create_handshake(&Body::Certificate(certificate))?;
            }
            Some(false) => {
                warn!("No certificate matches the CertificateRequest, sending none");
                client
                    .engine
                    .create_handshake(&Body::Certificate(Certificate::new(vec![])))?;
            }
            None => {}
        }

        let (Some(key_pair), Some(pre_master_secret)) =
            (client.key_pair.take(), client.pre_master_secret.take())
        else {
            return Err(Error::UnexpectedMessageForState(
                "Client key exchange without server parameters".into(),
            ));
        };

        let key_exchange = ClientKeyExchange::new(key_pair.public_point().to_vec());
        client
            .engine
            .create_handshake(&Body::ClientKeyExchange(key_exchange))?;

        let master_secret =
            client
                .engine
                .derive_master_secret(&pre_master_secret, &client.random, &server_random)?;
        client
            .engine
            .install_keys(master_secret, &client.random, &server_random)?;

        if send_certificate == Some(true) {
            let signature = client.signing_key.sign(client.engine.transcript())?;
            let verify = CertificateVerify::new(client.signing_key.algorithm(), signature);
            client
                .engine
                .create_handshake(&Body::CertificateVerify(verify))?;
        }

        client.engine.send_change_cipher_spec()?;

        let verify_data = client.engine.verify_data(true)?;
        client
            .engine
            .create_handshake(&Body::Finished(Finished::new(verify_data)))?;

        Ok(State::AwaitFinished)
    }

    fn await_finished(self, client: &mut Client) -> Result<Self, Error> {
        if client.engine.peek_message().is_none() {
            return Ok(self);
        }

        // Computed before the server Finished joins the transcript.
        let expected = client.engine.verify_data(false)?;

        let Some(handshake) = client.engine.next_message(MessageType::Finished)? else {
            return Ok(self);
        };
        let Body::Finished(finished) = handshake.body else {
            unreachable!("next_message checks the type");
        };

        if finished.verify_data != expected {
            return Err(Error::FinishedMismatch);
        }
        trace!("Server Finished verified");

        if client.resumed {
            return Ok(State::SendFinished);
        }

        client.establish()?;
        Ok(State::Established)
    }

    fn send_finished(self, client: &mut Client) -> Result<Self, Error> {
        client.engine.flight_begin(5);

        client.engine.send_change_cipher_spec()?;
        let verify_data = client.engine.verify_data(true)?;
        client
            .engine
            .create_handshake(&Body::Finished(Finished::new(verify_data)))?;

        client.establish()?;
        Ok(State::Established)
    }
}
