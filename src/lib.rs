//! Sans-IO DTLS 1.2 for constrained devices.
//!
//! A [`Dtls`] instance is one side of one connection. It never touches a
//! socket or a clock: datagrams go in through [`Dtls::handle_packet`], time
//! through [`Dtls::handle_timeout`], and everything the connection wants to
//! do comes out of [`Dtls::poll_output`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use std::time::Instant;
//! # use cdtls::{Config, Dtls, Output};
//! # use cdtls::certificate::generate_self_signed_certificate;
//! # fn send(_: &[u8]) {}
//! let config = Arc::new(Config::default());
//! let cert = generate_self_signed_certificate().unwrap();
//! let mut client = Dtls::new_client(config, cert, Instant::now()).unwrap();
//!
//! let mut buf = vec![0; 2048];
//! loop {
//!     match client.poll_output(&mut buf) {
//!         Output::Packet(p) => send(p),
//!         Output::Timeout(_) => break,
//!         _ => {}
//!     }
//! }
//! ```
//!
//! Only the ECDHE-ECDSA AES-GCM cipher suites are implemented, on the
//! curves listed in [`curve`].
//!
//! For applications that would rather hand over a socket-like transport,
//! [`Endpoint`] multiplexes connections by peer address.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

#[macro_use]
extern crate log;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

mod buffer;
pub mod certificate;
pub mod codec;
mod config;
pub mod crypto;
pub mod curve;
mod engine;
mod error;
mod event;
mod flight;
pub mod message;
mod queue;
mod reassembly;
mod record;
mod rng;
mod session;
mod state;
mod timer;
pub mod window;

mod client;
mod server;

mod connection;
mod endpoint;

use client::Client;
use server::Server;

pub use certificate::DtlsCertificate;
pub use config::{Config, ConfigBuilder};
pub use connection::Connection;
pub use endpoint::{CloseReason, Endpoint, Event, Transport};
pub use engine::Stats;
pub use error::Error;
pub use session::{Session, SessionCache};
pub use state::HandshakeState;

use engine::Engine;
use message::Alert;

/// Output from polling a [`Dtls`].
pub enum Output<'a> {
    /// A datagram to send to the peer.
    Packet(&'a [u8]),
    /// Nothing more to do until this instant, or until a packet arrives.
    Timeout(Instant),
    /// The handshake completed.
    Connected,
    /// The peer's leaf certificate in DER.
    PeerCert(&'a [u8]),
    /// Decrypted application data.
    ApplicationData(&'a [u8]),
}

impl fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Packet(p) => write!(f, "Packet({})", p.len()),
            Output::Timeout(t) => write!(f, "Timeout({:?})", t),
            Output::Connected => write!(f, "Connected"),
            Output::PeerCert(c) => write!(f, "PeerCert({})", c.len()),
            Output::ApplicationData(d) => write!(f, "ApplicationData({})", d.len()),
        }
    }
}

/// One side of a DTLS 1.2 connection.
pub struct Dtls {
    inner: Inner,
    /// Set when the connection failed or was closed. Overrides the handshake state.
    terminal: Option<HandshakeState>,
    last_now: Instant,
}

enum Inner {
    Client(Box<Client>),
    Server(Box<Server>),
}

impl Dtls {
    /// Start a client handshake. The ClientHello is queued right away.
    pub fn new_client(
        config: Arc<Config>,
        certificate: DtlsCertificate,
        now: Instant,
    ) -> Result<Dtls, Error> {
        Self::client(config, certificate, None, now)
    }

    /// Start a client handshake offering `session` for resumption.
    ///
    /// Falls back to a full handshake if the server no longer knows the session.
    pub fn new_client_resuming(
        config: Arc<Config>,
        certificate: DtlsCertificate,
        session: Session,
        now: Instant,
    ) -> Result<Dtls, Error> {
        Self::client(config, certificate, Some(session), now)
    }

    fn client(
        config: Arc<Config>,
        certificate: DtlsCertificate,
        session: Option<Session>,
        now: Instant,
    ) -> Result<Dtls, Error> {
        let client = Client::new(config, certificate, session)?;
        let mut dtls = Dtls {
            inner: Inner::Client(Box::new(client)),
            terminal: None,
            last_now: now,
        };
        dtls.handle_timeout(now)?;
        Ok(dtls)
    }

    /// Accept a handshake. Completed sessions go into `sessions`, and
    /// ClientHellos naming a session found there are resumed.
    pub fn new_server(
        config: Arc<Config>,
        certificate: DtlsCertificate,
        sessions: Arc<SessionCache>,
        now: Instant,
    ) -> Result<Dtls, Error> {
        let server = Server::new(config, certificate, sessions)?;
        Ok(Dtls {
            inner: Inner::Server(Box::new(server)),
            terminal: None,
            last_now: now,
        })
    }

    pub fn is_client(&self) -> bool {
        matches!(self.inner, Inner::Client(_))
    }

    /// Process one received datagram.
    ///
    /// Errors that end the connection also move it to
    /// [`HandshakeState::Failed`] (or [`HandshakeState::Closed`] for a
    /// received close_notify). Other errors leave it untouched.
    pub fn handle_packet(&mut self, packet: &[u8], now: Instant) -> Result<(), Error> {
        self.last_now = now;

        if let Some(state) = self.terminal {
            trace!("Ignore {} byte packet in state {}", packet.len(), state);
            return Ok(());
        }

        let result = match &mut self.inner {
            Inner::Client(c) => c.handle_packet(packet),
            Inner::Server(s) => s.handle_packet(packet),
        };
        self.engine_mut().arm_timers(now);

        self.check(result)
    }

    /// Drive retransmission and the handshake timeout.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        self.last_now = now;

        if self.terminal.is_some() {
            return Ok(());
        }

        let result = match &mut self.inner {
            Inner::Client(c) => c.handle_timeout(now),
            Inner::Server(s) => s.handle_timeout(now),
        };

        self.check(result)
    }

    /// Next pending output. Poll until [`Output::Timeout`].
    pub fn poll_output<'a>(&mut self, buf: &'a mut [u8]) -> Output<'a> {
        let now = self.last_now;
        self.engine_mut().poll_output(buf, now)
    }

    /// When [`Dtls::handle_timeout`] needs to be called next.
    pub fn poll_timeout(&self) -> Instant {
        self.engine().poll_timeout(self.last_now)
    }

    /// Queue application data as one record.
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.terminal.is_some() {
            return Err(Error::ConnectionClosed);
        }
        self.engine_mut().send_application_data(data)
    }

    /// Send close_notify and stop. Further packets are ignored.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.terminal.is_some() {
            return Ok(());
        }
        debug!("Close connection");
        self.engine_mut().shutdown(Some(Alert::close_notify()));
        self.terminal = Some(HandshakeState::Closed);
        Ok(())
    }

    pub fn state(&self) -> HandshakeState {
        if let Some(state) = self.terminal {
            return state;
        }
        match &self.inner {
            Inner::Client(c) => c.state(),
            Inner::Server(s) => s.state(),
        }
    }

    pub fn is_established(&self) -> bool {
        self.state() == HandshakeState::Established
    }

    /// Whether the handshake was an abbreviated one.
    pub fn is_resumed(&self) -> bool {
        match &self.inner {
            Inner::Client(c) => c.is_resumed(),
            Inner::Server(s) => s.is_resumed(),
        }
    }

    /// The session negotiated by a completed handshake.
    pub fn session(&self) -> Option<&Session> {
        match &self.inner {
            Inner::Client(c) => c.session(),
            Inner::Server(s) => s.session(),
        }
    }

    pub fn stats(&self) -> Stats {
        self.engine().stats()
    }

    /// Largest payload [`Dtls::send_application_data`] fits in one datagram.
    pub fn max_application_data(&self) -> usize {
        self.engine().max_application_data()
    }

    fn engine(&self) -> &Engine {
        match &self.inner {
            Inner::Client(c) => c.engine(),
            Inner::Server(s) => s.engine(),
        }
    }

    fn engine_mut(&mut self) -> &mut Engine {
        match &mut self.inner {
            Inner::Client(c) => c.engine_mut(),
            Inner::Server(s) => s.engine_mut(),
        }
    }

    fn check(&mut self, result: Result<(), Error>) -> Result<(), Error> {
        let Err(e) = result else {
            return Ok(());
        };

        match &e {
            Error::AlertReceived(alert) if alert.is_close_notify() => {
                debug!("Peer closed the connection");
                self.engine_mut().shutdown(None);
                self.terminal = Some(HandshakeState::Closed);
            }
            e if e.is_fatal() => {
                warn!("Connection failed: {}", e);
                self.engine_mut().shutdown(e.alert());
                self.terminal = Some(HandshakeState::Failed);
            }
            e => {
                debug!("Ignored: {}", e);
            }
        }

        Err(e)
    }
}

impl fmt::Debug for Dtls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dtls")
            .field("client", &self.is_client())
            .field("state", &self.state())
            .finish()
    }
}
