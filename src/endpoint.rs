//! Connections multiplexed by peer address over one datagram transport.
//!
//! The endpoint is still sans-IO on the receive side and for time: the
//! application pushes datagrams in with [`Endpoint::on_datagram_received`]
//! and calls [`Endpoint::handle_timeout`] by [`Endpoint::poll_timeout`].
//! Outgoing datagrams go straight to the [`Transport`].

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::message::ContentType;
use crate::{
    Config, Connection, DtlsCertificate, Error, HandshakeState, Output, Session, SessionCache,
};

/// Fits a decrypted record or a peer certificate.
const OUTPUT_BUF_LEN: usize = 16 * 1024;

/// Where an [`Endpoint`] sends datagrams.
pub trait Transport {
    fn send_datagram(&mut self, peer: SocketAddr, bytes: &[u8]) -> io::Result<()>;
}

/// Why a connection went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// [`Endpoint::close`] was called.
    Local,
    /// The peer sent close_notify.
    Peer,
    /// No datagram from an established peer within the idle timeout.
    IdleTimeout,
    /// Handshake or record failure.
    Failed(Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected(SocketAddr),
    /// DER leaf certificate presented by the peer.
    PeerCertificate(SocketAddr, Vec<u8>),
    ApplicationData(SocketAddr, Vec<u8>),
    Closed(SocketAddr, CloseReason),
}

pub struct Endpoint<T: Transport> {
    config: Arc<Config>,
    certificate: DtlsCertificate,
    transport: T,
    connections: HashMap<SocketAddr, Connection>,
    /// Completed sessions as server.
    sessions: Arc<SessionCache>,
    /// Completed sessions as client, offered again on the next `open`.
    client_sessions: HashMap<SocketAddr, Session>,
    events: VecDeque<Event>,
    buf: Vec<u8>,
}

impl<T: Transport> Endpoint<T> {
    pub fn new(config: Arc<Config>, certificate: DtlsCertificate, transport: T) -> Self {
        let sessions = Arc::new(SessionCache::new(config.session_cache_size()));
        Self::with_session_cache(config, certificate, transport, sessions)
    }

    /// Share a server session cache between endpoints.
    pub fn with_session_cache(
        config: Arc<Config>,
        certificate: DtlsCertificate,
        transport: T,
        sessions: Arc<SessionCache>,
    ) -> Self {
        Endpoint {
            config,
            certificate,
            transport,
            connections: HashMap::new(),
            sessions,
            client_sessions: HashMap::new(),
            events: VecDeque::new(),
            buf: vec![0; OUTPUT_BUF_LEN],
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn session_cache(&self) -> &Arc<SessionCache> {
        &self.sessions
    }

    pub fn connection(&self, peer: SocketAddr) -> Option<&Connection> {
        self.connections.get(&peer)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Start a client handshake with `peer`.
    ///
    /// A session completed earlier with the same peer is offered for resumption.
    pub fn open(&mut self, peer: SocketAddr, now: Instant) -> Result<(), Error> {
        if let Some(conn) = self.connections.get(&peer) {
            debug!("Connection to {} already open in {}", peer, conn.state());
            return Ok(());
        }

        let session = self.client_sessions.get(&peer).cloned();
        let conn = Connection::client(
            peer,
            self.config.clone(),
            self.certificate.clone(),
            session,
            now,
        )?;

        debug!("Open connection to {}", peer);
        self.connections.insert(peer, conn);
        self.flush(peer)
    }

    /// Send application data. Held back until the handshake completes.
    pub fn send_secure(&mut self, peer: SocketAddr, payload: &[u8]) -> Result<(), Error> {
        let Some(conn) = self.connections.get_mut(&peer) else {
            return Err(Error::UnknownPeer(peer));
        };
        conn.send(payload)?;
        self.flush(peer)
    }

    /// Feed a datagram from `peer`. The first datagram from an unknown peer
    /// starts a server handshake.
    pub fn on_datagram_received(
        &mut self,
        peer: SocketAddr,
        bytes: &[u8],
        now: Instant,
    ) -> Result<(), Error> {
        if !self.connections.contains_key(&peer) {
            if bytes.first().copied() != Some(ContentType::Handshake.as_u8()) {
                trace!("Drop non-handshake datagram from unknown peer {}", peer);
                return Err(Error::UnknownPeer(peer));
            }

            let conn = Connection::server(
                peer,
                self.config.clone(),
                self.certificate.clone(),
                self.sessions.clone(),
                now,
            )?;
            debug!("New connection from {}", peer);
            self.connections.insert(peer, conn);
        }

        let result = match self.connections.get_mut(&peer) {
            Some(conn) => {
                conn.touch(now);
                conn.dtls_mut().handle_packet(bytes, now)
            }
            None => return Err(Error::UnknownPeer(peer)),
        };

        let flushed = self.flush(peer);
        self.settle(peer, result).and(flushed)
    }

    /// Send close_notify and forget the connection.
    pub fn close(&mut self, peer: SocketAddr) -> Result<(), Error> {
        let Some(conn) = self.connections.get_mut(&peer) else {
            return Err(Error::UnknownPeer(peer));
        };
        conn.dtls_mut().close()?;

        let flushed = self.flush(peer);
        self.remove(peer, CloseReason::Local);
        flushed
    }

    /// Drive retransmissions, handshake timeouts and idle timeouts.
    ///
    /// Connection failures surface as [`Event::Closed`]. Only transport
    /// errors are returned.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        let idle_timeout = self.config.idle_timeout();
        let peers: Vec<SocketAddr> = self.connections.keys().copied().collect();

        for peer in peers {
            let Some(conn) = self.connections.get_mut(&peer) else {
                continue;
            };

            if conn.idle_deadline(idle_timeout).is_some_and(|at| now >= at) {
                debug!("Connection to {} idle", peer);
                let closed = conn.dtls_mut().close();
                let flushed = self.flush(peer);
                self.remove(peer, CloseReason::IdleTimeout);
                closed.and(flushed)?;
                continue;
            }

            if now < conn.dtls().poll_timeout() {
                continue;
            }

            let result = conn.dtls_mut().handle_timeout(now);
            let flushed = self.flush(peer);
            if let Err(e) = self.settle(peer, result) {
                debug!("Timeout for {}: {}", peer, e);
            }
            flushed?;
        }

        Ok(())
    }

    /// The earliest instant [`Endpoint::handle_timeout`] has work to do.
    pub fn poll_timeout(&self) -> Option<Instant> {
        let idle_timeout = self.config.idle_timeout();
        self.connections
            .values()
            .flat_map(|conn| {
                [
                    Some(conn.dtls().poll_timeout()),
                    conn.idle_deadline(idle_timeout),
                ]
            })
            .flatten()
            .min()
    }

    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Drain the connection's output into the transport and the event queue.
    fn flush(&mut self, peer: SocketAddr) -> Result<(), Error> {
        let Some(conn) = self.connections.get_mut(&peer) else {
            return Ok(());
        };

        loop {
            match conn.dtls_mut().poll_output(&mut self.buf) {
                Output::Packet(p) => {
                    self.transport
                        .send_datagram(peer, p)
                        .map_err(|e| Error::Transport(e.to_string()))?;
                }
                Output::Connected => {
                    info!(
                        "Connected to {}{}",
                        peer,
                        if conn.dtls().is_resumed() { " (resumed)" } else { "" }
                    );
                    if conn.dtls().is_client() {
                        if let Some(session) = conn.dtls().session() {
                            if session.is_resumable() {
                                self.client_sessions.insert(peer, session.clone());
                            }
                        }
                    }
                    self.events.push_back(Event::Connected(peer));
                    if let Err(e) = conn.release_pending() {
                        debug!("Held data for {} stays held: {}", peer, e);
                    }
                }
                Output::PeerCert(cert) => {
                    self.events
                        .push_back(Event::PeerCertificate(peer, cert.to_vec()));
                }
                Output::ApplicationData(data) => {
                    self.events
                        .push_back(Event::ApplicationData(peer, data.to_vec()));
                }
                Output::Timeout(_) => break,
            }
        }

        Ok(())
    }

    /// Remove the connection if it reached a terminal state.
    fn settle(&mut self, peer: SocketAddr, result: Result<(), Error>) -> Result<(), Error> {
        let state = match self.connections.get(&peer) {
            Some(conn) => conn.state(),
            None => return result,
        };

        match state {
            HandshakeState::Closed => self.remove(peer, CloseReason::Peer),
            HandshakeState::Failed => {
                let error = result.clone().err().unwrap_or(Error::ConnectionClosed);
                // A session that failed is not offered again.
                self.client_sessions.remove(&peer);
                self.remove(peer, CloseReason::Failed(error));
            }
            _ => {}
        }

        result
    }

    fn remove(&mut self, peer: SocketAddr, reason: CloseReason) {
        if self.connections.remove(&peer).is_some() {
            info!("Connection to {} closed: {:?}", peer, reason);
            self.events.push_back(Event::Closed(peer, reason));
        }
    }
}
