use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{Config, Dtls, DtlsCertificate, Error, HandshakeState, Session, SessionCache};

/// A [`Dtls`] bound to a peer address, as held by an [`Endpoint`].
///
/// [`Endpoint`]: crate::Endpoint
pub struct Connection {
    peer: SocketAddr,
    dtls: Dtls,
    last_activity: Instant,
    /// Application data sent before the handshake completed.
    pending: VecDeque<Vec<u8>>,
    max_pending: usize,
}

impl Connection {
    pub(crate) fn client(
        peer: SocketAddr,
        config: Arc<Config>,
        certificate: DtlsCertificate,
        session: Option<Session>,
        now: Instant,
    ) -> Result<Connection, Error> {
        let max_pending = config.max_queue_tx();
        let dtls = match session {
            Some(session) => Dtls::new_client_resuming(config, certificate, session, now)?,
            None => Dtls::new_client(config, certificate, now)?,
        };
        Ok(Self::wrap(peer, dtls, max_pending, now))
    }

    pub(crate) fn server(
        peer: SocketAddr,
        config: Arc<Config>,
        certificate: DtlsCertificate,
        sessions: Arc<SessionCache>,
        now: Instant,
    ) -> Result<Connection, Error> {
        let max_pending = config.max_queue_tx();
        let dtls = Dtls::new_server(config, certificate, sessions, now)?;
        Ok(Self::wrap(peer, dtls, max_pending, now))
    }

    fn wrap(peer: SocketAddr, dtls: Dtls, max_pending: usize, now: Instant) -> Connection {
        Connection {
            peer,
            dtls,
            last_activity: now,
            pending: VecDeque::new(),
            max_pending,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> HandshakeState {
        self.dtls.state()
    }

    pub fn dtls(&self) -> &Dtls {
        &self.dtls
    }

    pub(crate) fn dtls_mut(&mut self) -> &mut Dtls {
        &mut self.dtls
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// When an established connection counts as idle.
    pub(crate) fn idle_deadline(&self, idle_timeout: Duration) -> Option<Instant> {
        self.dtls
            .is_established()
            .then(|| self.last_activity + idle_timeout)
    }

    /// Send now if established, otherwise hold until the handshake completes.
    pub(crate) fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.dtls.is_established() {
            self.release_pending()?;
            return self.dtls.send_application_data(data);
        }
        if self.dtls.state().is_terminal() {
            return Err(Error::ConnectionClosed);
        }

        if data.len() > self.dtls.max_application_data() {
            return Err(Error::PayloadTooLarge(data.len()));
        }
        if self.pending.len() >= self.max_pending {
            return Err(Error::TransmitQueueFull);
        }
        trace!("Hold {} bytes until connected to {}", data.len(), self.peer);
        self.pending.push_back(data.to_vec());
        Ok(())
    }

    /// Send what was held back during the handshake.
    ///
    /// A payload leaves the queue only once the connection accepted it.
    pub(crate) fn release_pending(&mut self) -> Result<(), Error> {
        while let Some(data) = self.pending.front() {
            self.dtls.send_application_data(data)?;
            self.pending.pop_front();
        }
        Ok(())
    }

    /// Payloads held until the handshake completes.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
