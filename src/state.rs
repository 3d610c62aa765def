//! Coarse handshake progress, as seen from outside a connection.

use std::fmt;

/// Where a connection stands in its handshake.
///
/// The client and server track finer steps internally. This is the view
/// shared by both roles:
///
/// ```text
/// Idle -> AwaitingPeerHello -> KeyExchangeInFlight -> AwaitingFinished -> Established
/// ```
///
/// `Failed` and `Closed` are terminal and reachable from any other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    /// Created, nothing sent yet.
    Idle,
    /// Client: ClientHello sent. Server: waiting for a ClientHello with a valid cookie.
    AwaitingPeerHello,
    /// Hellos exchanged, certificates and key exchange in progress.
    KeyExchangeInFlight,
    /// Keys derived, waiting for the peer's Finished.
    AwaitingFinished,
    Established,
    /// Ended by a fatal alert, a verification failure or a timeout.
    Failed,
    /// Ended by close_notify, in either direction.
    Closed,
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Failed | HandshakeState::Closed)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
