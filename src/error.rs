use std::net::SocketAddr;

use thiserror::Error;

use crate::message::{Alert, AlertDescription};

/// Errors raised by the handshake, the record layer and the endpoint.
///
/// Whether an error tears down the connection is decided by [`Error::is_fatal`].
/// Fatal errors carry the alert we signal to the peer, see [`Error::alert`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Truncated message")]
    TruncatedMessage,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unsupported curve: {0}")]
    UnsupportedCurve(String),

    #[error("Point is not on curve {0}")]
    InvalidPoint(&'static str),

    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    #[error("Replayed record epoch {0} sequence {1}")]
    ReplayedRecord(u16, u64),

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Decryption failed during handshake")]
    HandshakeDecryptionFailed,

    #[error("Flight retransmissions exhausted")]
    RetryExhausted,

    #[error("Unexpected message for state: {0}")]
    UnexpectedMessageForState(String),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Security error: {0}")]
    SecurityError(String),

    #[error("Finished verify_data mismatch")]
    FinishedMismatch,

    #[error("Peer sent alert: {0:?}")]
    AlertReceived(Alert),

    #[error("Timeout: {0}")]
    Timeout(&'static str),

    #[error("Receive queue full")]
    ReceiveQueueFull,

    #[error("Transmit queue full")]
    TransmitQueueFull,

    #[error("Handshake flight does not fit the transmit queue")]
    FlightOverflow,

    #[error("Connection not established")]
    NotEstablished,

    #[error("Payload of {0} bytes does not fit one record")]
    PayloadTooLarge(usize),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Unknown peer {0}")]
    UnknownPeer(SocketAddr),

    #[error("Record sequence number exhausted")]
    SequenceExhausted,

    #[error("Epoch is not allowed to wrap")]
    WrappedEpoch,

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Whether this error ends the connection.
    ///
    /// Replayed and undecryptable records after the handshake are dropped
    /// without affecting the connection. So is an overfull receive queue.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::ReplayedRecord(..)
                | Error::DecryptionFailed
                | Error::ReceiveQueueFull
                | Error::TransmitQueueFull
                | Error::NotEstablished
                | Error::PayloadTooLarge(_)
                | Error::UnknownPeer(_)
                | Error::ConfigError(_)
                | Error::Transport(_)
        )
    }

    /// The alert to send to the peer for a fatal error.
    ///
    /// `None` when the error is non-fatal, or when the peer already knows
    /// (it sent us an alert) or the connection is already gone.
    pub fn alert(&self) -> Option<Alert> {
        if !self.is_fatal() {
            return None;
        }

        let description = match self {
            Error::TruncatedMessage | Error::ParseError(_) => AlertDescription::DecodeError,
            Error::UnsupportedCurve(_)
            | Error::SecurityError(_)
            | Error::SignatureVerificationFailed
            | Error::RetryExhausted
            | Error::Timeout(_) => AlertDescription::HandshakeFailure,
            Error::InvalidPoint(_) => AlertDescription::IllegalParameter,
            Error::HandshakeDecryptionFailed => AlertDescription::BadRecordMac,
            Error::UnexpectedMessageForState(_) => AlertDescription::UnexpectedMessage,
            Error::CertificateError(_) => AlertDescription::BadCertificate,
            Error::FinishedMismatch => AlertDescription::DecryptError,
            Error::CryptoError(_)
            | Error::SequenceExhausted
            | Error::WrappedEpoch
            | Error::FlightOverflow => AlertDescription::InternalError,
            Error::AlertReceived(_) | Error::ConnectionClosed => return None,
            _ => AlertDescription::InternalError,
        };

        Some(Alert::fatal(description))
    }
}
