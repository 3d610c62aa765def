//! Events queued by the handshake for delivery through `poll_output`.

use crate::buffer::Buf;
use crate::Output;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LocalEvent {
    /// Leaf certificate of the peer, available for inspection.
    PeerCert(Buf),
    /// Handshake completed.
    Connected,
    /// Decrypted application data.
    ApplicationData(Buf),
}

impl LocalEvent {
    /// Convert into an `Output`, copying the payload into `buf`.
    ///
    /// Gives the event back when `buf` is too small for its payload.
    pub(crate) fn into_output(self, buf: &mut [u8]) -> Result<Output<'_>, LocalEvent> {
        let data = match &self {
            LocalEvent::Connected => return Ok(Output::Connected),
            LocalEvent::PeerCert(data) | LocalEvent::ApplicationData(data) => data,
        };

        let l = data.len();
        if l > buf.len() {
            return Err(self);
        }
        buf[..l].copy_from_slice(data);

        Ok(match self {
            LocalEvent::PeerCert(_) => Output::PeerCert(&buf[..l]),
            _ => Output::ApplicationData(&buf[..l]),
        })
    }
}
