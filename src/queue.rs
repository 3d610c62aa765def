//! Bounded record and datagram queues of the engine.

use std::collections::VecDeque;
use std::fmt;

use crate::buffer::Buf;
use crate::message::{ContentType, DTLSRecord};

/// Records of the next read epoch, held until the peer's ChangeCipherSpec
/// activates the keys to open them.
pub(crate) struct QueueRx {
    held: VecDeque<DTLSRecord>,
    max: usize,
}

impl QueueRx {
    pub fn new(max: usize) -> Self {
        QueueRx {
            held: VecDeque::new(),
            max,
        }
    }

    /// Hold a record. `false` when the queue is full and the record was dropped.
    pub fn hold(&mut self, record: DTLSRecord) -> bool {
        if self.held.len() >= self.max {
            return false;
        }
        self.held.push_back(record);
        true
    }

    /// Take the held records of `epoch` in arrival order. Records of other
    /// epochs can never be opened and are dropped.
    pub fn release(&mut self, epoch: u16) -> Vec<DTLSRecord> {
        self.held
            .drain(..)
            .filter(|r| r.sequence.epoch == epoch)
            .collect()
    }

    pub fn clear(&mut self) {
        self.held.clear();
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

impl fmt::Debug for QueueRx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handshake = self
            .held
            .iter()
            .filter(|r| r.content_type == ContentType::Handshake)
            .count();

        let mut s = f.debug_struct("QueueRx");
        s.field("len", &self.held.len())
            .field("handshake", &handshake)
            .field("other", &(self.held.len() - handshake));

        let first = self.held.iter().map(|r| r.sequence).min();
        let last = self.held.iter().map(|r| r.sequence).max();
        if let (Some(first), Some(last)) = (first, last) {
            s.field("seq_range", &format_args!("{} - {}", first, last));
        }

        s.finish()
    }
}

/// Outgoing datagrams. Records are packed into the last datagram while it
/// stays within the MTU.
pub(crate) struct QueueTx {
    datagrams: VecDeque<Buf>,
    max: usize,
    mtu: usize,
}

impl QueueTx {
    pub fn new(max: usize, mtu: usize) -> Self {
        QueueTx {
            datagrams: VecDeque::new(),
            max,
            mtu,
        }
    }

    /// Bytes left in the last datagram, 0 when there is none.
    pub fn room_in_last(&self) -> usize {
        self.datagrams
            .back()
            .map(|d| self.mtu.saturating_sub(d.len()))
            .unwrap_or(0)
    }

    /// Whether a record of `wire_len` bytes can be appended to the last datagram.
    pub fn fits_last(&self, wire_len: usize) -> bool {
        !self.datagrams.is_empty() && wire_len <= self.room_in_last()
    }

    /// Whether starting another datagram would exceed the queue bound.
    pub fn is_full(&self) -> bool {
        self.datagrams.len() >= self.max
    }

    pub fn push(&mut self, datagram: Buf) {
        self.datagrams.push_back(datagram);
    }

    pub fn pop_last(&mut self) -> Option<Buf> {
        self.datagrams.pop_back()
    }

    /// The next datagram to send, if it fits `limit` bytes.
    ///
    /// `Err` carries the length of a datagram that does not fit.
    pub fn pop_front_within(&mut self, limit: usize) -> Result<Option<Buf>, usize> {
        match self.datagrams.front() {
            None => Ok(None),
            Some(d) if d.len() > limit => Err(d.len()),
            Some(_) => Ok(self.datagrams.pop_front()),
        }
    }
}

impl fmt::Debug for QueueTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes: usize = self.datagrams.iter().map(|d| d.len()).sum();
        f.debug_struct("QueueTx")
            .field("datagrams", &self.datagrams.len())
            .field("bytes", &bytes)
            .finish()
    }
}
