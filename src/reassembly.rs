//! Inbound handshake reassembly.
//!
//! Fragments are buffered per `message_seq`. A message is released in
//! sequence order once its fragments cover `[0, length)`.

use std::collections::BTreeMap;

use crate::message::{Fragment, MessageType};

/// A complete handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Message {
    pub msg_type: MessageType,
    pub message_seq: u16,
    pub body: Vec<u8>,
}

/// What [`Reassembler::insert`] did with a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Insert {
    /// Stored, the message may now be complete.
    Buffered,
    /// Same offset and length as a fragment we already hold.
    Duplicate,
    /// Belongs to a message that was already consumed.
    Stale(MessageType),
    /// Overlaps held data, contradicts the first fragment, is too far ahead,
    /// or the reassembly buffer is full.
    Dropped,
}

#[derive(Debug)]
struct Partial {
    msg_type: MessageType,
    length: u32,
    /// Received fragments as `(offset, data)`, sorted by offset.
    fragments: Vec<(u32, Vec<u8>)>,
    received: u32,
}

impl Partial {
    fn is_complete(&self) -> bool {
        self.received == self.length
    }

    fn into_body(self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.length as usize);
        for (_, data) in self.fragments {
            body.extend_from_slice(&data);
        }
        body
    }
}

pub(crate) struct Reassembler {
    next_seq: u16,
    pending: BTreeMap<u16, Partial>,
    /// How far past `next_seq` a message_seq may be.
    max_pending: usize,
    /// Fragments held across all pending messages.
    max_fragments: usize,
    held_fragments: usize,
}

impl Reassembler {
    pub fn new(max_pending: usize, max_fragments: usize) -> Self {
        Reassembler {
            next_seq: 0,
            pending: BTreeMap::new(),
            max_pending,
            max_fragments,
            held_fragments: 0,
        }
    }

    /// The message_seq of the next message we will release.
    pub fn next_seq(&self) -> u16 {
        self.next_seq
    }

    pub fn insert(&mut self, fragment: Fragment) -> Insert {
        let h = fragment.header;

        if h.message_seq < self.next_seq {
            return Insert::Stale(h.msg_type);
        }

        if (h.message_seq - self.next_seq) as usize >= self.max_pending {
            debug!(
                "Drop message_seq {}, expecting {}",
                h.message_seq, self.next_seq
            );
            return Insert::Dropped;
        }

        if let Some(partial) = self.pending.get(&h.message_seq) {
            if partial.msg_type != h.msg_type || partial.length != h.length {
                debug!(
                    "Fragment header mismatch for message_seq {}: {:?}",
                    h.message_seq, h.msg_type
                );
                return Insert::Dropped;
            }
        }

        let start = h.fragment_offset;
        let end = start + h.fragment_length;

        if let Some(partial) = self.pending.get(&h.message_seq) {
            if partial
                .fragments
                .iter()
                .any(|(o, d)| *o == start && d.len() as u32 == h.fragment_length)
            {
                return Insert::Duplicate;
            }

            let overlaps = partial
                .fragments
                .iter()
                .any(|(o, d)| start < o + d.len() as u32 && *o < end);

            if overlaps {
                trace!(
                    "Drop overlapping fragment {}+{} of message_seq {}",
                    start,
                    h.fragment_length,
                    h.message_seq
                );
                return Insert::Dropped;
            }
        }

        // Empty fragments only count as data for empty messages.
        if h.fragment_length == 0 && h.length != 0 {
            return Insert::Dropped;
        }

        if self.held_fragments >= self.max_fragments {
            debug!("Reassembly full, drop fragment of message_seq {}", h.message_seq);
            return Insert::Dropped;
        }

        let partial = self.pending.entry(h.message_seq).or_insert_with(|| Partial {
            msg_type: h.msg_type,
            length: h.length,
            fragments: Vec::new(),
            received: 0,
        });

        let pos = partial
            .fragments
            .binary_search_by_key(&start, |(o, _)| *o)
            .unwrap_or_else(|p| p);
        partial.fragments.insert(pos, (start, fragment.data));
        partial.received += h.fragment_length;
        self.held_fragments += 1;

        Insert::Buffered
    }

    /// Whether the next message in sequence is complete.
    pub fn has_next(&self) -> bool {
        self.pending
            .get(&self.next_seq)
            .map(|p| p.is_complete())
            .unwrap_or(false)
    }

    /// Type of the next message in sequence, complete or not.
    pub fn peek_type(&self) -> Option<MessageType> {
        self.pending.get(&self.next_seq).map(|p| p.msg_type)
    }

    /// Release the next message in sequence if it is complete.
    pub fn pop(&mut self) -> Option<Message> {
        if !self.has_next() {
            return None;
        }

        let partial = self.pending.remove(&self.next_seq)?;
        self.held_fragments -= partial.fragments.len();
        let message = Message {
            msg_type: partial.msg_type,
            message_seq: self.next_seq,
            body: partial.into_body(),
        };
        self.next_seq = self.next_seq.wrapping_add(1);

        Some(message)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.held_fragments = 0;
    }
}
