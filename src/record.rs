//! Record protection state of one connection.
//!
//! The write side keeps two sequence counters. Epoch 0 records of a flight
//! may have to be retransmitted after we moved to epoch 1, and they must
//! continue the epoch 0 numbering.
//!
//! The read side tracks the active read epoch and the anti-replay window of
//! that epoch. Keys for the next epoch are staged when they are derived and
//! activated by ChangeCipherSpec.

use crate::crypto::cipher::{RecordCipher, AEAD_OVERHEAD};
use crate::message::{ContentType, DTLSRecord, ProtocolVersion, Sequence, RECORD_HEADER_LEN};
use crate::window::ReplayWindow;
use crate::Error;

/// Where an inbound record's epoch stands relative to the read epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EpochState {
    /// Epoch 0, unprotected.
    Plaintext,
    /// The active protected epoch.
    Current,
    /// Not yet activated. The record can be held until it is.
    Future,
    /// An earlier protected epoch.
    Stale,
}

pub(crate) struct RecordLayer {
    sequence_epoch_0: Sequence,
    sequence_epoch_n: Sequence,

    write_epoch: u16,
    read_epoch: u16,

    write_cipher: Option<RecordCipher>,
    read_cipher: Option<RecordCipher>,

    /// Derived but not yet activated by ChangeCipherSpec.
    pending_write: Option<RecordCipher>,
    pending_read: Option<RecordCipher>,

    replay: ReplayWindow,
}

impl RecordLayer {
    pub fn new() -> Self {
        RecordLayer {
            sequence_epoch_0: Sequence::new(0),
            sequence_epoch_n: Sequence::new(1),
            write_epoch: 0,
            read_epoch: 0,
            write_cipher: None,
            read_cipher: None,
            pending_write: None,
            pending_read: None,
            replay: ReplayWindow::new(),
        }
    }

    /// Stage the ciphers of the next epoch.
    pub fn install_keys(&mut self, write: RecordCipher, read: RecordCipher) {
        self.pending_write = Some(write);
        self.pending_read = Some(read);
    }

    pub fn has_pending_read(&self) -> bool {
        self.pending_read.is_some()
    }

    /// Switch our writes to the next epoch. Called right after sending ChangeCipherSpec.
    pub fn activate_write(&mut self) -> Result<(), Error> {
        let cipher = self
            .pending_write
            .take()
            .ok_or_else(|| Error::CryptoError("No write keys to activate".into()))?;

        let epoch = self.write_epoch.checked_add(1).ok_or(Error::WrappedEpoch)?;
        self.write_epoch = epoch;
        self.sequence_epoch_n = Sequence::new(epoch);
        self.write_cipher = Some(cipher);

        debug!("Write epoch {}", epoch);
        Ok(())
    }

    /// Switch reads to the next epoch. Called on receiving ChangeCipherSpec.
    pub fn activate_read(&mut self) -> Result<(), Error> {
        let cipher = self
            .pending_read
            .take()
            .ok_or_else(|| Error::CryptoError("No read keys to activate".into()))?;

        let epoch = self.read_epoch.checked_add(1).ok_or(Error::WrappedEpoch)?;
        self.read_epoch = epoch;
        self.read_cipher = Some(cipher);
        self.replay.reset();

        debug!("Read epoch {}", epoch);
        Ok(())
    }

    pub fn write_epoch(&self) -> u16 {
        self.write_epoch
    }

    pub fn read_epoch(&self) -> u16 {
        self.read_epoch
    }

    pub fn epoch_state(&self, epoch: u16) -> EpochState {
        if epoch == 0 {
            EpochState::Plaintext
        } else if epoch == self.read_epoch {
            EpochState::Current
        } else if epoch > self.read_epoch {
            EpochState::Future
        } else {
            EpochState::Stale
        }
    }

    /// Bytes a record with `plaintext_len` bytes of payload occupies on the wire.
    pub fn wire_len(epoch: u16, plaintext_len: usize) -> usize {
        let overhead = if epoch >= 1 { AEAD_OVERHEAD } else { 0 };
        RECORD_HEADER_LEN + plaintext_len + overhead
    }

    /// Frame (and for epoch >= 1 protect) a record.
    ///
    /// `epoch` is either 0 or the current write epoch.
    pub fn seal(
        &mut self,
        content_type: ContentType,
        epoch: u16,
        plaintext: &[u8],
    ) -> Result<DTLSRecord, Error> {
        let counter = if epoch == 0 {
            &mut self.sequence_epoch_0
        } else {
            &mut self.sequence_epoch_n
        };

        if counter.sequence_number > Sequence::MAX_SEQUENCE_NUMBER {
            return Err(Error::SequenceExhausted);
        }
        let sequence = *counter;
        counter.sequence_number += 1;

        let version = ProtocolVersion::DTLS1_2;

        let fragment = if epoch == 0 {
            plaintext.to_vec()
        } else {
            if epoch != self.write_epoch {
                return Err(Error::CryptoError(format!(
                    "Write epoch {} is not active",
                    epoch
                )));
            }
            let cipher = self
                .write_cipher
                .as_ref()
                .ok_or_else(|| Error::CryptoError("Write keys not available".into()))?;
            cipher.seal(sequence, content_type, version, plaintext)?
        };

        trace!(
            "Seal {:?} {} len {}",
            content_type,
            sequence,
            fragment.len()
        );

        Ok(DTLSRecord {
            content_type,
            version,
            sequence,
            fragment,
        })
    }

    /// Unprotect a record of the current read epoch.
    ///
    /// The replay window is consulted before decryption and only updated after
    /// the record authenticated.
    pub fn open(&mut self, record: &DTLSRecord) -> Result<Vec<u8>, Error> {
        let seq = record.sequence;

        if seq.epoch == 0 {
            return Ok(record.fragment.clone());
        }

        if seq.epoch != self.read_epoch {
            return Err(Error::CryptoError(format!(
                "Read epoch {} is not active",
                seq.epoch
            )));
        }

        if !self.replay.check(seq.sequence_number) {
            return Err(Error::ReplayedRecord(seq.epoch, seq.sequence_number));
        }

        let cipher = self
            .read_cipher
            .as_ref()
            .ok_or_else(|| Error::CryptoError("Read keys not available".into()))?;

        let plaintext = cipher.open(seq, record.content_type, record.version, &record.fragment)?;

        self.replay.update(seq.sequence_number);

        Ok(plaintext)
    }

    /// Forget all key material.
    pub fn clear_keys(&mut self) {
        self.write_cipher = None;
        self.read_cipher = None;
        self.pending_write = None;
        self.pending_read = None;
    }
}
