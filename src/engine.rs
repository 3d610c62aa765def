//! Machinery shared by client and server.
//!
//! The engine owns everything below the handshake logic: the record layer,
//! inbound reassembly, the transcript, the outgoing datagram queue and the
//! flight timers. The client and server drive it message by message.

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use zeroize::Zeroizing;

use crate::buffer::{Buf, BufferPool};
use crate::codec::BitWriter;
use crate::crypto::{prf, KeyBlock};
use crate::event::LocalEvent;
use crate::flight::{Entry, Expiry, Flight, Timeout};
use crate::message::{
    parse_exact, Alert, Body, CipherSuite, ContentType, DTLSRecord, Fragment, Handshake, Header,
    MessageType, Random, HEADER_LEN,
};
use crate::queue::{QueueRx, QueueTx};
use crate::reassembly::{Insert, Reassembler};
use crate::record::{EpochState, RecordLayer};
use crate::rng::SeededRng;
use crate::timer::ExponentialBackoff;
use crate::{Config, Error, Output};

const DISTANT_FUTURE: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// How far past the next expected message_seq a handshake message may be.
const MAX_PENDING_MESSAGES: usize = 16;

/// Counters of records dropped without affecting the connection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Seen before, or below the replay window.
    pub replayed: u64,
    /// Failed authentication after the handshake completed.
    pub undecryptable: u64,
    /// Could not be parsed, or arrived where they make no sense.
    pub malformed: u64,
    /// Flights resent, on timeout or on a duplicate from the peer.
    pub resends: u64,
}

pub(crate) struct Engine {
    config: Arc<Config>,

    /// Jitter for the retransmission timers.
    rng: SeededRng,

    is_client: bool,

    buffers_free: BufferPool,

    records: RecordLayer,

    reassembler: Reassembler,

    /// Records of the next epoch, held until ChangeCipherSpec.
    queue_rx: QueueRx,

    queue_tx: QueueTx,

    queue_events: VecDeque<LocalEvent>,

    /// Set by ServerHello.
    cipher_suite: Option<CipherSuite>,

    master_secret: Option<Zeroizing<Vec<u8>>>,

    next_handshake_seq_no: u16,

    /// Handshake messages in their unfragmented form, for Finished and
    /// CertificateVerify.
    transcript: Buf,

    flight: Flight,

    /// Overall deadline for the handshake.
    connect_timeout: Timeout,

    /// ChangeCipherSpec arrived before the keys it activates.
    pending_ccs: bool,

    /// Handshake done, application data flows.
    release_app_data: bool,

    stats: Stats,
}

impl Engine {
    pub fn new(config: Arc<Config>, is_client: bool) -> Self {
        let mut rng = SeededRng::new(config.rng_seed());

        let backoff = ExponentialBackoff::new(
            config.flight_start_rto(),
            config.flight_max_rto(),
            config.flight_retries(),
            &mut rng,
        );

        Engine {
            rng,
            is_client,
            buffers_free: BufferPool::default(),
            records: RecordLayer::new(),
            reassembler: Reassembler::new(MAX_PENDING_MESSAGES, config.max_queue_rx()),
            queue_rx: QueueRx::new(config.max_queue_rx()),
            queue_tx: QueueTx::new(config.max_queue_tx(), config.mtu()),
            queue_events: VecDeque::new(),
            cipher_suite: None,
            master_secret: None,
            next_handshake_seq_no: 0,
            transcript: Buf::new(),
            flight: Flight::new(backoff),
            connect_timeout: Timeout::Unarmed,
            pending_ccs: false,
            release_app_data: false,
            stats: Stats::default(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.cipher_suite
    }

    pub fn set_cipher_suite(&mut self, suite: CipherSuite) {
        self.cipher_suite = Some(suite);
    }

    pub fn master_secret(&self) -> Option<&[u8]> {
        self.master_secret.as_ref().map(|m| m.as_slice())
    }

    pub fn push_event(&mut self, event: LocalEvent) {
        self.queue_events.push_back(event);
    }

    pub fn handle_packet(&mut self, packet: &[u8]) -> Result<(), Error> {
        let (records, err) = DTLSRecord::parse_datagram(packet);

        if let Some(e) = err {
            self.stats.malformed += 1;
            debug!("Drop malformed record: {}", e);
        }

        for record in records {
            self.handle_record(record)?;
        }

        Ok(())
    }

    fn handle_record(&mut self, record: DTLSRecord) -> Result<(), Error> {
        let epoch = record.sequence.epoch;

        match self.records.epoch_state(epoch) {
            EpochState::Plaintext => {
                // After the epoch change only the peer's retransmitted
                // handshake is of interest; an unprotected alert could be forged.
                if self.records.read_epoch() > 0 && record.content_type != ContentType::Handshake
                {
                    trace!("Drop epoch 0 {:?} after epoch change", record.content_type);
                    return Ok(());
                }
                self.handle_plaintext(record.content_type, 0, record.fragment)
            }

            EpochState::Current => {
                let plaintext = match self.records.open(&record) {
                    Ok(p) => p,
                    Err(Error::ReplayedRecord(epoch, seq)) => {
                        self.stats.replayed += 1;
                        debug!("Drop replayed record {}:{}", epoch, seq);
                        return Ok(());
                    }
                    Err(Error::DecryptionFailed) if self.release_app_data => {
                        self.stats.undecryptable += 1;
                        debug!("Drop undecryptable record {}", record.sequence);
                        return Ok(());
                    }
                    Err(Error::DecryptionFailed) => return Err(Error::HandshakeDecryptionFailed),
                    Err(e) => return Err(e),
                };
                self.handle_plaintext(record.content_type, epoch, plaintext)
            }

            EpochState::Future if Some(epoch) == self.records.read_epoch().checked_add(1) => {
                let sequence = record.sequence;
                if self.queue_rx.hold(record) {
                    trace!("Hold record {} until epoch change", sequence);
                } else {
                    warn!(
                        "Receive queue full (max {}): {:?}",
                        self.queue_rx.max(),
                        self.queue_rx
                    );
                }
                Ok(())
            }

            EpochState::Future | EpochState::Stale => {
                trace!("Drop record of inactive epoch {}", record.sequence);
                Ok(())
            }
        }
    }

    fn handle_plaintext(
        &mut self,
        content_type: ContentType,
        epoch: u16,
        data: Vec<u8>,
    ) -> Result<(), Error> {
        match content_type {
            ContentType::Handshake => self.handle_handshake_record(epoch, &data),
            ContentType::ChangeCipherSpec => self.handle_change_cipher_spec(&data),
            ContentType::Alert => self.handle_alert(&data),
            ContentType::ApplicationData => {
                if !self.release_app_data || epoch == 0 {
                    self.stats.malformed += 1;
                    debug!("Drop application data before handshake completion");
                    return Ok(());
                }
                self.queue_events
                    .push_back(LocalEvent::ApplicationData(Buf::from(data)));
                Ok(())
            }
            ContentType::Unknown(value) => {
                self.stats.malformed += 1;
                debug!("Drop record with unknown content type {}", value);
                Ok(())
            }
        }
    }

    fn handle_handshake_record(&mut self, epoch: u16, data: &[u8]) -> Result<(), Error> {
        let fragments = match Fragment::parse_all(data) {
            Ok(f) => f,
            Err(e) => {
                self.stats.malformed += 1;
                debug!("Drop malformed handshake record: {}", e);
                return Ok(());
            }
        };

        let mut resend = false;

        for fragment in fragments {
            let msg_type = fragment.header.msg_type;

            // Finished is the only handshake message that is protected.
            if (msg_type == MessageType::Finished) != (epoch > 0) {
                self.stats.malformed += 1;
                debug!("Drop {:?} in epoch {}", msg_type, epoch);
                continue;
            }

            if self.release_app_data && fragment.header.message_seq >= self.reassembler.next_seq()
            {
                self.stats.malformed += 1;
                debug!("Ignore {:?} after handshake completion", msg_type);
                continue;
            }

            match self.reassembler.insert(fragment) {
                Insert::Stale(t) if t.ends_flight() => resend = true,
                Insert::Stale(t) => trace!("Drop stale {:?}", t),
                Insert::Duplicate => trace!("Drop duplicate fragment of {:?}", msg_type),
                Insert::Dropped => self.stats.malformed += 1,
                Insert::Buffered => {}
            }
        }

        if resend {
            self.flight_resend("duplicate of peer flight")?;
        }

        Ok(())
    }

    fn handle_change_cipher_spec(&mut self, data: &[u8]) -> Result<(), Error> {
        if data != [1] {
            self.stats.malformed += 1;
            debug!("Drop malformed ChangeCipherSpec");
            return Ok(());
        }

        if self.records.read_epoch() > 0 {
            trace!("Ignore repeated ChangeCipherSpec");
            return Ok(());
        }

        if !self.records.has_pending_read() {
            debug!("ChangeCipherSpec before keys, held");
            self.pending_ccs = true;
            return Ok(());
        }

        self.activate_read()
    }

    fn activate_read(&mut self) -> Result<(), Error> {
        self.records.activate_read()?;
        self.pending_ccs = false;

        let epoch = self.records.read_epoch();
        for record in self.queue_rx.release(epoch) {
            self.handle_record(record)?;
        }

        Ok(())
    }

    fn handle_alert(&mut self, data: &[u8]) -> Result<(), Error> {
        let alert = match parse_exact(data, Alert::parse) {
            Ok(a) => a,
            Err(e) => {
                self.stats.malformed += 1;
                debug!("Drop malformed alert: {}", e);
                return Ok(());
            }
        };

        if alert.ends_connection() {
            debug!("Received alert {:?}", alert);
            return Err(Error::AlertReceived(alert));
        }

        debug!("Ignore warning alert {:?}", alert.description);
        Ok(())
    }

    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        if self.connect_timeout == Timeout::Unarmed {
            debug!(
                "Connect timeout in: {:.03}s",
                self.config.handshake_timeout().as_secs_f32()
            );
        }
        self.connect_timeout
            .arm_if_unarmed(now, self.config.handshake_timeout());

        if self.connect_timeout.is_expired(now) {
            return Err(Error::Timeout("handshake"));
        }

        if self.flight.handle_timeout(now, &mut self.rng)? == Expiry::Resend {
            self.flight_resend("flight timeout")?;
        }

        Ok(())
    }

    /// Arm timers started since the last call.
    pub fn arm_timers(&mut self, now: Instant) {
        self.connect_timeout
            .arm_if_unarmed(now, self.config.handshake_timeout());
        self.flight.arm(now);
    }

    pub fn poll_output<'a>(&mut self, buf: &'a mut [u8], now: Instant) -> Output<'a> {
        if let Some(event) = self.queue_events.pop_front() {
            match event.into_output(buf) {
                Ok(output) => return output,
                Err(event) => {
                    // The caller needs a bigger buffer. Keep the event for the next poll.
                    warn!("Output buffer too small for {:?}", event);
                    self.queue_events.push_front(event);
                    return Output::Timeout(now);
                }
            }
        }

        match self.queue_tx.pop_front_within(buf.len()) {
            Ok(Some(p)) => {
                let len = p.len();
                buf[..len].copy_from_slice(&p);
                self.buffers_free.push(p);
                return Output::Packet(&buf[..len]);
            }
            Ok(None) => {}
            Err(len) => {
                warn!("Output buffer too small for packet {} > {}", len, buf.len());
                return Output::Timeout(now);
            }
        }

        Output::Timeout(self.poll_timeout(now))
    }

    pub fn poll_timeout(&self, now: Instant) -> Instant {
        match (self.connect_timeout.deadline(), self.flight.deadline()) {
            (Some(c), Some(f)) => c.min(f),
            (Some(c), None) => c,
            (None, Some(f)) => f,
            (None, None) => now + DISTANT_FUTURE,
        }
    }

    pub fn flight_begin(&mut self, flight_no: u8) {
        for buf in self.flight.begin(flight_no, &mut self.rng) {
            self.buffers_free.push(buf);
        }
    }

    /// Stop the flight timer. The flight stays available for resends on duplicates.
    pub fn flight_stop_timer(&mut self) {
        self.flight.stop_timer();
    }

    pub fn flight_stop_resend_timers(&mut self) {
        debug!("Stop connect and flight timeouts");
        self.flight.stop_timer();
        self.connect_timeout = Timeout::Disabled;
    }

    fn flight_resend(&mut self, reason: &str) -> Result<(), Error> {
        if self.flight.records().is_empty() {
            return Ok(());
        }

        debug!("Resending flight {} due to {}", self.flight.number(), reason);
        self.stats.resends += 1;

        // For lifetime issues, we take the entries out of the flight
        let records = self.flight.take_records();

        let mut result = Ok(());
        for entry in &records {
            result = self.create_record(entry.content_type, entry.epoch, false, |fragment| {
                fragment.extend_from_slice(&entry.fragment);
            });
            if result.is_err() {
                break;
            }
        }

        self.flight.restore_records(records);

        result
    }

    /// Frame a record and pack it into the outgoing datagrams.
    ///
    /// With `save_fragment` the plaintext is kept as part of the current flight.
    pub fn create_record<F>(
        &mut self,
        content_type: ContentType,
        epoch: u16,
        save_fragment: bool,
        f: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(&mut Buf),
    {
        let mut fragment = self.buffers_free.pop();
        f(&mut fragment);

        if save_fragment {
            let mut clone = self.buffers_free.pop();
            clone.extend_from_slice(&fragment);
            self.flight.save(Entry {
                content_type,
                epoch,
                fragment: clone,
            });
        }

        let record_wire_len = RecordLayer::wire_len(epoch, fragment.len());

        let can_append = self.queue_tx.fits_last(record_wire_len);

        if !can_append && self.queue_tx.is_full() {
            warn!("Transmit queue full: {:?}", self.queue_tx);
            self.buffers_free.push(fragment);
            return Err(Error::TransmitQueueFull);
        }

        let record = self.records.seal(content_type, epoch, &fragment);
        self.buffers_free.push(fragment);
        let record = record?;

        let datagram = if can_append {
            self.queue_tx.pop_last().unwrap_or_default()
        } else {
            self.buffers_free.pop()
        };

        let mut w = BitWriter::with_buf(datagram);
        record.serialize(&mut w);
        self.queue_tx.push(w.finish());

        Ok(())
    }

    /// Add a handshake message to the transcript and send it, fragmented to
    /// fill the datagrams up to the MTU.
    pub fn create_handshake(&mut self, body: &Body) -> Result<(), Error> {
        let msg_type = body.message_type();

        let mut w = BitWriter::with_buf(self.buffers_free.pop());
        body.serialize(&mut w);
        let body_buffer = w.finish();

        let header = Header {
            msg_type,
            length: body_buffer.len() as u32,
            message_seq: self.next_handshake_seq_no,
            fragment_offset: 0,
            fragment_length: body_buffer.len() as u32,
        };

        let mut w = BitWriter::with_buf(mem::take(&mut self.transcript));
        header.serialize(&mut w);
        w.write_bytes(&body_buffer);
        self.transcript = w.finish();

        self.next_handshake_seq_no = self.next_handshake_seq_no.wrapping_add(1);

        let epoch = msg_type.epoch();
        let total_len = body_buffer.len();
        let mut offset = 0;

        let fixed_overhead = RecordLayer::wire_len(epoch, 0) + HEADER_LEN;

        // At least one record even for an empty body.
        loop {
            let available_in_current = self.queue_tx.room_in_last();

            let available_for_body = if available_in_current > fixed_overhead {
                available_in_current - fixed_overhead
            } else {
                self.config.mtu().saturating_sub(fixed_overhead)
            };

            let chunk_len = (total_len - offset).min(available_for_body);

            let fragment = Fragment {
                header: Header {
                    fragment_offset: offset as u32,
                    fragment_length: chunk_len as u32,
                    ..header
                },
                data: body_buffer[offset..offset + chunk_len].to_vec(),
            };

            trace!(
                "Send {:?} seq {} fragment {}+{}",
                msg_type,
                header.message_seq,
                offset,
                chunk_len
            );

            self.create_record(ContentType::Handshake, epoch, true, |buf| {
                let mut w = BitWriter::with_buf(mem::take(buf));
                fragment.serialize(&mut w);
                *buf = w.finish();
            })
            .map_err(flight_error)?;

            offset += chunk_len;
            if offset >= total_len {
                break;
            }
        }

        self.buffers_free.push(body_buffer);

        Ok(())
    }

    /// Send ChangeCipherSpec and move our writes to the next epoch.
    pub fn send_change_cipher_spec(&mut self) -> Result<(), Error> {
        let epoch = self.records.write_epoch();
        self.create_record(ContentType::ChangeCipherSpec, epoch, true, |buf| buf.push(1))
            .map_err(flight_error)?;
        self.records.activate_write()
    }

    pub fn send_alert(&mut self, alert: Alert) -> Result<(), Error> {
        debug!("Send alert {:?}", alert);
        let epoch = self.records.write_epoch();
        self.create_record(ContentType::Alert, epoch, false, |buf| {
            let mut w = BitWriter::with_buf(mem::take(buf));
            alert.serialize(&mut w);
            *buf = w.finish();
        })
    }

    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if !self.release_app_data {
            return Err(Error::NotEstablished);
        }
        if data.len() > self.max_application_data() {
            return Err(Error::PayloadTooLarge(data.len()));
        }
        let epoch = self.records.write_epoch();
        self.create_record(ContentType::ApplicationData, epoch, false, |buf| {
            buf.extend_from_slice(data)
        })
    }

    /// Largest application payload that fits a single datagram.
    ///
    /// Application data is always protected, also when asked before the
    /// handshake completes.
    pub fn max_application_data(&self) -> usize {
        let epoch = self.records.write_epoch().max(1);
        self.config
            .mtu()
            .saturating_sub(RecordLayer::wire_len(epoch, 0))
    }

    /// Type of the next handshake message, if it is complete.
    pub fn peek_message(&self) -> Option<MessageType> {
        if self.reassembler.has_next() {
            self.reassembler.peek_type()
        } else {
            None
        }
    }

    /// Take the next handshake message, which must be of type `wanted`.
    ///
    /// The message is added to the transcript.
    pub fn next_message(&mut self, wanted: MessageType) -> Result<Option<Handshake>, Error> {
        match self.peek_message() {
            None => return Ok(None),
            Some(t) if t != wanted => {
                return Err(Error::UnexpectedMessageForState(format!(
                    "Expected {:?}, got {:?}",
                    wanted, t
                )));
            }
            Some(_) => {}
        }

        let Some(message) = self.reassembler.pop() else {
            return Ok(None);
        };

        let body = Body::parse(message.msg_type, &message.body)?;

        let length = message.body.len() as u32;
        let header = Header {
            msg_type: message.msg_type,
            length,
            message_seq: message.message_seq,
            fragment_offset: 0,
            fragment_length: length,
        };

        let mut w = BitWriter::with_buf(mem::take(&mut self.transcript));
        header.serialize(&mut w);
        w.write_bytes(&message.body);
        self.transcript = w.finish();

        trace!("Received {:?} seq {}", message.msg_type, message.message_seq);

        Ok(Some(Handshake { header, body }))
    }

    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }

    /// Forget the transcript. The initial ClientHello and the
    /// HelloVerifyRequest are not part of it.
    pub fn transcript_reset(&mut self) {
        self.transcript.clear();
    }

    /// Derive the master secret from the premaster secret.
    pub fn derive_master_secret(
        &mut self,
        pre_master_secret: &[u8],
        client_random: &Random,
        server_random: &Random,
    ) -> Result<Zeroizing<Vec<u8>>, Error> {
        let suite = self.suite()?;
        prf::master_secret(
            pre_master_secret,
            &client_random.to_bytes(),
            &server_random.to_bytes(),
            suite.hash_algorithm(),
        )
    }

    /// Derive the record keys from `master_secret` and stage them for the
    /// next epoch. A ChangeCipherSpec that arrived early takes effect now.
    pub fn install_keys(
        &mut self,
        master_secret: Zeroizing<Vec<u8>>,
        client_random: &Random,
        server_random: &Random,
    ) -> Result<(), Error> {
        let suite = self.suite()?;

        let block = KeyBlock::derive(
            suite,
            &master_secret,
            &client_random.to_bytes(),
            &server_random.to_bytes(),
        )?;
        let (write, read) = block.into_ciphers(self.is_client)?;
        self.records.install_keys(write, read);
        self.master_secret = Some(master_secret);

        debug!("Keys derived for {:?}", suite);

        if self.pending_ccs {
            self.activate_read()?;
        }

        Ok(())
    }

    /// verify_data over the transcript so far, with the client or server label.
    pub fn verify_data(&self, client: bool) -> Result<Vec<u8>, Error> {
        let suite = self.suite()?;
        let Some(master_secret) = &self.master_secret else {
            return Err(Error::UnexpectedMessageForState(
                "Finished before key exchange".into(),
            ));
        };
        prf::verify_data(suite, master_secret, client, &self.transcript)
    }

    fn suite(&self) -> Result<CipherSuite, Error> {
        self.cipher_suite.ok_or_else(|| {
            Error::UnexpectedMessageForState("No cipher suite selected".into())
        })
    }

    /// Handshake complete: stop the timers and let application data through.
    pub fn release_application_data(&mut self) {
        self.flight_stop_resend_timers();
        self.release_app_data = true;
        self.reassembler.clear();
        self.queue_events.push_back(LocalEvent::Connected);
    }

    /// Tear down after a fatal error or close.
    ///
    /// The alert, if any, goes out before the keys are dropped.
    pub fn shutdown(&mut self, alert: Option<Alert>) {
        if let Some(alert) = alert {
            if let Err(e) = self.send_alert(alert) {
                debug!("Failed to send alert: {}", e);
            }
        }
        self.flight_stop_resend_timers();
        self.release_app_data = false;
        self.records.clear_keys();
        self.master_secret = None;
        self.queue_rx.clear();
        self.reassembler.clear();
    }
}

/// A flight that was only partly written cannot be sent or resent.
fn flight_error(e: Error) -> Error {
    match e {
        Error::TransmitQueueFull => Error::FlightOverflow,
        e => e,
    }
}
