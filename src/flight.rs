//! Outgoing flights and their retransmission timers.

use std::time::{Duration, Instant};

use crate::buffer::Buf;
use crate::message::ContentType;
use crate::rng::SeededRng;
use crate::timer::ExponentialBackoff;
use crate::Error;

/// A sans-IO timer slot.
///
/// `Unarmed` becomes `Armed` on the next `handle_timeout`, which is the first
/// moment we learn the current time. `Disabled` never fires, so a late call
/// for a retired timer is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Timeout {
    Disabled,
    Unarmed,
    Armed(Instant),
}

impl Timeout {
    pub fn arm_if_unarmed(&mut self, now: Instant, after: Duration) {
        if *self == Timeout::Unarmed {
            *self = Timeout::Armed(now + after);
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self {
            Timeout::Armed(at) => Some(*at),
            _ => None,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self, Timeout::Armed(at) if now >= *at)
    }
}

/// A record of the current flight, kept as plaintext for resending.
#[derive(Debug)]
pub(crate) struct Entry {
    pub content_type: ContentType,
    pub epoch: u16,
    pub fragment: Buf,
}

/// What a flight timer expiry asks of the engine.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Expiry {
    Nothing,
    Resend,
}

/// The last flight we sent, and the timer that resends it.
#[derive(Debug)]
pub(crate) struct Flight {
    number: u8,
    records: Vec<Entry>,
    backoff: ExponentialBackoff,
    timeout: Timeout,
}

impl Flight {
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Flight {
            number: 0,
            records: Vec::new(),
            backoff,
            timeout: Timeout::Disabled,
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    /// Start a new flight, dropping the records of the previous one.
    ///
    /// Returns the previous flight's buffers for reuse.
    pub fn begin(&mut self, number: u8, rng: &mut SeededRng) -> Vec<Buf> {
        debug!("Begin flight {}", number);
        self.number = number;
        self.backoff.reset(rng);
        self.timeout = Timeout::Unarmed;
        self.records.drain(..).map(|e| e.fragment).collect()
    }

    pub fn save(&mut self, entry: Entry) {
        self.records.push(entry);
    }

    pub fn records(&self) -> &[Entry] {
        &self.records
    }

    pub fn take_records(&mut self) -> Vec<Entry> {
        std::mem::take(&mut self.records)
    }

    pub fn restore_records(&mut self, records: Vec<Entry>) {
        self.records = records;
    }

    /// Stop retransmitting on timer. The records are kept so that a
    /// duplicate of the peer's previous flight can still trigger a resend.
    pub fn stop_timer(&mut self) {
        if self.timeout != Timeout::Disabled {
            debug!("Stop flight {} timer", self.number);
        }
        self.timeout = Timeout::Disabled;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.timeout.deadline()
    }

    /// Arm a timer started by [`Flight::begin`] without waiting for `handle_timeout`.
    pub fn arm(&mut self, now: Instant) {
        self.timeout.arm_if_unarmed(now, self.backoff.rto());
    }

    pub fn handle_timeout(&mut self, now: Instant, rng: &mut SeededRng) -> Result<Expiry, Error> {
        self.arm(now);

        if !self.timeout.is_expired(now) {
            return Ok(Expiry::Nothing);
        }

        if !self.backoff.can_retry() {
            warn!(
                "Flight {} unanswered after {} retransmissions",
                self.number,
                self.backoff.attempts()
            );
            self.timeout = Timeout::Disabled;
            return Err(Error::RetryExhausted);
        }

        self.backoff.attempt(rng);
        let rto = self.backoff.rto();
        debug!(
            "Flight {} timeout, resend attempt {} next in {:.03}s",
            self.number,
            self.backoff.attempts(),
            rto.as_secs_f32()
        );
        self.timeout = Timeout::Armed(now + rto);

        Ok(Expiry::Resend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight(retries: usize) -> (Flight, SeededRng) {
        let mut rng = SeededRng::new(Some(5));
        let backoff =
            ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60), retries, &mut rng);
        (Flight::new(backoff), rng)
    }

    #[test]
    fn exhausts_after_retries() {
        let (mut f, mut rng) = flight(2);
        let mut now = Instant::now();
        f.begin(1, &mut rng);

        // Arms the timer
        assert_eq!(f.handle_timeout(now, &mut rng), Ok(Expiry::Nothing));

        for _ in 0..2 {
            now = f.deadline().unwrap();
            assert_eq!(f.handle_timeout(now, &mut rng), Ok(Expiry::Resend));
        }

        now = f.deadline().unwrap();
        assert_eq!(f.handle_timeout(now, &mut rng), Err(Error::RetryExhausted));
        assert_eq!(f.deadline(), None);
    }

    #[test]
    fn stopped_timer_is_inert() {
        let (mut f, mut rng) = flight(2);
        let now = Instant::now();
        f.begin(1, &mut rng);
        f.handle_timeout(now, &mut rng).unwrap();
        let deadline = f.deadline().unwrap();

        f.stop_timer();
        assert_eq!(f.deadline(), None);
        assert_eq!(
            f.handle_timeout(deadline + Duration::from_secs(100), &mut rng),
            Ok(Expiry::Nothing)
        );
    }

    #[test]
    fn begin_recycles_records() {
        let (mut f, mut rng) = flight(2);
        f.begin(1, &mut rng);
        f.save(Entry {
            content_type: ContentType::Handshake,
            epoch: 0,
            fragment: Buf::from_slice(&[1, 2, 3]),
        });
        assert_eq!(f.records().len(), 1);

        let freed = f.begin(3, &mut rng);
        assert_eq!(freed.len(), 1);
        assert!(f.records().is_empty());
        assert_eq!(f.number(), 3);
    }
}
