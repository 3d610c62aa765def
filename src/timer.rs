use std::time::Duration;

use crate::rng::SeededRng;

// In seconds.
const JITTER_RANGE: f32 = 0.5;

const MIN_RTO: Duration = Duration::from_millis(50);

/// Retransmission timeout for one flight.
///
/// Starts at `start_rto`, doubles per attempt up to `max_rto`, and carries a
/// jitter of ±0.25s that is redrawn on every attempt.
#[derive(Debug)]
pub struct ExponentialBackoff {
    start_rto: Duration,
    max_rto: Duration,
    retries: usize,
    rto: Duration,
    jitter: f32,
    left: usize,
}

impl ExponentialBackoff {
    pub fn new(
        start_rto: Duration,
        max_rto: Duration,
        retries: usize,
        rng: &mut SeededRng,
    ) -> Self {
        ExponentialBackoff {
            start_rto,
            max_rto,
            retries,
            rto: start_rto,
            jitter: Self::jitter(rng),
            left: retries,
        }
    }

    pub fn reset(&mut self, rng: &mut SeededRng) {
        self.rto = self.start_rto;
        self.jitter = Self::jitter(rng);
        self.left = self.retries;
    }

    pub fn rto(&self) -> Duration {
        if self.jitter < 0.0 {
            self.rto
                .saturating_sub(Duration::from_secs_f32(self.jitter.abs()))
        } else {
            self.rto + Duration::from_secs_f32(self.jitter)
        }
        .max(MIN_RTO)
    }

    fn jitter(rng: &mut SeededRng) -> f32 {
        rng.gen::<f32>() * JITTER_RANGE - (JITTER_RANGE / 2.0)
    }

    /// Account for one retransmission.
    pub fn attempt(&mut self, rng: &mut SeededRng) {
        let Some(left) = self.left.checked_sub(1) else {
            return;
        };

        self.left = left;
        self.jitter = Self::jitter(rng);
        self.rto = (self.rto * 2).min(self.max_rto);
    }

    pub fn can_retry(&self) -> bool {
        self.left > 0
    }

    pub fn attempts(&self) -> usize {
        self.retries - self.left
    }
}
