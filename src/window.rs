/// Sliding anti-replay window for record sequence numbers.
///
/// Anchored at the highest accepted sequence number, with a 64-bit bitmap of
/// the sequence numbers below it. One window covers one epoch; the record
/// layer calls [`ReplayWindow::reset`] when the read epoch changes.
///
/// Checking and marking are separate so that a record is only marked after
/// it authenticated. Otherwise a forged record could burn a sequence number.
#[derive(Debug, Default, Clone)]
pub struct ReplayWindow {
    max_seq: Option<u64>,
    window: u64,
}

const WINDOW_BITS: u64 = 64;

impl ReplayWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether `seqno` has not been seen and is not below the window.
    pub fn check(&self, seqno: u64) -> bool {
        let Some(max_seq) = self.max_seq else {
            return true;
        };

        if seqno > max_seq {
            return true;
        }

        let offset = max_seq - seqno;
        if offset >= WINDOW_BITS {
            return false;
        }

        self.window & (1 << offset) == 0
    }

    /// Mark `seqno` as seen. Must only be called after a successful [`check`].
    ///
    /// [`check`]: ReplayWindow::check
    pub fn update(&mut self, seqno: u64) {
        match self.max_seq {
            Some(max_seq) if seqno <= max_seq => {
                let offset = max_seq - seqno;
                if offset < WINDOW_BITS {
                    self.window |= 1 << offset;
                }
            }
            Some(max_seq) => {
                let delta = seqno - max_seq;
                self.window = if delta >= WINDOW_BITS {
                    0
                } else {
                    self.window << delta
                };
                self.window |= 1;
                self.max_seq = Some(seqno);
            }
            None => {
                self.window = 1;
                self.max_seq = Some(seqno);
            }
        }
    }

    pub fn check_and_update(&mut self, seqno: u64) -> bool {
        if !self.check(seqno) {
            return false;
        }
        self.update(seqno);
        true
    }

    /// Highest accepted sequence number.
    pub fn max_seq(&self) -> Option<u64> {
        self.max_seq
    }
}
