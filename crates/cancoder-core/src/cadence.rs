use crate::timebase::duration_us;
use std::time::Duration;

/// Fixed-rate trigger driven by a watermark.
///
/// The watermark only ever moves by whole periods, so late polls do not push
/// later reports back and the count of fires tracks elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCadence {
    last_us: u64,
    period_us: u64,
}

impl ReportCadence {
    pub fn new(start_us: u64, period: Duration) -> Self {
        Self {
            last_us: start_us,
            period_us: duration_us(period).max(1),
        }
    }

    /// Fires at most once per call.
    pub fn poll(&mut self, now_us: u64) -> bool {
        if now_us.saturating_sub(self.last_us) > self.period_us {
            self.last_us += self.period_us;
            true
        } else {
            false
        }
    }

    pub fn last_us(&self) -> u64 {
        self.last_us
    }

    pub fn period_us(&self) -> u64 {
        self.period_us
    }
}
