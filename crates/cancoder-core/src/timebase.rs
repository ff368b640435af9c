use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Whole microseconds in `d`, saturating at `u64::MAX`.
pub fn duration_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Monotonic time source the scheduler and device proxy block against.
pub trait Clock {
    /// Monotonic microseconds since the clock's epoch.
    fn now_us(&self) -> u64;

    /// Block until `now_us() >= deadline_us`. Returns immediately if the
    /// deadline has already passed.
    fn sleep_until_us(&self, deadline_us: u64);

    fn elapsed_since(&self, start_us: u64) -> u64 {
        self.now_us().saturating_sub(start_us)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Wall-clock microseconds since Unix epoch (for cross-process logs only).
    pub fn unix_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TimeBase {
    fn now_us(&self) -> u64 {
        duration_us(self.start.elapsed())
    }

    fn sleep_until_us(&self, deadline_us: u64) {
        let now = self.now_us();
        if deadline_us > now {
            std::thread::sleep(Duration::from_micros(deadline_us - now));
        }
    }
}

/// Manually driven clock. Clones share the same time, so a test can hold one
/// handle while the scheduler and device proxy hold others.
///
/// Sleeping jumps time forward to the deadline instead of blocking.
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_us: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(start_us: u64) -> Self {
        Self {
            now_us: Arc::new(AtomicU64::new(start_us)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.advance_us(duration_us(by));
    }

    pub fn advance_us(&self, by_us: u64) {
        self.now_us.fetch_add(by_us, Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }

    fn sleep_until_us(&self, deadline_us: u64) {
        self.now_us.fetch_max(deadline_us, Ordering::SeqCst);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }

    fn sleep_until_us(&self, deadline_us: u64) {
        (**self).sleep_until_us(deadline_us)
    }
}
