use std::time::{Duration, Instant};

// The periodic beat-evaluation task. Owning one means the task is running;
// dropping it cancels it, so there is no handle bookkeeping to forget.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    next: Instant,
}

impl Ticker {
    pub fn start(now: Instant, interval: Duration) -> Self {
        Self { interval, next: now }
    }

    /// Whether a tick is due at `now`. Missed ticks are not replayed; the
    /// schedule just restarts from `now`.
    pub fn due(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next += self.interval;
        if self.next <= now {
            self.next = now + self.interval;
        }
        true
    }
}
