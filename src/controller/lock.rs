use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockSource {
    Mixer,
    // a user seek is in flight; the mixer's clock may still report the old position
    Suppressed { until: Instant },
}

/// Keeps the tick from overwriting an optimistic seek position with the
/// mixer's clock until the mixer has had time to actually get there.
#[derive(Clone, Debug)]
pub struct InteractionLock {
    cooldown: Duration,
    source: ClockSource,
}

impl InteractionLock {
    pub fn new(cooldown: Duration) -> Self {
        Self { cooldown, source: ClockSource::Mixer }
    }

    pub fn engage(&mut self, now: Instant) {
        self.source = ClockSource::Suppressed { until: now + self.cooldown };
    }

    pub fn release(&mut self) {
        self.source = ClockSource::Mixer;
    }

    /// True when the tick may take the mixer's time. Drops back to `Mixer`
    /// once the cooldown has run out.
    pub fn accepts_mixer(&mut self, now: Instant) -> bool {
        match self.source {
            ClockSource::Mixer => true,
            ClockSource::Suppressed { until } if now >= until => {
                self.source = ClockSource::Mixer;
                log::debug!(target: "controller", "seek cooldown over, following mixer clock");
                true
            }
            ClockSource::Suppressed { .. } => false,
        }
    }
}
