use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Transport position as last rendered by the audio callback. The engine is
/// the only writer; everyone else reads it lock-free. Relaxed is enough,
/// readers only need the latest value, not ordering with other memory.
#[derive(Debug)]
pub struct TransportClock {
    position: AtomicU64, // frames
    playing: AtomicBool,
    sample_rate: u32,
}

impl TransportClock {
    pub fn new(sample_rate: u32) -> Self {
        Self { position: AtomicU64::new(0), playing: AtomicBool::new(false), sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    pub fn seconds(&self) -> f64 {
        self.position() as f64 / self.sample_rate as f64
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub(super) fn publish(&self, position: u64, playing: bool) {
        self.position.store(position, Ordering::Relaxed);
        self.playing.store(playing, Ordering::Relaxed);
    }

    pub fn frames_for(&self, seconds: f64) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f64).round() as u64
    }
}
