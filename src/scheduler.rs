use crate::shared::VoiceFilter;
use crate::tracker::CurrentBeatInfo;

/// Whether the count layer should speak this beat. Bridges (and anything
/// else the grid marked ineligible) are always silent, whatever the filter says.
pub fn should_announce(beat: &CurrentBeatInfo, policy: VoiceFilter) -> bool {
    if beat.is_bridge || !beat.has_voice {
        return false;
    }
    match policy {
        VoiceFilter::Mute => false,
        VoiceFilter::On1 => beat.number == 1,
        VoiceFilter::On1And5 => matches!(beat.number, 1 | 5),
        VoiceFilter::Full => true,
    }
}

/// A spoken count to start on the voice layer, aligned to the beat onset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CountCue {
    pub number: u8,
    pub at_time: f64,
}

// Announces each beat at most once, in order. The tracker reports the same
// beat for many ticks in a row and the controller also offers the upcoming
// beat ahead of time, so anything at or before the last announced index is
// ignored until a seek resets it.
#[derive(Clone, Debug, Default)]
pub struct VoiceScheduler {
    last_announced: Option<usize>,
}

impl VoiceScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.last_announced = None;
    }

    // treat everything up to `index` as already spoken (landing mid-beat after a seek)
    pub fn settle(&mut self, index: usize) {
        self.last_announced = Some(index);
    }

    // let a beat go by unspoken; never moves the cursor backward
    pub fn skip(&mut self, index: usize) {
        if self.last_announced.is_none_or(|last| index > last) {
            self.last_announced = Some(index);
        }
    }

    pub fn on_beat(&mut self, beat: &CurrentBeatInfo, policy: VoiceFilter) -> Option<CountCue> {
        if self.last_announced.is_some_and(|last| beat.index <= last) {
            return None;
        }
        self.last_announced = Some(beat.index);
        should_announce(beat, policy).then_some(CountCue { number: beat.number, at_time: beat.time })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICIES: [VoiceFilter; 4] =
        [VoiceFilter::Mute, VoiceFilter::On1, VoiceFilter::On1And5, VoiceFilter::Full];

    fn beat(index: usize, number: u8, is_bridge: bool) -> CurrentBeatInfo {
        CurrentBeatInfo { index, time: index as f64 * 0.5, number, is_bridge, has_voice: !is_bridge }
    }

    fn announced(policy: VoiceFilter) -> Vec<u8> {
        (1..=8).filter(|n| should_announce(&beat(0, *n, false), policy)).collect()
    }

    #[test]
    fn policies_select_numbers() {
        assert_eq!(announced(VoiceFilter::Mute), Vec::<u8>::new());
        assert_eq!(announced(VoiceFilter::On1), vec![1]);
        assert_eq!(announced(VoiceFilter::On1And5), vec![1, 5]);
        assert_eq!(announced(VoiceFilter::Full), (1..=8).collect::<Vec<u8>>());
    }

    #[test]
    fn bridge_beats_are_never_announced() {
        for policy in POLICIES {
            for n in 1..=8 {
                assert!(!should_announce(&beat(0, n, true), policy), "{policy:?} {n}");
            }
        }
    }

    #[test]
    fn scenario_on1and5_first_four_beats() {
        let hits: Vec<u8> = (1..=4)
            .filter(|n| should_announce(&beat(0, *n, false), VoiceFilter::On1And5))
            .collect();
        assert_eq!(hits, vec![1]);
    }

    #[test]
    fn scheduler_announces_each_beat_once() {
        let mut s = VoiceScheduler::new();
        let b = beat(3, 4, false);
        assert_eq!(s.on_beat(&b, VoiceFilter::Full), Some(CountCue { number: 4, at_time: 1.5 }));
        assert_eq!(s.on_beat(&b, VoiceFilter::Full), None);
        assert!(s.on_beat(&beat(4, 5, false), VoiceFilter::Full).is_some());
        // an earlier beat offered late stays quiet
        assert_eq!(s.on_beat(&beat(3, 4, false), VoiceFilter::Full), None);

        s.reset();
        assert!(s.on_beat(&beat(4, 5, false), VoiceFilter::Full).is_some());
    }

    #[test]
    fn filtered_beats_still_advance_the_cursor() {
        let mut s = VoiceScheduler::new();
        assert_eq!(s.on_beat(&beat(1, 2, false), VoiceFilter::On1), None);
        assert_eq!(s.on_beat(&beat(1, 2, false), VoiceFilter::Full), None);
    }

    #[test]
    fn skip_only_moves_forward() {
        let mut s = VoiceScheduler::new();
        s.skip(3);
        assert_eq!(s.on_beat(&beat(3, 4, false), VoiceFilter::Full), None);
        assert!(s.on_beat(&beat(5, 6, false), VoiceFilter::Full).is_some());
        s.skip(4);
        assert_eq!(s.on_beat(&beat(5, 6, false), VoiceFilter::Full), None);
        assert!(s.on_beat(&beat(6, 7, false), VoiceFilter::Full).is_some());
    }

    #[test]
    fn settle_skips_the_landing_beat() {
        let mut s = VoiceScheduler::new();
        s.settle(7);
        assert_eq!(s.on_beat(&beat(7, 8, false), VoiceFilter::Full), None);
        assert!(s.on_beat(&beat(8, 1, false), VoiceFilter::Full).is_some());
    }
}
