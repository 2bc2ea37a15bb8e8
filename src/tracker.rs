// Maps playback time onto the beat grid. Polled on every tick, so it keeps a
// cursor that walks forward with the clock and only falls back to a binary
// search when time jumps backward (seek) or too far ahead.

use crate::grid::{Beat, BeatGrid};

const MAX_LINEAR_WALK: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurrentBeatInfo {
    pub index: usize,
    pub time: f64,
    pub number: u8,
    pub is_bridge: bool,
    pub has_voice: bool,
}

impl CurrentBeatInfo {
    fn from_beat(index: usize, beat: &Beat) -> Self {
        Self { index, time: beat.time, number: beat.number, is_bridge: beat.is_bridge, has_voice: beat.has_voice }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LiveBeatTracker {
    cursor: usize,
    last_time: f64,
    grid_version: Option<u64>,
}

impl LiveBeatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the cursor; the next query does a full search.
    pub fn reset(&mut self) {
        self.grid_version = None;
        self.cursor = 0;
        self.last_time = 0.0;
    }

    /// Last beat at or before `time`. Before the first beat this is the first
    /// beat itself, at its own timestamp.
    pub fn current(&mut self, grid: &BeatGrid, time: f64) -> Option<CurrentBeatInfo> {
        if grid.is_empty() {
            return None;
        }
        let beats = grid.beats();

        let same_grid = self.grid_version == Some(grid.source_version());
        if same_grid && time >= self.last_time && self.cursor < beats.len() {
            let mut walked = 0;
            while self.cursor + 1 < beats.len() && beats[self.cursor + 1].time <= time {
                self.cursor += 1;
                walked += 1;
                if walked > MAX_LINEAR_WALK {
                    self.cursor = search(beats, time);
                    break;
                }
            }
        } else {
            self.cursor = search(beats, time);
            self.grid_version = Some(grid.source_version());
        }
        self.last_time = time;

        Some(CurrentBeatInfo::from_beat(self.cursor, &beats[self.cursor]))
    }
}

fn search(beats: &[Beat], time: f64) -> usize {
    beats.partition_point(|b| b.time <= time).saturating_sub(1)
}

pub fn step_forward(grid: &BeatGrid, index: usize) -> Option<CurrentBeatInfo> {
    let last = grid.len().checked_sub(1)?;
    let i = (index + 1).min(last);
    grid.get(i).map(|b| CurrentBeatInfo::from_beat(i, b))
}

pub fn step_back(grid: &BeatGrid, index: usize) -> Option<CurrentBeatInfo> {
    let last = grid.len().checked_sub(1)?;
    let i = index.saturating_sub(1).min(last);
    grid.get(i).map(|b| CurrentBeatInfo::from_beat(i, b))
}
