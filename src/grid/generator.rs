// Expands a sparse GridMap into the dense, numbered beat grid.
//
// Two paths:
//   - measured: consecutive downbeats bound one measure each, and every
//     measure is split into the same number of beats by interpolation, so
//     local tempo drift is kept. The grid is extrapolated backward to 0 and
//     forward to the end of the track with the first/last measure's spacing.
//   - linear: no usable downbeats, beats every 60/bpm from the offset.
//
// Numbering is a plain 1..8 cycle anchored so that downbeats[0] is a "1".
// Bridges only flag beats; they never touch the numbering.

use crate::error::GridError;
use crate::shared::{BEATS_PER_PHRASE, count_at};

use super::{Analysis, GridMap};

/// Tunables that are not part of the analysis data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridConfig {
    /// How long a bridge lasts after its start timestamp, in beats at the
    /// track's nominal bpm.
    pub bridge_window_beats: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { bridge_window_beats: 4.0 }
    }
}

impl GridConfig {
    pub fn bridge_window_secs(&self, bpm: f64) -> f64 {
        if !self.bridge_window_beats.is_finite() || self.bridge_window_beats <= 0.0 {
            return 0.0;
        }
        self.bridge_window_beats * 60.0 / bpm
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Beat {
    pub time: f64,
    pub number: u8, // 1..=8
    pub is_bridge: bool,
    // eligible for a spoken count; the voice filter makes the final call
    pub has_voice: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BeatGrid {
    beats: Vec<Beat>,
    source_version: u64,
}

impl BeatGrid {
    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Beat> {
        self.beats.get(index)
    }

    /// Version of the GridMap this grid was built from.
    pub fn source_version(&self) -> u64 {
        self.source_version
    }
}

pub fn generate(map: &GridMap, track_duration: f64, config: &GridConfig) -> Result<BeatGrid, GridError> {
    if !map.bpm.is_finite() || map.bpm <= 0.0 {
        return Err(GridError::InvalidBpm(map.bpm));
    }
    if !track_duration.is_finite() || track_duration <= 0.0 {
        return Err(GridError::InvalidDuration(track_duration));
    }

    let downbeats = match &map.analysis {
        Analysis::Analyzed { downbeats, .. } if usable_downbeats(downbeats) => Some(downbeats.as_slice()),
        _ => None,
    };

    let mut beats = match downbeats {
        Some(d) => measured_grid(d, map.bpm, track_duration),
        None => linear_grid(map.bpm, map.offset, track_duration),
    };
    mark_bridges(&mut beats, map.bridges(), config.bridge_window_secs(map.bpm));

    log::debug!(
        target: "grid",
        "generated {} beats ({}, {} bridges) for map v{}",
        beats.len(),
        if downbeats.is_some() { "measured" } else { "linear" },
        map.bridges().len(),
        map.version(),
    );

    Ok(BeatGrid { beats, source_version: map.version() })
}

fn usable_downbeats(d: &[f64]) -> bool {
    d.len() >= 2
        && d.iter().all(|t| t.is_finite() && *t >= 0.0)
        && d.windows(2).all(|w| w[0] < w[1])
}

fn beat(time: f64, index: i64) -> Beat {
    Beat { time, number: count_at(index), is_bridge: false, has_voice: true }
}

fn linear_grid(bpm: f64, offset: f64, duration: f64) -> Vec<Beat> {
    let period = 60.0 / bpm;
    let mut out = Vec::new();
    let mut k: i64 = 0;
    loop {
        // multiply, don't accumulate, so long tracks don't drift
        let t = offset + k as f64 * period;
        if t >= duration {
            break;
        }
        out.push(beat(t, k));
        k += 1;
    }
    out
}

// Beats per measure, fixed for the whole grid: the median downbeat spacing
// measured in nominal beats, rounded and clamped to a phrase.
fn beats_per_measure(d: &[f64], bpm: f64) -> usize {
    let mut gaps: Vec<f64> = d.windows(2).map(|w| w[1] - w[0]).collect();
    gaps.sort_by(f64::total_cmp);
    let median = gaps[gaps.len() / 2];
    let ratio = median / (60.0 / bpm);
    (ratio.round() as usize).clamp(1, BEATS_PER_PHRASE as usize)
}

fn measured_grid(d: &[f64], bpm: f64, duration: f64) -> Vec<Beat> {
    let per_measure = beats_per_measure(d, bpm);
    let n = d.len();
    let mut out = Vec::new();

    // backward from the first downbeat, down to 0
    let first_step = (d[1] - d[0]) / per_measure as f64;
    let mut lead_in = Vec::new();
    let mut j: i64 = 1;
    loop {
        let t = d[0] - j as f64 * first_step;
        if t < 0.0 {
            break;
        }
        if t < duration {
            lead_in.push(beat(t, -j));
        }
        j += 1;
    }
    out.extend(lead_in.into_iter().rev());

    // interpolated measures
    for i in 0..n - 1 {
        let span = d[i + 1] - d[i];
        for s in 0..per_measure {
            let t = d[i] + span * (s as f64 / per_measure as f64);
            if t >= duration {
                return out;
            }
            out.push(beat(t, (i * per_measure + s) as i64));
        }
    }

    // last downbeat and everything after it
    let last_index = ((n - 1) * per_measure) as i64;
    let last_step = (d[n - 1] - d[n - 2]) / per_measure as f64;
    let mut j: i64 = 0;
    loop {
        let t = d[n - 1] + j as f64 * last_step;
        if t >= duration {
            break;
        }
        out.push(beat(t, last_index + j));
        j += 1;
    }
    out
}

// bridges are sorted and share one window length, so the latest bridge
// starting at or before a beat is the only one that can cover it
fn mark_bridges(beats: &mut [Beat], bridges: &[f64], window: f64) {
    if bridges.is_empty() || window <= 0.0 {
        return;
    }
    for b in beats.iter_mut() {
        let idx = bridges.partition_point(|start| *start <= b.time);
        if idx > 0 && b.time < bridges[idx - 1] + window {
            b.is_bridge = true;
            b.has_voice = false;
        }
    }
}
