// User-tunable knobs, saved next to the track so a practice session comes
// back the way it was left.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::ControllerConfig;
use crate::grid::GridConfig;
use crate::shared::{ALL_LAYERS, Layer, MAX_VOLUME, VoiceFilter};

const DEFAULT_VOICE_VOLUME: u8 = 80;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub voice_filter: VoiceFilter,
    pub bridge_window_beats: f64,
    pub tick_interval_ms: u64,
    pub seek_cooldown_ms: u64,
    pub volumes: BTreeMap<Layer, u8>,
    pub voice_dir: Option<PathBuf>,
    pub seek_step_secs: f64,
}

impl Default for Settings {
    fn default() -> Self {
        let volumes = ALL_LAYERS
            .iter()
            .map(|l| (*l, if *l == Layer::Voice { DEFAULT_VOICE_VOLUME } else { MAX_VOLUME }))
            .collect();
        Self {
            voice_filter: VoiceFilter::Full,
            bridge_window_beats: GridConfig::default().bridge_window_beats,
            tick_interval_ms: 25,
            seek_cooldown_ms: 300,
            volumes,
            voice_dir: None,
            seek_step_secs: 5.0,
        }
    }
}

impl Settings {
    // Hand-edited files can hold anything; pull values back into range
    // instead of refusing the whole file.
    pub fn sanitized(mut self) -> Self {
        let defaults = Settings::default();
        if !(self.bridge_window_beats.is_finite() && self.bridge_window_beats >= 0.0) {
            self.bridge_window_beats = defaults.bridge_window_beats;
        }
        self.tick_interval_ms = self.tick_interval_ms.clamp(1, 1000);
        if !(self.seek_step_secs.is_finite() && self.seek_step_secs > 0.0) {
            self.seek_step_secs = defaults.seek_step_secs;
        }
        for v in self.volumes.values_mut() {
            *v = (*v).min(MAX_VOLUME);
        }
        for (layer, v) in defaults.volumes {
            self.volumes.entry(layer).or_insert(v);
        }
        self
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            grid: GridConfig { bridge_window_beats: self.bridge_window_beats },
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            seek_cooldown: Duration::from_millis(self.seek_cooldown_ms),
            voice_filter: self.voice_filter,
        }
    }
}
