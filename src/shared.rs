// Keys (see tui/input.rs for the full map):
//   Space         //  PlayPause
//   s             //  Stop
//   Left / Right  //  SeekBy(-step / +step)
//   , / .         //  StepBack / StepForward (one beat)
//   v             //  CycleVoiceFilter
//   1 .. 6        //  select layer (original, vocals, drums, bass, other, voice)
//   [ / ]         //  AdjustVolume(selected, -5 / +5)
//   m             //  ToggleLayer(selected)
//   Esc / q       //  Quit
//
// The controller owns every piece of playback state; the TUI only turns
// keys into InputEvents and draws whatever DisplayState it is handed.

use serde::{Deserialize, Serialize};

pub const BEATS_PER_PHRASE: u8 = 8;
pub const MAX_VOLUME: u8 = 100;
pub const STEM_LAYERS: [Layer; 4] = [Layer::Vocals, Layer::Drums, Layer::Bass, Layer::Other];
pub const NUM_LAYERS: usize = 6;
pub const ALL_LAYERS: [Layer; NUM_LAYERS] = [
    Layer::Original,
    Layer::Vocals,
    Layer::Drums,
    Layer::Bass,
    Layer::Other,
    Layer::Voice,
];

// count number for a beat `index` places after (or before, if negative) a "1"
#[inline]
pub fn count_at(index: i64) -> u8 {
    (index.rem_euclid(BEATS_PER_PHRASE as i64) as u8) + 1
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Original,
    Vocals,
    Drums,
    Bass,
    Other,
    Voice,
}

impl Layer {
    pub fn label(self) -> &'static str {
        match self {
            Layer::Original => "original",
            Layer::Vocals => "vocals",
            Layer::Drums => "drums",
            Layer::Bass => "bass",
            Layer::Other => "other",
            Layer::Voice => "voice",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Layer::Original => 0,
            Layer::Vocals => 1,
            Layer::Drums => 2,
            Layer::Bass => 3,
            Layer::Other => 4,
            Layer::Voice => 5,
        }
    }
}

/// Which beat numbers get an audible spoken count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceFilter {
    #[serde(rename = "mute")]
    Mute,
    #[serde(rename = "on1")]
    On1,
    #[serde(rename = "on1and5")]
    On1And5,
    #[default]
    #[serde(rename = "full")]
    Full,
}

impl VoiceFilter {
    pub fn next(self) -> Self {
        match self {
            VoiceFilter::Mute => VoiceFilter::On1,
            VoiceFilter::On1 => VoiceFilter::On1And5,
            VoiceFilter::On1And5 => VoiceFilter::Full,
            VoiceFilter::Full => VoiceFilter::Mute,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VoiceFilter::Mute => "mute",
            VoiceFilter::On1 => "on1",
            VoiceFilter::On1And5 => "on1and5",
            VoiceFilter::Full => "full",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    PlayPause,
    Stop,
    SeekBy(f64), // seconds, signed
    StepForward,
    StepBack,
    CycleVoiceFilter,
    AdjustVolume(Layer, i16),
    ToggleLayer(Layer),
    Quit,
}

#[derive(Clone, Debug)]
pub struct LayerDisplay {
    pub layer: Layer,
    pub loaded: bool,
    pub enabled: bool,
    pub volume: u8,
}

#[derive(Clone, Debug)]
pub struct DisplayState {
    pub track: String,
    pub status: &'static str, // "IDLE", "LOADING", "READY", "PLAY", "PAUSE", "STOP", "SEEK"
    pub current_time: f64,
    pub duration: f64,
    pub beat_number: Option<u8>,
    pub is_bridge: bool,
    pub voice_filter: VoiceFilter,
    pub selected_layer: Layer,
    pub layers: Vec<LayerDisplay>,
    pub message: String, // last error / notice, empty when nothing to say
}
