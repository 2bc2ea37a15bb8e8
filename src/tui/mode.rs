use crate::controller::{PlaybackState, PlayerState};
use crate::shared::{ALL_LAYERS, DisplayState, Layer, LayerDisplay};

// state local to the tui: which layer the volume keys act on and how far a
// coarse seek jumps. Nothing here is playback state.
#[derive(Clone, Debug)]
pub struct TuiState {
    pub selected_layer: Layer,
    pub seek_step: f64,
}

impl Default for TuiState {
    fn default() -> Self {
        Self { selected_layer: Layer::Original, seek_step: 5.0 }
    }
}

fn status_label(player: PlayerState, seeking: bool) -> &'static str {
    if seeking {
        return "SEEK";
    }
    match player {
        PlayerState::Idle => "IDLE",
        PlayerState::Loading => "LOADING",
        PlayerState::Ready => "READY",
        PlayerState::Playing => "PLAY",
        PlayerState::Paused => "PAUSE",
        PlayerState::Stopped => "STOP",
    }
}

// flatten the latest published snapshot into what the view draws
pub fn display_state(state: &PlaybackState, ts: &TuiState, notice: &str) -> DisplayState {
    let layers = ALL_LAYERS
        .iter()
        .map(|l| {
            let s = state.layers.get(l);
            LayerDisplay {
                layer: *l,
                loaded: s.is_some_and(|s| s.loaded),
                enabled: s.is_some_and(|s| s.enabled),
                volume: s.map_or(0, |s| s.volume),
            }
        })
        .collect();

    let message = match &state.error {
        Some(e) => e.clone(),
        None => notice.to_string(),
    };

    DisplayState {
        track: state.track.as_ref().map(|t| t.to_string()).unwrap_or_default(),
        status: status_label(state.player, state.seeking),
        current_time: state.current_time,
        duration: state.duration,
        beat_number: state.current_beat.map(|b| b.number),
        is_bridge: state.current_beat.is_some_and(|b| b.is_bridge),
        voice_filter: state.voice_filter,
        selected_layer: ts.selected_layer,
        layers,
        message,
    }
}
