use std::time::Duration;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crate::shared::{ALL_LAYERS, InputEvent};
use super::mode::TuiState;

const VOLUME_STEP: i16 = 5;

// poll for input from the terminal, resolve keys against the tui state into
// input events for the controller side to handle
pub fn poll_input(timeout: Duration, ts: &mut TuiState) -> anyhow::Result<Vec<InputEvent>> {
    if !event::poll(timeout)? {
        return Ok(vec![]);
    }

    if let Event::Key(key) = event::read()? {
        if key.kind != KeyEventKind::Press {
            return Ok(vec![]);
        }
        return Ok(handle_key(key.code, ts));
    }
    Ok(vec![])
}

fn handle_key(code: KeyCode, ts: &mut TuiState) -> Vec<InputEvent> {
    match code {
        KeyCode::Esc | KeyCode::Char('q') => vec![InputEvent::Quit],
        KeyCode::Char(' ') => vec![InputEvent::PlayPause],
        KeyCode::Char('s') => vec![InputEvent::Stop],

        KeyCode::Left => vec![InputEvent::SeekBy(-ts.seek_step)],
        KeyCode::Right => vec![InputEvent::SeekBy(ts.seek_step)],
        KeyCode::Char(',') => vec![InputEvent::StepBack],
        KeyCode::Char('.') => vec![InputEvent::StepForward],

        KeyCode::Char('v') => vec![InputEvent::CycleVoiceFilter],

        // layer select is tui-local, the controller never sees it
        KeyCode::Char(c @ '1'..='6') => {
            let idx = c as usize - '1' as usize;
            ts.selected_layer = ALL_LAYERS[idx];
            vec![]
        }
        KeyCode::Char('[') => vec![InputEvent::AdjustVolume(ts.selected_layer, -VOLUME_STEP)],
        KeyCode::Char(']') => vec![InputEvent::AdjustVolume(ts.selected_layer, VOLUME_STEP)],
        KeyCode::Char('m') => vec![InputEvent::ToggleLayer(ts.selected_layer)],

        _ => vec![],
    }
}
