// Called on startup and quit. Settings live under <track_dir>/.dancecount/,
// the analysis GridMap sits at <track_dir>/analysis.json where the analysis
// step writes it.
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::grid::GridMap;
use crate::pipeline::settings::Settings;

const APP_DIR: &str = ".dancecount";
const SETTINGS_FILE: &str = "settings.json";
const ANALYSIS_FILE: &str = "analysis.json";
const LOG_FILE: &str = "dancecount.log";

pub fn app_dir(track_dir: &Path) -> PathBuf {
    track_dir.join(APP_DIR)
}

pub fn log_file_path(track_dir: &Path) -> PathBuf {
    app_dir(track_dir).join(LOG_FILE)
}

fn settings_file_path(track_dir: &Path) -> PathBuf {
    app_dir(track_dir).join(SETTINGS_FILE)
}

pub fn analysis_file_path(track_dir: &Path) -> PathBuf {
    track_dir.join(ANALYSIS_FILE)
}

// Missing or unreadable settings are not worth refusing to start over.
pub fn load_settings(track_dir: &Path) -> Settings {
    let path = settings_file_path(track_dir);
    let Ok(data) = std::fs::read_to_string(&path) else {
        return Settings::default();
    };
    match serde_json::from_str::<Settings>(&data) {
        Ok(s) => s.sanitized(),
        Err(e) => {
            log::warn!("ignoring {}: {e}", path.display());
            Settings::default()
        }
    }
}

// Save the settings, making .dancecount/ if it doesn't exist already
pub fn save_settings(track_dir: &Path, settings: &Settings) -> anyhow::Result<()> {
    let path = settings_file_path(track_dir);
    write_json(&path, settings)
}

/// `Ok(None)` when the track has not been analyzed at all; an error when the
/// file is there but unusable.
pub fn load_grid_map(track_dir: &Path) -> anyhow::Result<Option<GridMap>> {
    let path = analysis_file_path(track_dir);
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    let map = serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(map))
}

pub fn save_grid_map(track_dir: &Path, map: &GridMap) -> anyhow::Result<()> {
    write_json(&analysis_file_path(track_dir), map)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
