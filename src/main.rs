mod shared;
mod error;
mod grid;
mod tracker;
mod scheduler;
mod audio_api;
mod audio;
mod mixer;
mod controller;
mod loader;
mod pipeline;
mod tui;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use crossterm::terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use controller::{ControllerConfig, PlaybackController, PlaybackState};
use error::ControllerError;
use grid::{GridMap, TrackId};
use loader::sample_loader::TrackSources;
use mixer::MixerChannels;
use pipeline::persistence;
use pipeline::settings::Settings;
use shared::InputEvent;

const FRAME_INTERVAL: Duration = Duration::from_millis(16); // ~60fps redraw
const EDIT_SAMPLE_RATE: u32 = 44_100; // headless edits decode but never render

struct Args {
    track_dir: PathBuf,
    verbose: bool,
    bpm: Option<f64>,
    set_offset: Option<f64>,
    bridges: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args { track_dir: PathBuf::new(), verbose: false, bpm: None, set_offset: None, bridges: None };
    let mut dir = None;
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-v" | "--verbose" => args.verbose = true,
            "--bpm" => args.bpm = Some(number_arg(&mut it, "--bpm")?),
            "--set-offset" => args.set_offset = Some(number_arg(&mut it, "--set-offset")?),
            "--bridges" => args.bridges = Some(it.next().context("--bridges needs a JSON array")?),
            _ => dir = Some(PathBuf::from(arg)),
        }
    }
    args.track_dir = match dir {
        Some(d) => d,
        None => std::env::current_dir()?,
    };
    Ok(args)
}

fn number_arg(it: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<f64> {
    let raw = it.next().with_context(|| format!("{flag} needs a value"))?;
    raw.parse().with_context(|| format!("{flag}: {raw:?} is not a number"))
}

fn init_logging(track_dir: &Path, verbose: bool) {
    use simplelog::*;

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let log_path = persistence::log_file_path(track_dir);
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    // stdout belongs to the tui; without a log file we just run quiet
    let Ok(log_file) = File::create(&log_path) else { return };
    let _ = WriteLogger::init(log_level, Config::default(), log_file);

    log::info!("dancecount starting (log level: {:?})", log_level);
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = parse_args()?;
    init_logging(&args.track_dir, args.verbose);

    let map = match persistence::load_grid_map(&args.track_dir)? {
        Some(map) => map,
        None => match args.bpm {
            Some(bpm) => GridMap::unanalyzed(bpm, 0.0),
            None => bail!(
                "no {} (run the analysis first, or pass --bpm to count without it)",
                persistence::analysis_file_path(&args.track_dir).display()
            ),
        },
    };

    let sources = loader::sample_loader::index_track_dir(&args.track_dir)?;
    if sources.is_empty() {
        bail!("no wav files in {}", args.track_dir.display());
    }
    let track = TrackId(
        args.track_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.track_dir.display().to_string()),
    );

    if args.set_offset.is_some() || args.bridges.is_some() {
        return edit_grid_map(&args, track, map, &sources);
    }

    let settings = persistence::load_settings(&args.track_dir);

    terminal::enable_raw_mode()?;
    // Enable keyboard enhancement for real press/release detection.
    // Falls back gracefully if the terminal doesn't support it.
    let _ = crossterm::execute!(
        std::io::stdout(),
        crossterm::event::PushKeyboardEnhancementFlags(
            crossterm::event::KeyboardEnhancementFlags::REPORT_EVENT_TYPES
        )
    );
    let _guard = RawModeGuard; // auto drops when out of scope

    let audio = audio::start_audio()?;
    let mixer = MixerChannels::new(audio, &settings.volumes);
    let config: ControllerConfig = settings.controller_config();
    let mut controller = PlaybackController::new(mixer, config);
    let snapshots = controller.subscribe();
    let mut notice = String::new();

    if let Some(voice_dir) = &settings.voice_dir {
        match loader::sample_loader::load_counts(voice_dir, controller.sample_rate()) {
            Ok(samples) => controller.load_counts(samples),
            Err(e) => {
                log::warn!("{e:#}");
                notice = format!("no spoken counts: {e}");
            }
        }
    }

    // decode off the ui thread; the controller sits in Loading until the
    // worker hands the layers back
    let token = controller.begin_load(track, map);
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let sample_rate = controller.sample_rate();
    std::thread::spawn(move || {
        let decoded = mixer::decode_sources(&sources, sample_rate);
        let _ = done_tx.send((token, decoded));
    });

    let backend = CrosstermBackend::new(std::io::stdout());
    let mut term = Terminal::new(backend)?;
    term.clear()?;

    let mut tui_state = tui::mode::TuiState { seek_step: settings.seek_step_secs, ..Default::default() };
    let mut latest: PlaybackState = controller.state().clone();
    let poll_timeout = config.tick_interval.min(FRAME_INTERVAL);

    loop {
        if let Ok((token, decoded)) = done_rx.try_recv() {
            match controller.complete_load(token, decoded) {
                Ok(report) if !report.failed.is_empty() => {
                    let failed: Vec<&str> = report.failed.iter().map(|(l, _)| l.label()).collect();
                    notice = format!("could not load: {}", failed.join(", "));
                }
                Ok(_) | Err(ControllerError::StaleLoad) => {}
                Err(e) => notice = e.to_string(),
            }
        }

        controller.tick(Instant::now());
        if let Some(state) = snapshots.try_iter().last() {
            latest = state;
        }

        let ds = tui::mode::display_state(&latest, &tui_state, &notice);
        term.draw(|frame| {
            tui::view::render(frame, frame.area(), &ds);
        })?;

        let events = tui::input::poll_input(poll_timeout, &mut tui_state)?;
        for event in events {
            if event == InputEvent::Quit {
                // save before quitting
                if let Err(e) = persistence::save_settings(&args.track_dir, &updated_settings(&settings, controller.state())) {
                    log::warn!("saving settings: {e:#}");
                }
                drop(term);
                drop(controller);
                return Ok(());
            }
            let now = Instant::now();
            let res = match event {
                InputEvent::PlayPause => controller.toggle_play(now),
                InputEvent::Stop => controller.stop(),
                InputEvent::SeekBy(delta) => controller.seek_by(delta, now),
                InputEvent::StepForward => controller.step_forward(now),
                InputEvent::StepBack => controller.step_back(now),
                InputEvent::CycleVoiceFilter => {
                    let next = controller.state().voice_filter.next();
                    controller.set_voice_filter(next);
                    Ok(())
                }
                InputEvent::AdjustVolume(layer, delta) => {
                    controller.adjust_volume(layer, delta);
                    Ok(())
                }
                InputEvent::ToggleLayer(layer) => {
                    controller.toggle_layer(layer);
                    Ok(())
                }
                InputEvent::Quit => Ok(()),
            };
            match res {
                Ok(()) => notice.clear(),
                Err(e) => {
                    log::debug!("{event:?}: {e}");
                    notice = e.to_string();
                }
            }
        }
    }
}

// what the session changed, folded back into the file we started from
fn updated_settings(base: &Settings, state: &PlaybackState) -> Settings {
    let mut s = base.clone();
    s.voice_filter = state.voice_filter;
    for (layer, ls) in &state.layers {
        s.volumes.insert(*layer, ls.volume);
    }
    s
}

// headless admin path: load the track on a silent engine, apply the edits
// through the controller so the grid is rebuilt and checked, then save
// analysis.json and exit
fn edit_grid_map(args: &Args, track: TrackId, map: GridMap, sources: &TrackSources) -> anyhow::Result<()> {
    let (audio, _engine) = audio::offline(EDIT_SAMPLE_RATE);
    let mixer = MixerChannels::new(audio, &Default::default());
    let mut controller = PlaybackController::new(mixer, ControllerConfig::default());
    controller.load_track(track, map, sources)?;

    if let Some(offset) = args.set_offset {
        controller.set_offset(offset)?;
    }
    if let Some(raw) = &args.bridges {
        let payload: serde_json::Value = serde_json::from_str(raw).context("--bridges is not valid JSON")?;
        controller.replace_bridges(&payload)?;
    }
    let map = controller.grid_map().context("no grid after load")?;
    persistence::save_grid_map(&args.track_dir, map)?;
    println!(
        "offset {:.3}s, {} downbeats, {} bridges, {:.2}s",
        map.offset,
        map.downbeats().len(),
        map.bridges().len(),
        controller.state().duration
    );
    Ok(())
}

struct RawModeGuard;
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(
            std::io::stdout(),
            crossterm::event::PopKeyboardEnhancementFlags
        );
        let _ = terminal::disable_raw_mode();
    }
}
