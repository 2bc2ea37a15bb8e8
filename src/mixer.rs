// Control side of the multi-layer player: which layers are loaded, their
// volume and enable state, and the transport commands that go to the engine.
// Layers that fail to decode are reported, disabled and left out; the rest
// still play.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::audio::{AudioHandle, SampleBuffer};
use crate::audio_api::AudioCommand;
use crate::error::MixerError;
use crate::loader::sample_loader::TrackSources;
use crate::shared::{ALL_LAYERS, Layer, MAX_VOLUME, STEM_LAYERS};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerState {
    pub loaded: bool,
    pub enabled: bool,
    pub volume: u8, // 0..=100
    pub length: f64, // seconds, 0 when not loaded
}

/// Result of decoding a track's files, ready to hand to the engine.
/// Produced off the controller so it can run on a worker thread.
#[derive(Debug, Default)]
pub struct DecodedTrack {
    pub layers: Vec<(Layer, Arc<SampleBuffer>)>,
    pub failures: Vec<(Layer, String)>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadReport {
    pub loaded: Vec<Layer>,
    pub failed: Vec<(Layer, String)>,
    pub duration: f64,
}

// Stems win when all four decode; otherwise the original mixdown plays and
// whatever stems did decode are dropped. With no original either, the stems
// that decoded are used as they are.
pub fn decode_sources(sources: &TrackSources, sample_rate: u32) -> DecodedTrack {
    let mut out = DecodedTrack::default();
    let decode = |layer: Layer, path: &std::path::Path, out: &mut DecodedTrack| {
        match SampleBuffer::load_wav(path, sample_rate, layer) {
            Ok(buf) => Some(Arc::new(buf)),
            Err(e) => {
                log::warn!(target: "mixer", "{e}");
                out.failures.push((layer, e.to_string()));
                None
            }
        }
    };

    let stems: Vec<(Layer, Arc<SampleBuffer>)> = sources
        .stems
        .iter()
        .filter_map(|(layer, path)| decode(*layer, path, &mut out).map(|b| (*layer, b)))
        .collect();

    if stems.len() == STEM_LAYERS.len() {
        out.layers = stems;
        return out;
    }

    let original = sources.original.as_deref().and_then(|p| decode(Layer::Original, p, &mut out));
    match original {
        Some(buf) => {
            if !stems.is_empty() {
                log::info!(target: "mixer", "incomplete stem set, playing original only");
            }
            out.layers.push((Layer::Original, buf));
        }
        None => out.layers = stems,
    }
    out
}

pub struct MixerChannels {
    audio: AudioHandle,
    layers: BTreeMap<Layer, LayerState>,
    primary: Option<Layer>,
    duration: f64,
}

impl MixerChannels {
    pub fn new(audio: AudioHandle, volumes: &BTreeMap<Layer, u8>) -> Self {
        let layers = ALL_LAYERS
            .iter()
            .map(|l| {
                let volume = volumes.get(l).copied().unwrap_or(MAX_VOLUME).min(MAX_VOLUME);
                (*l, LayerState { loaded: false, enabled: true, volume, length: 0.0 })
            })
            .collect();
        Self { audio, layers, primary: None, duration: 0.0 }
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate()
    }

    pub fn install(&mut self, decoded: DecodedTrack) -> Result<LoadReport, MixerError> {
        self.audio.send(AudioCommand::UnloadLayers);
        for (layer, state) in self.layers.iter_mut() {
            if *layer != Layer::Voice {
                state.loaded = false;
                state.enabled = true;
                state.length = 0.0;
            }
        }
        self.primary = None;
        self.duration = 0.0;

        if decoded.layers.is_empty() {
            return Err(MixerError::NoPlayableLayer);
        }

        let sample_rate = self.sample_rate();
        let mut report = LoadReport { failed: decoded.failures, ..LoadReport::default() };
        for (layer, _) in &report.failed {
            if let Some(state) = self.layers.get_mut(layer) {
                state.enabled = false;
            }
        }
        for layer in ALL_LAYERS.into_iter().filter(|l| *l != Layer::Voice) {
            self.push_gain(layer);
        }
        for (layer, buffer) in decoded.layers {
            if let Some(state) = self.layers.get_mut(&layer) {
                state.loaded = true;
                state.length = buffer.duration_secs(sample_rate);
            }
            self.audio.send(AudioCommand::LoadLayer { layer, buffer });
            self.push_gain(layer);
            report.loaded.push(layer);
        }
        self.update_primary();
        report.duration = self.duration;

        log::info!(
            target: "mixer",
            "loaded {:?} ({} failed), {:.2}s",
            report.loaded,
            report.failed.len(),
            report.duration
        );
        Ok(report)
    }

    // the transport ends with the primary layer: the original, else the first
    // enabled stem, else the first loaded one
    fn update_primary(&mut self) {
        let loaded = |l: &Layer| self.layers.get(l).is_some_and(|s| s.loaded);
        let enabled = |l: &Layer| self.layers.get(l).is_some_and(|s| s.loaded && s.enabled);

        let candidates = std::iter::once(Layer::Original).chain(STEM_LAYERS);
        let primary = candidates
            .clone()
            .find(|l| enabled(l))
            .or_else(|| candidates.clone().find(|l| loaded(l)));
        if primary != self.primary {
            log::debug!(target: "mixer", "primary layer {:?}", primary);
        }
        self.primary = primary;
        self.duration = primary.map(|l| self.layer(l).length).unwrap_or(0.0);
        self.audio.send(AudioCommand::SetPrimary(primary));
    }

    pub fn load_counts(&mut self, samples: Vec<Arc<SampleBuffer>>) {
        let loaded = !samples.is_empty();
        self.audio.send(AudioCommand::LoadCounts(samples));
        if let Some(state) = self.layers.get_mut(&Layer::Voice) {
            state.loaded = loaded;
        }
        self.push_gain(Layer::Voice);
    }

    pub fn play(&mut self) {
        if self.primary.is_some() {
            self.audio.send(AudioCommand::Play);
        }
    }

    pub fn pause(&mut self) {
        self.audio.send(AudioCommand::Pause);
    }

    pub fn stop(&mut self) {
        self.audio.send(AudioCommand::Stop);
    }

    pub fn seek(&mut self, time: f64) {
        let t = time.clamp(0.0, self.duration.max(0.0));
        let frame = self.audio.clock().frames_for(t);
        self.audio.send(AudioCommand::Seek { frame });
    }

    pub fn set_volume(&mut self, layer: Layer, volume: u8) {
        if let Some(state) = self.layers.get_mut(&layer) {
            state.volume = volume.min(MAX_VOLUME);
        }
        self.push_gain(layer);
    }

    pub fn set_enabled(&mut self, layer: Layer, enabled: bool) {
        if let Some(state) = self.layers.get_mut(&layer) {
            state.enabled = enabled;
        }
        self.push_gain(layer);
        if layer != Layer::Voice {
            self.update_primary();
        }
    }

    pub fn trigger_count(&mut self, number: u8, at_time: f64) {
        if !self.layers.get(&Layer::Voice).is_some_and(|s| s.loaded && s.enabled) {
            return;
        }
        let at_frame = self.audio.clock().frames_for(at_time);
        self.audio.send(AudioCommand::Count { number, at_frame });
    }

    /// Authoritative transport time, as last rendered by the engine.
    pub fn current_time(&self) -> f64 {
        self.audio.clock().seconds()
    }

    pub fn is_playing(&self) -> bool {
        self.audio.clock().is_playing()
    }

    pub fn layer(&self, layer: Layer) -> LayerState {
        self.layers
            .get(&layer)
            .copied()
            .unwrap_or(LayerState { loaded: false, enabled: false, volume: 0, length: 0.0 })
    }

    pub fn layers(&self) -> impl Iterator<Item = (Layer, LayerState)> + '_ {
        self.layers.iter().map(|(l, s)| (*l, *s))
    }

    // instantaneous gain change; disabled layers keep rendering at 0 so they
    // stay in phase and come back in sync
    fn push_gain(&mut self, layer: Layer) {
        let Some(state) = self.layers.get(&layer) else { return };
        let gain = if state.enabled { state.volume as f32 / MAX_VOLUME as f32 } else { 0.0 };
        self.audio.send(AudioCommand::SetGain { layer, gain });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{Engine, StereoFrame, offline};
    use approx::assert_relative_eq;

    const RATE: u32 = 100;

    fn buffer(value: f32, secs: f64) -> Arc<SampleBuffer> {
        let n = (secs * RATE as f64) as usize;
        Arc::new(SampleBuffer::from_frames(vec![StereoFrame::mono(value); n]))
    }

    fn mixer() -> (MixerChannels, Engine) {
        let (handle, engine) = offline(RATE);
        (MixerChannels::new(handle, &BTreeMap::new()), engine)
    }

    fn render(engine: &mut Engine, frames: usize) -> Vec<StereoFrame> {
        let mut out = vec![StereoFrame::zero(); frames];
        engine.process(&mut out);
        out
    }

    fn original_only(secs: f64) -> DecodedTrack {
        DecodedTrack { layers: vec![(Layer::Original, buffer(0.5, secs))], failures: vec![] }
    }

    #[test]
    fn install_picks_primary_and_duration() {
        let (mut m, _e) = mixer();
        let report = m.install(original_only(3.0)).unwrap();
        assert_eq!(report.loaded, vec![Layer::Original]);
        assert_eq!(m.primary, Some(Layer::Original));
        assert_relative_eq!(report.duration, 3.0);
        assert_relative_eq!(m.duration, 3.0);
        assert!(m.layer(Layer::Original).loaded);
        assert!(!m.layer(Layer::Drums).loaded);
    }

    #[test]
    fn empty_decode_is_not_playable() {
        let (mut m, _e) = mixer();
        let decoded = DecodedTrack { layers: vec![], failures: vec![(Layer::Original, "bad".into())] };
        assert!(matches!(m.install(decoded), Err(MixerError::NoPlayableLayer)));
    }

    #[test]
    fn transport_follows_engine_clock() {
        let (mut m, mut e) = mixer();
        m.install(original_only(2.0)).unwrap();
        m.play();
        render(&mut e, 50);
        assert_relative_eq!(m.current_time(), 0.5);
        assert!(m.is_playing());

        // seek lands on the next render, not before
        m.seek(1.5);
        assert_relative_eq!(m.current_time(), 0.5);
        render(&mut e, 10);
        assert_relative_eq!(m.current_time(), 1.6);

        m.seek(99.0); // clamped to the end
        render(&mut e, 10);
        assert_relative_eq!(m.current_time(), 2.0);
        assert!(!m.is_playing());
    }

    #[test]
    fn volume_and_enable_scale_output() {
        let (mut m, mut e) = mixer();
        m.install(original_only(1.0)).unwrap();
        m.play();
        m.set_volume(Layer::Original, 50);
        assert_relative_eq!(render(&mut e, 1)[0].left, 0.25);
        m.set_enabled(Layer::Original, false);
        assert_eq!(render(&mut e, 1)[0].left, 0.0);
        m.set_enabled(Layer::Original, true);
        assert_relative_eq!(render(&mut e, 1)[0].left, 0.25);
        assert_eq!(m.layer(Layer::Original).volume, 50);
        m.set_volume(Layer::Original, 250);
        assert_eq!(m.layer(Layer::Original).volume, MAX_VOLUME);
    }

    #[test]
    fn primary_moves_to_first_enabled_stem() {
        let (mut m, _e) = mixer();
        let decoded = DecodedTrack {
            layers: STEM_LAYERS.iter().map(|l| (*l, buffer(0.1, 1.0))).collect(),
            failures: vec![],
        };
        m.install(decoded).unwrap();
        assert_eq!(m.primary, Some(Layer::Vocals));
        m.set_enabled(Layer::Vocals, false);
        assert_eq!(m.primary, Some(Layer::Drums));
    }

    #[test]
    fn counts_only_sent_when_voice_layer_is_live() {
        let (mut m, mut e) = mixer();
        m.install(DecodedTrack { layers: vec![(Layer::Original, buffer(0.0, 1.0))], failures: vec![] })
            .unwrap();
        m.trigger_count(1, 0.0); // no samples yet, ignored
        m.load_counts((0..8).map(|_| buffer(1.0, 0.05)).collect());
        m.play();
        m.trigger_count(1, 0.02);
        let out = render(&mut e, 4);
        assert_eq!(out[1].left, 0.0);
        assert_relative_eq!(out[2].left, 1.0); // voice at full volume over a silent track
    }

    fn write_wav(path: &std::path::Path, frames: usize) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            w.write_sample(1000i16).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn broken_stem_degrades_to_original() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("original.wav"), 200);
        for name in ["vocals", "drums", "bass"] {
            write_wav(&dir.path().join(format!("{name}.wav")), 200);
        }
        std::fs::write(dir.path().join("other.wav"), b"not a wav").unwrap();

        let sources = crate::loader::sample_loader::index_track_dir(dir.path()).unwrap();
        let (mut m, _e) = mixer();
        let report = m.install(decode_sources(&sources, RATE)).unwrap();
        assert_eq!(report.loaded, vec![Layer::Original]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, Layer::Other);
        assert_relative_eq!(report.duration, 2.0);
        assert!(!m.layer(Layer::Drums).loaded);
        assert!(m.layer(Layer::Drums).enabled);
        let other = m.layer(Layer::Other);
        assert!(!other.loaded && !other.enabled);
        assert!(m.layer(Layer::Original).enabled);
    }

    #[test]
    fn next_load_clears_failed_flag() {
        let (mut m, _e) = mixer();
        let decoded = DecodedTrack {
            layers: vec![(Layer::Original, buffer(0.5, 1.0))],
            failures: vec![(Layer::Bass, "truncated".into())],
        };
        m.install(decoded).unwrap();
        assert!(!m.layer(Layer::Bass).enabled);

        let decoded = DecodedTrack {
            layers: STEM_LAYERS.iter().map(|l| (*l, buffer(0.1, 1.0))).collect(),
            failures: vec![],
        };
        m.install(decoded).unwrap();
        assert!(m.layer(Layer::Bass).loaded && m.layer(Layer::Bass).enabled);
    }

    #[test]
    fn full_stem_set_wins_over_original() {
        let dir = tempfile::tempdir().unwrap();
        write_wav(&dir.path().join("original.wav"), 100);
        for layer in STEM_LAYERS {
            write_wav(&dir.path().join(format!("{}.wav", layer.label())), 100);
        }
        let sources = crate::loader::sample_loader::index_track_dir(dir.path()).unwrap();
        let decoded = decode_sources(&sources, RATE);
        let layers: Vec<Layer> = decoded.layers.iter().map(|(l, _)| *l).collect();
        assert_eq!(layers, STEM_LAYERS.to_vec());
    }
}
