use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::audio::SampleBuffer;
use crate::shared::{BEATS_PER_PHRASE, Layer, STEM_LAYERS};

pub const ORIGINAL_FILE: &str = "original.wav";

/// Files that make up one track's music layers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackSources {
    pub original: Option<PathBuf>,
    pub stems: Vec<(Layer, PathBuf)>,
}

impl TrackSources {
    pub fn is_empty(&self) -> bool {
        self.original.is_none() && self.stems.is_empty()
    }
}

// <track_dir>/original.wav, <track_dir>/{vocals,drums,bass,other}.wav.
// Without any of those, the first wav in the directory stands in for the original.
pub fn index_track_dir(dir: &Path) -> anyhow::Result<TrackSources> {
    let mut sources = TrackSources::default();

    let original = dir.join(ORIGINAL_FILE);
    if original.is_file() {
        sources.original = Some(original);
    }
    for layer in STEM_LAYERS {
        let path = dir.join(format!("{}.wav", layer.label()));
        if path.is_file() {
            sources.stems.push((layer, path));
        }
    }

    if sources.is_empty() {
        sources.original = index_wav_in_dir(dir)?.into_iter().next();
    }
    Ok(sources)
}

pub fn index_wav_in_dir(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))?;
    let mut wavs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|x| x.to_str())
                    .is_some_and(|x| x.eq_ignore_ascii_case("wav"))
        })
        .collect();
    wavs.sort();
    Ok(wavs)
}

// Spoken counts live in <voice_dir>/1.wav .. 8.wav; all eight are required.
pub fn load_counts(voice_dir: &Path, target_rate: u32) -> anyhow::Result<Vec<Arc<SampleBuffer>>> {
    (1..=BEATS_PER_PHRASE)
        .map(|n| {
            let path = voice_dir.join(format!("{n}.wav"));
            SampleBuffer::load_wav(&path, target_rate, Layer::Voice)
                .map(Arc::new)
                .with_context(|| format!("loading count sample {n}"))
        })
        .collect()
}
