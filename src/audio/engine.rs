use std::sync::Arc;

use crossbeam_channel::Receiver;

use super::clock::TransportClock;
use super::frame::{StereoFrame, mix_into};
use super::sample_buffer::SampleBuffer;
use super::voice::CountVoice;
use crate::audio_api::AudioCommand;
use crate::shared::{BEATS_PER_PHRASE, Layer, NUM_LAYERS};

const MAX_VOICES: usize = 16; // hard caps so we don't malloc in the audio callback
const MAX_PENDING: usize = 16;

#[derive(Clone, Copy, Debug)]
struct PendingCount {
    number: u8,
    at_frame: u64,
}

struct LayerSlot {
    buffer: Arc<SampleBuffer>,
    gain: f32,
}

// All music layers share one playhead, so a seek moves every layer at once
// and they can't drift apart.
pub struct Engine {
    rx: Receiver<AudioCommand>,
    clock: Arc<TransportClock>,
    layers: [Option<LayerSlot>; NUM_LAYERS],
    gains: [f32; NUM_LAYERS], // kept separately so gain survives reloads
    counts: Vec<Arc<SampleBuffer>>,
    voices: Vec<CountVoice>,
    pending: Vec<PendingCount>,
    primary: Option<Layer>,
    playhead: u64,
    playing: bool,
}

impl Engine {
    pub fn new(rx: Receiver<AudioCommand>, clock: Arc<TransportClock>) -> Self {
        Self {
            rx,
            clock,
            layers: std::array::from_fn(|_| None),
            gains: [1.0; NUM_LAYERS],
            counts: Vec::with_capacity(BEATS_PER_PHRASE as usize),
            voices: Vec::with_capacity(MAX_VOICES),
            pending: Vec::with_capacity(MAX_PENDING),
            primary: None,
            playhead: 0,
            playing: false,
        }
    }

    /// One callback's worth of work: apply queued commands, render, publish
    /// the new position.
    pub fn process(&mut self, out: &mut [StereoFrame]) {
        while let Ok(cmd) = self.rx.try_recv() {
            self.handle_cmd(cmd);
        }
        self.render_block(out);
        self.clock.publish(self.playhead, self.playing);
    }

    fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::LoadLayer { layer, buffer } => {
                let gain = self.gains[layer.index()];
                self.layers[layer.index()] = Some(LayerSlot { buffer, gain });
            }
            AudioCommand::UnloadLayers => {
                self.layers = std::array::from_fn(|_| None);
                self.primary = None;
                self.playing = false;
                self.playhead = 0;
                self.clear_counts();
            }
            AudioCommand::LoadCounts(samples) => {
                self.counts = samples;
                self.voices.clear();
            }
            AudioCommand::SetPrimary(layer) => self.primary = layer,
            AudioCommand::SetGain { layer, gain } => {
                self.gains[layer.index()] = gain;
                if let Some(slot) = self.layers[layer.index()].as_mut() {
                    slot.gain = gain;
                }
            }
            AudioCommand::Play => self.playing = self.primary.is_some(),
            AudioCommand::Pause => self.playing = false,
            AudioCommand::Stop => {
                self.playing = false;
                self.playhead = 0;
                self.clear_counts();
            }
            AudioCommand::Seek { frame } => {
                self.playhead = frame.min(self.primary_len());
                self.clear_counts();
            }
            AudioCommand::Count { number, at_frame } => {
                if self.pending.len() < MAX_PENDING {
                    self.pending.push(PendingCount { number, at_frame });
                }
            }
        }
    }

    fn clear_counts(&mut self) {
        self.voices.clear();
        self.pending.clear();
    }

    fn primary_len(&self) -> u64 {
        self.primary
            .and_then(|l| self.layers[l.index()].as_ref())
            .map(|s| s.buffer.len() as u64)
            .unwrap_or(0)
    }

    fn render_block(&mut self, out: &mut [StereoFrame]) {
        out.fill(StereoFrame::zero());
        if !self.playing {
            return;
        }

        let end = self.primary_len();
        let n = (out.len() as u64).min(end.saturating_sub(self.playhead)) as usize;
        let start = self.playhead as usize;

        for slot in self.layers.iter().flatten() {
            if slot.gain <= 0.0 || start >= slot.buffer.len() {
                continue;
            }
            let stop = (start + n).min(slot.buffer.len());
            mix_into(&mut out[..n], &slot.buffer.data[start..stop], slot.gain);
        }

        self.start_due_counts(n as u64);
        let voice_gain = self.gains[Layer::Voice.index()];
        for v in self.voices.iter_mut() {
            if let Some(sample) = self.counts.get(v.number as usize - 1) {
                v.render_into(sample, &mut out[..n], voice_gain);
            } else {
                v.active = false;
            }
        }
        self.voices.retain(|v| v.active);

        self.playhead += n as u64;
        if self.playhead >= end {
            self.playing = false;
        }
    }

    // turn pending counts whose onset falls inside this block into voices
    fn start_due_counts(&mut self, block_len: u64) {
        let block_end = self.playhead + block_len;
        let mut i = 0;
        while i < self.pending.len() {
            let p = self.pending[i];
            if p.at_frame < block_end {
                self.pending.swap_remove(i);
                if self.voices.len() < MAX_VOICES && p.number >= 1 {
                    let delay = p.at_frame.saturating_sub(self.playhead) as usize;
                    self.voices.push(CountVoice::new(p.number, delay));
                }
            } else {
                i += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::Sender;

    fn engine() -> (Sender<AudioCommand>, Engine, Arc<TransportClock>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let clock = Arc::new(TransportClock::new(100));
        (tx, Engine::new(rx, Arc::clone(&clock)), clock)
    }

    fn constant(value: f32, len: usize) -> Arc<SampleBuffer> {
        Arc::new(SampleBuffer::from_frames(vec![StereoFrame::mono(value); len]))
    }

    fn render(e: &mut Engine, n: usize) -> Vec<f32> {
        let mut out = vec![StereoFrame::zero(); n];
        e.process(&mut out);
        out.iter().map(|f| f.left).collect()
    }

    fn load_original(tx: &Sender<AudioCommand>, len: usize) {
        tx.send(AudioCommand::LoadLayer { layer: Layer::Original, buffer: constant(0.5, len) }).unwrap();
        tx.send(AudioCommand::SetPrimary(Some(Layer::Original))).unwrap();
    }

    #[test]
    fn silent_until_play() {
        let (tx, mut e, clock) = engine();
        load_original(&tx, 100);
        assert!(render(&mut e, 10).iter().all(|x| *x == 0.0));
        assert_eq!(clock.position(), 0);

        tx.send(AudioCommand::Play).unwrap();
        assert_eq!(render(&mut e, 10), vec![0.5; 10]);
        assert_eq!(clock.position(), 10);
        assert!(clock.is_playing());
    }

    #[test]
    fn layers_sum_with_gain_and_seek_together() {
        let (tx, mut e, clock) = engine();
        load_original(&tx, 100);
        tx.send(AudioCommand::LoadLayer { layer: Layer::Drums, buffer: constant(1.0, 100) }).unwrap();
        tx.send(AudioCommand::SetGain { layer: Layer::Drums, gain: 0.25 }).unwrap();
        tx.send(AudioCommand::Seek { frame: 40 }).unwrap();
        tx.send(AudioCommand::Play).unwrap();
        assert_eq!(render(&mut e, 4), vec![0.75; 4]);
        assert_eq!(clock.position(), 44);
    }

    #[test]
    fn stops_at_end_of_primary() {
        let (tx, mut e, clock) = engine();
        load_original(&tx, 12);
        tx.send(AudioCommand::Play).unwrap();
        let out = render(&mut e, 16);
        assert_eq!(&out[10..], &[0.5, 0.5, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(clock.position(), 12);
        assert!(!clock.is_playing());
    }

    #[test]
    fn count_starts_on_its_frame() {
        let (tx, mut e, _clock) = engine();
        tx.send(AudioCommand::LoadLayer { layer: Layer::Original, buffer: constant(0.0, 100) }).unwrap();
        tx.send(AudioCommand::SetPrimary(Some(Layer::Original))).unwrap();
        tx.send(AudioCommand::LoadCounts(vec![constant(1.0, 3)])).unwrap();
        tx.send(AudioCommand::Count { number: 1, at_frame: 6 }).unwrap();
        tx.send(AudioCommand::Play).unwrap();
        let first = render(&mut e, 4);
        assert_eq!(first, vec![0.0; 4]);
        let second = render(&mut e, 4);
        assert_eq!(second, vec![0.0, 0.0, 1.0, 1.0]);
        let third = render(&mut e, 4);
        assert_eq!(third, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn stop_rewinds_and_drops_counts() {
        let (tx, mut e, clock) = engine();
        load_original(&tx, 100);
        tx.send(AudioCommand::LoadCounts(vec![constant(1.0, 50)])).unwrap();
        tx.send(AudioCommand::Play).unwrap();
        tx.send(AudioCommand::Count { number: 1, at_frame: 0 }).unwrap();
        render(&mut e, 8);
        tx.send(AudioCommand::Stop).unwrap();
        tx.send(AudioCommand::Play).unwrap();
        assert_eq!(render(&mut e, 4), vec![0.5; 4]);
        assert_eq!(clock.position(), 4);
    }
}
