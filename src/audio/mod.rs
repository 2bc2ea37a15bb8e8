use std::sync::Arc;

use anyhow::Context;
use crossbeam_channel::Sender;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::audio_api::AudioCommand;

mod clock;
mod engine;
mod frame;
mod sample_buffer;
mod voice;

pub use clock::TransportClock;
pub use engine::Engine;
pub use frame::StereoFrame;
pub use sample_buffer::SampleBuffer;

// largest callback we render without growing the scratch buffer
const MAX_BLOCK_FRAMES: usize = 8192;

/// Control-side end of the engine: a command queue plus the clock the
/// engine publishes. Holds the output stream alive when there is one.
pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    clock: Arc<TransportClock>,
    _output_stream: Option<cpal::Stream>, // None when rendered offline
}

impl AudioHandle {
    pub fn send(&self, cmd: AudioCommand) {
        if self.tx.try_send(cmd).is_err() {
            log::warn!(target: "audio", "command queue full, dropping command");
        }
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    pub fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }
}

/// An engine that nobody drives but the caller: render it by hand with
/// `Engine::process`. Used by tests and by hosts without an output device.
pub fn offline(sample_rate: u32) -> (AudioHandle, Engine) {
    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(1024);
    let clock = Arc::new(TransportClock::new(sample_rate));
    let engine = Engine::new(rx, Arc::clone(&clock));
    (AudioHandle { tx, clock, _output_stream: None }, engine)
}

pub fn start_audio() -> anyhow::Result<AudioHandle> {
    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let config = device.default_output_config().context("no default output config")?;

    let sample_rate: u32 = config.sample_rate();
    let channels = config.channels() as usize;

    match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let (mut handle, engine) = offline(sample_rate);
            let output_stream = build_output_stream_f32(&device, &config.into(), engine, channels)?;
            output_stream.play().context("failed to play output stream")?;
            log::info!(target: "audio", "output started at {sample_rate} Hz, {channels} channels");
            handle._output_stream = Some(output_stream);
            Ok(handle)
        }
        other => anyhow::bail!("unsupported sample format {other:?} (only f32 supported for now)"),
    }
}

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut engine: Engine,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let mut scratch = vec![StereoFrame::zero(); MAX_BLOCK_FRAMES];

    let err_fn = |err| log::error!(target: "audio", "output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info| {
            let n_frames = data.len() / channels;
            // stays within capacity for any sane buffer size, so no allocation here
            scratch.resize(n_frames, StereoFrame::zero());
            engine.process(&mut scratch);

            for (out, frame) in data.chunks_exact_mut(channels).zip(&scratch) {
                match out {
                    [mono] => *mono = 0.5 * (frame.left + frame.right),
                    [l, r, rest @ ..] => {
                        *l = frame.left;
                        *r = frame.right;
                        rest.fill(0.0);
                    }
                    [] => {}
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}
