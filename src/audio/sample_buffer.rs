use std::path::Path;

use super::frame::StereoFrame;
use crate::error::MixerError;
use crate::shared::Layer;

#[derive(Clone, Debug, Default)]
pub struct SampleBuffer {
    pub data: Vec<StereoFrame>, // the audio data array, already at the output rate
}

impl SampleBuffer {
    pub fn from_frames(data: Vec<StereoFrame>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        self.data.len() as f64 / sample_rate as f64
    }

    // Load a WAV file from disk, folded to stereo and resampled to `target_rate`
    pub fn load_wav(path: &Path, target_rate: u32, layer: Layer) -> Result<Self, MixerError> {
        let decode = |source| MixerError::Decode { layer, path: path.to_path_buf(), source };

        let mut reader = hound::WavReader::open(path).map_err(decode)?;
        let spec = reader.spec();
        let file_channels = spec.channels as usize;
        if file_channels == 0 {
            return Err(MixerError::Unsupported { layer, message: "wav has no channels".into() });
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader // float, just pass it through
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(decode)?,
            hound::SampleFormat::Int => { // int, scale into -1..1
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|x| x as f32 / max))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(decode)?
            }
        };

        // mono is duplicated, anything wider keeps its first two channels
        let mut frames: Vec<StereoFrame> = if file_channels == 1 {
            samples.into_iter().map(StereoFrame::mono).collect()
        } else {
            samples
                .chunks_exact(file_channels)
                .map(|c| StereoFrame { left: c[0], right: c[1] })
                .collect()
        };

        if spec.sample_rate != target_rate {
            frames = resample_linear(&frames, spec.sample_rate, target_rate);
        }

        log::debug!(
            target: "audio",
            "decoded {:?} from {} ({} Hz, {} ch, {} frames)",
            layer,
            path.display(),
            spec.sample_rate,
            file_channels,
            frames.len()
        );
        Ok(Self { data: frames })
    }
}

fn resample_linear(frames: &[StereoFrame], source_rate: u32, target_rate: u32) -> Vec<StereoFrame> {
    if source_rate == target_rate || frames.is_empty() {
        return frames.to_vec();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let out_len = (frames.len() as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        // fractional position in the source buffer
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        if idx + 1 >= frames.len() { // past the last pair, hold the final frame
            out.push(frames[frames.len() - 1]);
        } else {
            let a = frames[idx];
            let b = frames[idx + 1];
            out.push(StereoFrame {
                left: a.left * (1.0 - frac) + b.left * frac,
                right: a.right * (1.0 - frac) + b.right * frac,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            w.write_sample(*s).unwrap();
        }
        w.finalize().unwrap();
    }

    #[test]
    fn loads_mono_int_wav_as_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, 8000, 1, &[0, 16384, -16384, 0]);
        let buf = SampleBuffer::load_wav(&path, 8000, Layer::Drums).unwrap();
        assert_eq!(buf.len(), 4);
        assert_relative_eq!(buf.data[1].left, 0.5);
        assert_eq!(buf.data[1].left, buf.data[1].right);
        assert_relative_eq!(buf.duration_secs(8000), 0.0005);
    }

    #[test]
    fn resamples_to_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.wav");
        write_wav(&path, 8000, 2, &[0; 16000]); // 1s of stereo silence
        let buf = SampleBuffer::load_wav(&path, 16000, Layer::Original).unwrap();
        assert_eq!(buf.len(), 16000);
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let err = SampleBuffer::load_wav(Path::new("/nope/missing.wav"), 44100, Layer::Bass).unwrap_err();
        assert!(matches!(err, MixerError::Decode { layer: Layer::Bass, .. }));
    }

    #[test]
    fn linear_resample_interpolates() {
        let src = vec![StereoFrame::mono(0.0), StereoFrame::mono(1.0)];
        let out = resample_linear(&src, 1, 2);
        assert_eq!(out.len(), 4);
        assert_relative_eq!(out[1].left, 0.5);
        assert_relative_eq!(out[3].left, 1.0);
    }
}
