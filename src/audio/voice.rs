use super::frame::StereoFrame;
use super::sample_buffer::SampleBuffer;

// One spoken count in flight. Plays its sample once from the top; `delay`
// is how many frames of the next block to skip so the onset lands on the
// beat instead of the block boundary.
#[derive(Clone, Copy, Debug)]
pub struct CountVoice {
    pub number: u8,
    pos: usize,
    delay: usize,
    pub active: bool,
}

impl CountVoice {
    pub fn new(number: u8, delay: usize) -> Self {
        Self { number, pos: 0, delay, active: true }
    }

    pub fn render_into(&mut self, buffer: &SampleBuffer, out: &mut [StereoFrame], gain: f32) {
        if !self.active {
            return;
        }
        let skip = self.delay.min(out.len());
        self.delay -= skip;
        let out = &mut out[skip..];

        let remaining = buffer.data.len().saturating_sub(self.pos);
        let n = remaining.min(out.len());
        for (frame, sample) in out.iter_mut().zip(&buffer.data[self.pos..self.pos + n]) {
            frame.add_scaled(*sample, gain);
        }
        self.pos += n;
        if self.pos >= buffer.data.len() {
            self.active = false;
        }
    }
}
