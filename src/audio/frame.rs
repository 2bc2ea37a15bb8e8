// The smallest unit of audio; one stereo frame
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn mono(x: f32) -> Self {
        Self { left: x, right: x }
    }

    #[inline]
    pub fn add_scaled(&mut self, other: StereoFrame, gain: f32) {
        self.left += other.left * gain;
        self.right += other.right * gain;
    }
}

// mix `src` into `dst` frame by frame, stopping at the shorter of the two
pub fn mix_into(dst: &mut [StereoFrame], src: &[StereoFrame], gain: f32) {
    for (d, s) in dst.iter_mut().zip(src) {
        d.add_scaled(*s, gain);
    }
}
