use std::sync::Arc;

use crate::audio::SampleBuffer;
use crate::shared::Layer;

#[derive(Clone, Debug)]
pub enum AudioCommand {
    // The engine can't touch the disk (it runs inside the audio callback), so
    // layers are decoded on the control side and handed over ready to play.
    LoadLayer { layer: Layer, buffer: Arc<SampleBuffer> },
    UnloadLayers,

    // spoken counts, index 0 is "1"
    LoadCounts(Vec<Arc<SampleBuffer>>),

    // layer whose length ends the transport
    SetPrimary(Option<Layer>),
    SetGain { layer: Layer, gain: f32 },

    Play,
    Pause,
    Stop,
    Seek { frame: u64 },

    // start count `number` when the playhead reaches `at_frame`
    // (immediately if it already passed)
    Count { number: u8, at_frame: u64 },
}
