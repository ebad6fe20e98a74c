//! Output callback adapter.
//!
//! Builds the render closure the driver calls from its real-time thread. Per call it:
//! - pulls exactly one block from the queue (lock held only for the copy)
//! - converts `i16` samples to `f32` in [-1, 1)
//!
//! It never waits on a condition and never allocates once the scratch buffer has grown
//! to the device block size.

use std::sync::Arc;

use crate::queue::ChunkedAudioQueue;
use crate::sink::RenderFn;
use crate::status::PlaybackStats;

/// Convert one signed 16-bit sample to normalized float.
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Build the mono render closure bound to `queue`.
pub fn build_render_fn(queue: Arc<ChunkedAudioQueue>, stats: Arc<PlaybackStats>) -> RenderFn {
    let mut renderer = BlockRenderer::new(queue, stats);
    Box::new(move |data: &mut [f32]| renderer.render(data))
}

/// Callback-side state: the queue handle plus a reusable `i16` scratch block.
pub struct BlockRenderer {
    queue: Arc<ChunkedAudioQueue>,
    stats: Arc<PlaybackStats>,
    scratch: Vec<i16>,
}

impl BlockRenderer {
    pub fn new(queue: Arc<ChunkedAudioQueue>, stats: Arc<PlaybackStats>) -> Self {
        Self {
            queue,
            stats,
            scratch: Vec::new(),
        }
    }

    /// Fill the mono block `data` completely. Frames the queue cannot supply are silence.
    pub fn render(&mut self, data: &mut [f32]) {
        let frames = data.len();
        if self.scratch.len() < frames {
            self.scratch.resize(frames, 0);
        }
        let block = &mut self.scratch[..frames];
        let real = self.queue.pull_into(block);

        for (out, &sample) in data.iter_mut().zip(block.iter()) {
            *out = i16_to_f32(sample);
        }

        self.stats.record_block(real, frames);
    }
}
