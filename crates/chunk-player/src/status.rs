use std::sync::atomic::{AtomicU64, Ordering};

use chunk_player_types::{PlayerStatus, SessionEndReason, SessionState};

use crate::config::PlaybackConfig;

/// Counters shared between the producer side, the worker and the output callback.
///
/// All updates are relaxed atomics so the callback never takes a lock for bookkeeping.
#[derive(Debug, Default)]
pub struct PlaybackStats {
    chunks_received: AtomicU64,
    samples_received: AtomicU64,
    played_frames: AtomicU64,
    underrun_frames: AtomicU64,
    underrun_events: AtomicU64,
}

impl PlaybackStats {
    pub fn record_chunk(&self, samples: usize) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.samples_received
            .fetch_add(samples as u64, Ordering::Relaxed);
    }

    /// Account for one output block: `real` queued frames out of `requested`.
    pub fn record_block(&self, real: usize, requested: usize) {
        if real > 0 {
            self.played_frames.fetch_add(real as u64, Ordering::Relaxed);
        }
        if real < requested {
            self.underrun_events.fetch_add(1, Ordering::Relaxed);
            self.underrun_frames
                .fetch_add((requested - real) as u64, Ordering::Relaxed);
        }
    }

    pub fn chunks_received(&self) -> u64 {
        self.chunks_received.load(Ordering::Relaxed)
    }

    pub fn samples_received(&self) -> u64 {
        self.samples_received.load(Ordering::Relaxed)
    }

    pub fn played_frames(&self) -> u64 {
        self.played_frames.load(Ordering::Relaxed)
    }

    pub fn underrun_frames(&self) -> u64 {
        self.underrun_frames.load(Ordering::Relaxed)
    }

    pub fn underrun_events(&self) -> u64 {
        self.underrun_events.load(Ordering::Relaxed)
    }
}

/// Inputs gathered by the controller for one status snapshot.
pub(crate) struct StatusInputs<'a> {
    pub state: SessionState,
    pub end_reason: Option<SessionEndReason>,
    pub config: &'a PlaybackConfig,
    pub buffered_samples: usize,
    pub dropped_samples: u64,
    pub initial_buffer_filled: bool,
    pub stats: &'a PlaybackStats,
}

/// Build an API-facing snapshot.
pub(crate) fn snapshot(inputs: StatusInputs<'_>) -> PlayerStatus {
    let played_frames = inputs.stats.played_frames();
    let elapsed_ms = match inputs.config.sample_rate {
        0 => 0,
        sr => played_frames.saturating_mul(1000) / sr as u64,
    };
    PlayerStatus {
        state: inputs.state,
        end_reason: inputs.end_reason,
        sample_rate: inputs.config.sample_rate,
        block_frames: inputs.config.block_frames,
        buffered_samples: inputs.buffered_samples as u64,
        initial_buffer_filled: inputs.initial_buffer_filled,
        chunks_received: inputs.stats.chunks_received(),
        samples_received: inputs.stats.samples_received(),
        played_frames,
        elapsed_ms,
        underrun_frames: inputs.stats.underrun_frames(),
        underrun_events: inputs.stats.underrun_events(),
        dropped_samples: inputs.dropped_samples,
    }
}
