use serde::{Deserialize, Serialize};

/// Lifecycle state of the playback session owned by a controller.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No worker thread is running.
    #[default]
    Idle,
    /// Worker is waiting for the prebuffer gate.
    Buffering,
    /// Output stream is open and the callback is draining the queue.
    Streaming,
    /// Stop was requested; the sink is given a grace interval before closing.
    Draining,
    /// Sink closed (or never opened) and the worker has exited.
    Closed,
}

/// Reason why a playback session ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// Stream ran and was stopped after draining.
    Completed,
    /// Stop arrived before the prebuffer gate cleared; the sink was never opened.
    StoppedBeforeStart,
    /// The output device failed to open or faulted while streaming.
    DeviceFault,
}

/// Point-in-time playback status reported by a controller.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStatus {
    /// Current session state.
    pub state: SessionState,
    /// End reason of the most recent session, if one has ended.
    pub end_reason: Option<SessionEndReason>,
    /// Output sample rate (Hz).
    pub sample_rate: u32,
    /// Output callback block size in frames.
    pub block_frames: u32,
    /// Samples currently queued and not yet handed to the device.
    pub buffered_samples: u64,
    /// Whether the prebuffer gate has cleared.
    pub initial_buffer_filled: bool,
    /// Chunks accepted from the producer.
    pub chunks_received: u64,
    /// Samples accepted from the producer.
    pub samples_received: u64,
    /// Real (non-padding) frames handed to the device.
    pub played_frames: u64,
    /// Elapsed playback time in milliseconds, derived from played frames.
    pub elapsed_ms: u64,
    /// Frames of silence emitted because the queue ran short.
    pub underrun_frames: u64,
    /// Callback invocations that had to pad with silence.
    pub underrun_events: u64,
    /// Samples discarded by the bounded-queue policy.
    pub dropped_samples: u64,
}
