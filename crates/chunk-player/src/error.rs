//! Error types surfaced by the playback core.

use std::time::Duration;

use thiserror::Error;

/// Errors the playback core reports to its caller.
///
/// Underruns are not errors; they are padded with silence and counted in the stats.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// The output device failed to open or faulted while streaming.
    #[error("audio device fault: {0}")]
    DeviceFault(String),

    /// The worker did not exit within the join timeout and was detached.
    #[error("playback worker did not stop within {0:?}")]
    StopTimeout(Duration),

    /// The worker thread could not be spawned.
    #[error("failed to spawn playback worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    /// Invalid playback configuration.
    #[error("invalid playback config: {0}")]
    Config(String),
}

impl PlaybackError {
    /// `true` for errors the caller may log and move past.
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::StopTimeout(_))
    }
}
