//! Output sink abstraction.
//!
//! The controller never talks to an audio API directly. It asks an [`OutputBackend`]
//! to open a stream with a render closure; the backend's driver thread then calls that
//! closure at its own clock. Dropping the returned [`OutputStream`] closes the sink.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::PlaybackError;

/// Render closure invoked by the driver with an interleaved `f32` output buffer.
pub type RenderFn = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Fixed stream parameters requested from the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per callback.
    pub block_frames: u32,
}

/// Shared flag a backend raises when its stream faults after opening.
///
/// The first reported message is kept; later faults only keep the flag raised.
#[derive(Clone, Default)]
pub struct FaultFlag {
    inner: Arc<FaultInner>,
}

#[derive(Default)]
struct FaultInner {
    raised: AtomicBool,
    message: Mutex<Option<String>>,
}

impl FaultFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fault. Safe to call from a driver's error callback.
    pub fn raise(&self, message: impl Into<String>) {
        let mut slot = self
            .inner
            .message
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(message.into());
        }
        drop(slot);
        self.inner.raised.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::Acquire)
    }

    /// First fault message, if any fault was raised.
    pub fn message(&self) -> Option<String> {
        self.inner
            .message
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Handle to an open output stream. Dropping it closes the sink.
pub trait OutputStream {
    /// Start pulling audio through the render closure.
    fn play(&self) -> Result<(), PlaybackError>;
}

/// Opens output streams. Implemented over CPAL for real devices and by test doubles.
///
/// `open` is called on the controller's worker thread, and the returned stream is used
/// and dropped on that same thread, so the stream itself does not need to be `Send`.
pub trait OutputBackend: Send + Sync + 'static {
    fn open(
        &self,
        config: &SinkConfig,
        render: RenderFn,
        fault: FaultFlag,
    ) -> Result<Box<dyn OutputStream>, PlaybackError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_flag_keeps_first_message() {
        let flag = FaultFlag::new();
        assert!(!flag.is_raised());
        assert!(flag.message().is_none());

        flag.raise("device unplugged");
        flag.raise("second error");

        assert!(flag.is_raised());
        assert_eq!(flag.message().as_deref(), Some("device unplugged"));
    }

    #[test]
    fn fault_flag_clones_share_state() {
        let flag = FaultFlag::new();
        let cb = flag.clone();
        cb.raise("stream error");
        assert!(flag.is_raised());
    }
}
