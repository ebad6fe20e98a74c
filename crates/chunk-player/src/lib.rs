//! Elastic playback of chunked PCM audio on a fixed-rate output device.
//!
//! A producer pushes irregular chunks of mono `i16` samples into a
//! [`queue::ChunkedAudioQueue`]; a [`controller::PlaybackController`] worker waits for a
//! prebuffer, opens the output sink and lets the device callback drain the queue in
//! fixed blocks, padding underruns with silence.

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod playback;
pub mod queue;
pub mod sink;
pub mod status;
pub mod turn;

#[cfg(test)]
pub(crate) mod test_support;

pub use chunk_player_types::{PlayerStatus, SessionEndReason, SessionState};
