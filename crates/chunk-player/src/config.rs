//! Playback tuning parameters.
//!
//! Every field has a default matching a 24 kHz mono speech stream; a TOML file only
//! needs to name the values it overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::PlaybackError;
use crate::sink::SinkConfig;

/// Playback tuning parameters shared by the queue, controller and turn driver.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Output sample rate in Hz. Samples are assumed to already be at this rate.
    pub sample_rate: u32,
    /// Frames requested by the output device per callback.
    pub block_frames: u32,
    /// Samples that must be queued before the worker opens the output stream.
    pub initial_buffer_samples: usize,
    /// Chunks a turn driver waits for before calling `start_playback`.
    pub start_after_chunks: usize,
    /// Upper bound on a single wait for new data, in milliseconds.
    pub wait_poll_ms: u64,
    /// Sleep between supervisory checks while the queue still holds data.
    pub idle_sleep_ms: u64,
    /// Grace interval before closing the stream so device-side buffers can play out.
    pub drain_grace_ms: u64,
    /// How long `stop` waits for the worker to exit.
    pub join_timeout_ms: u64,
    /// Extra time a turn driver allows for playback after the queue looks drained.
    pub turn_tail_ms: u64,
    /// Optional cap on queued samples; oldest chunks are dropped to make room.
    pub max_buffered_samples: Option<usize>,
    /// Output device substring match; `None` selects the host default.
    pub device: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24_000,
            block_frames: 1024,
            initial_buffer_samples: 4000,
            start_after_chunks: 3,
            wait_poll_ms: 100,
            idle_sleep_ms: 10,
            drain_grace_ms: 200,
            join_timeout_ms: 1000,
            turn_tail_ms: 500,
            max_buffered_samples: None,
            device: None,
        }
    }
}

impl PlaybackConfig {
    /// Load configuration overrides from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<PlaybackConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        cfg.validate()
            .with_context(|| format!("validate config {:?}", path))?;
        Ok(cfg)
    }

    /// Reject values that would make the worker spin or the device misbehave.
    pub fn validate(&self) -> Result<(), PlaybackError> {
        if self.sample_rate == 0 {
            return Err(PlaybackError::Config("sample_rate must be > 0".into()));
        }
        if self.block_frames == 0 {
            return Err(PlaybackError::Config("block_frames must be > 0".into()));
        }
        if self.wait_poll_ms == 0 {
            return Err(PlaybackError::Config("wait_poll_ms must be > 0".into()));
        }
        if self.idle_sleep_ms == 0 {
            return Err(PlaybackError::Config("idle_sleep_ms must be > 0".into()));
        }
        if self.join_timeout_ms == 0 {
            return Err(PlaybackError::Config("join_timeout_ms must be > 0".into()));
        }
        if let Some(cap) = self.max_buffered_samples {
            if cap < self.initial_buffer_samples {
                return Err(PlaybackError::Config(format!(
                    "max_buffered_samples ({cap}) is below initial_buffer_samples ({})",
                    self.initial_buffer_samples
                )));
            }
        }
        Ok(())
    }

    /// Stream description handed to the output backend.
    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            sample_rate: self.sample_rate,
            channels: 1,
            block_frames: self.block_frames,
        }
    }

    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn turn_tail(&self) -> Duration {
        Duration::from_millis(self.turn_tail_ms)
    }

    /// Playback time represented by `samples` at the configured rate.
    pub fn samples_to_duration(&self, samples: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros((samples as u64).saturating_mul(1_000_000) / self.sample_rate as u64)
    }
}
