//! Output device discovery and the CPAL-backed sink.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - opening a mono `f32` stream that drives the render closure

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::PlaybackError;
use crate::sink::{FaultFlag, OutputBackend, OutputStream, RenderFn, SinkConfig};

/// Pick a CPAL output device.
///
/// - If `needle` is `Some`, chooses the first output device whose name contains the substring
///   (case-insensitive).
/// - Otherwise, returns the host default output device.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .context("No output devices")?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Print available output devices to stdout (`--list-devices`).
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    for (i, name) in list_device_names(host)?.iter().enumerate() {
        println!("#{i}: {name}");
    }
    Ok(())
}

/// Return available output device names.
pub fn list_device_names(host: &cpal::Host) -> Result<Vec<String>> {
    let devices = host.output_devices().context("No output devices")?;
    let mut out = Vec::new();
    for d in devices {
        out.push(d.description()?.to_string());
    }
    Ok(out)
}

/// Choose a stream config for `sink` on `device`.
///
/// Only `f32` ranges that cover the requested rate qualify. Among those, an exact
/// channel-count match wins, then the fewest channels (mono is duplicated by the
/// render closure). The block size is fixed when the device's range allows it.
pub fn pick_stream_config(device: &cpal::Device, sink: &SinkConfig) -> Result<cpal::StreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query supported output configs")?
        .collect();

    let best = ranges
        .iter()
        .filter(|r| r.sample_format() == cpal::SampleFormat::F32)
        .filter(|r| {
            r.min_sample_rate() <= sink.sample_rate && sink.sample_rate <= r.max_sample_rate()
        })
        .min_by_key(|r| channel_rank(r.channels(), sink.channels))
        .ok_or_else(|| anyhow!("No f32 output config at {} Hz", sink.sample_rate))?;

    Ok(cpal::StreamConfig {
        channels: best.channels(),
        sample_rate: sink.sample_rate,
        buffer_size: pick_buffer_size(best.buffer_size(), sink.block_frames),
    })
}

fn channel_rank(available: u16, wanted: u16) -> (bool, u16) {
    (available != wanted, available)
}

/// Fixed block size when supported, otherwise let the driver decide.
fn pick_buffer_size(
    supported: &cpal::SupportedBufferSize,
    block_frames: u32,
) -> cpal::BufferSize {
    match supported {
        cpal::SupportedBufferSize::Range { min, max }
            if *min <= block_frames && block_frames <= *max =>
        {
            cpal::BufferSize::Fixed(block_frames)
        }
        cpal::SupportedBufferSize::Range { .. } => cpal::BufferSize::Default,
        cpal::SupportedBufferSize::Unknown => cpal::BufferSize::Fixed(block_frames),
    }
}

/// Adapt a mono render closure to an interleaved buffer of `channels` channels.
///
/// Mono passes straight through; otherwise each rendered sample is copied to every
/// channel of its frame.
fn fan_out_mono(mut render: RenderFn, channels: usize) -> impl FnMut(&mut [f32]) + Send + 'static {
    let channels = channels.max(1);
    let mut mono: Vec<f32> = Vec::new();
    move |data: &mut [f32]| {
        if channels == 1 {
            render(data);
            return;
        }
        let frames = data.len() / channels;
        if mono.len() < frames {
            mono.resize(frames, 0.0);
        }
        render(&mut mono[..frames]);
        for (frame, &sample) in data.chunks_exact_mut(channels).zip(mono.iter()) {
            frame.fill(sample);
        }
        data[frames * channels..].fill(0.0);
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

/// [`OutputBackend`] over the host's CPAL devices.
#[derive(Clone, Debug, Default)]
pub struct CpalBackend {
    device: Option<String>,
}

impl CpalBackend {
    /// `device` is a case-insensitive substring; `None` uses the host default.
    pub fn new(device: Option<String>) -> Self {
        let device = device.and_then(|name| {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        });
        Self { device }
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }
}

struct CpalStream {
    stream: cpal::Stream,
}

impl OutputStream for CpalStream {
    fn play(&self) -> Result<(), PlaybackError> {
        self.stream
            .play()
            .map_err(|e| PlaybackError::DeviceFault(format!("start stream: {e}")))
    }
}

impl OutputBackend for CpalBackend {
    fn open(
        &self,
        config: &SinkConfig,
        render: RenderFn,
        fault: FaultFlag,
    ) -> Result<Box<dyn OutputStream>, PlaybackError> {
        let host = cpal::default_host();
        let device = pick_device(&host, self.device.as_deref())
            .map_err(|e| PlaybackError::DeviceFault(format!("{e:#}")))?;
        let stream_config = pick_stream_config(&device, config)
            .map_err(|e| PlaybackError::DeviceFault(format!("{e:#}")))?;

        let name = device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());
        tracing::info!(
            device = %name,
            rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            buffer_size = ?stream_config.buffer_size,
            "output device"
        );
        if stream_config.channels != config.channels {
            tracing::info!(
                requested = config.channels,
                actual = stream_config.channels,
                "device has no mono output; duplicating channel"
            );
        }

        let mut callback = fan_out_mono(render, stream_config.channels as usize);
        let err_fn = move |err: cpal::StreamError| {
            tracing::warn!("stream error: {err}");
            fault.raise(err.to_string());
        };

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback(data),
                err_fn,
                None,
            )
            .map_err(|e| PlaybackError::DeviceFault(format!("build output stream: {e}")))?;

        Ok(Box::new(CpalStream { stream }))
    }
}
