//! Turn-player runtime helpers.
//!
//! Wires a PCM source through the simulated producer into a `TurnDriver` playing on a
//! CPAL device.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chunk_player::controller::PlaybackController;
use chunk_player::device;
use chunk_player::turn::{TurnDriver, TurnEvent, TurnProgress, TurnSummary};
use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::cli::DeliveryArgs;
use crate::config::PlaybackConfig;
use crate::producer::{self, ProducerOptions};

const INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Open a PCM source; `-` reads stdin.
pub fn open_source(path: &Path) -> Result<Box<dyn Read + Send>> {
    if path == Path::new("-") {
        return Ok(Box::new(std::io::stdin()));
    }
    let file = std::fs::File::open(path).with_context(|| format!("open pcm {:?}", path))?;
    Ok(Box::new(file))
}

/// Play one turn from `source` on the configured device.
///
/// Returns `None` when the turn was interrupted.
pub fn play_turn(
    config: PlaybackConfig,
    source: Box<dyn Read + Send>,
    delivery: &DeliveryArgs,
    interrupted: Arc<AtomicBool>,
) -> Result<Option<TurnSummary>> {
    let opts = ProducerOptions {
        chunk_bytes: delivery.chunk_bytes,
        pace: delivery.pace,
        sample_rate: config.sample_rate,
    };
    tracing::info!(
        rate_hz = config.sample_rate,
        block_frames = config.block_frames,
        initial_buffer_samples = config.initial_buffer_samples,
        start_after_chunks = config.start_after_chunks,
        chunk_bytes = opts.chunk_bytes,
        pace = opts.pace,
        "turn start"
    );

    let controller = PlaybackController::with_cpal(config)?;
    let mut driver = TurnDriver::new(controller);
    let (rx, reader) = producer::spawn_reader(source, opts, interrupted.clone());

    let summary = drive(&mut driver, &rx, &interrupted)?;

    drop(rx);
    match reader.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("pcm reader error: {e:#}"),
        Err(_) => tracing::warn!("pcm reader panicked"),
    }
    Ok(summary)
}

/// Feed events to `driver` until the turn finishes or `interrupted` is raised.
fn drive(
    driver: &mut TurnDriver,
    rx: &Receiver<TurnEvent>,
    interrupted: &AtomicBool,
) -> Result<Option<TurnSummary>> {
    loop {
        if interrupted.load(Ordering::Relaxed) {
            tracing::info!("interrupted; stopping playback");
            if let Err(e) = driver.controller().stop() {
                tracing::warn!("{e}");
            }
            return Ok(None);
        }
        match rx.recv_timeout(INTERRUPT_POLL) {
            Ok(event) => {
                if let TurnProgress::Finished(summary) = driver.handle(event)? {
                    return Ok(Some(summary));
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Ok(Some(driver.finish_turn()?)),
        }
    }
}

/// Log a finished turn and optionally print its status as JSON.
pub fn report(summary: &TurnSummary, status_json: bool) -> Result<()> {
    let status = &summary.status;
    tracing::info!(
        chunks = summary.chunks,
        played_ms = status.elapsed_ms,
        underrun_events = status.underrun_events,
        dropped_samples = status.dropped_samples,
        end_reason = ?status.end_reason,
        "turn finished"
    );
    if summary.drain_timed_out {
        tracing::warn!("turn ended before the queue fully drained");
    }
    if status_json {
        println!("{}", serde_json::to_string_pretty(status)?);
    }
    Ok(())
}
