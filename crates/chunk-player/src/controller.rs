//! Playback controller: owns the sample queue and the worker thread that moves one
//! playback session through `Idle → Buffering → Streaming → Draining → Closed`.
//!
//! Threads involved:
//! - the caller (producer) pushes chunks and calls `start_playback` / `stop`
//! - the worker waits for the prebuffer gate, opens the sink and supervises it
//! - the driver's callback thread pulls blocks through the render closure
//!
//! Only the worker opens or closes the sink. `stop` is cooperative: the worker checks the
//! stop flag at least every `wait_poll_ms`, and the caller waits at most
//! `join_timeout_ms` for it to exit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use chunk_player_types::{PlayerStatus, SessionEndReason, SessionState};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::config::PlaybackConfig;
use crate::device::CpalBackend;
use crate::error::PlaybackError;
use crate::playback::build_render_fn;
use crate::queue::{ChunkedAudioQueue, samples_from_le_bytes};
use crate::sink::{FaultFlag, OutputBackend};
use crate::status::{self, PlaybackStats, StatusInputs};

/// Producer-facing handle for one output device and its sample queue.
pub struct PlaybackController {
    config: PlaybackConfig,
    queue: Arc<ChunkedAudioQueue>,
    shared: Arc<Shared>,
    backend: Arc<dyn OutputBackend>,
    worker: Mutex<Option<WorkerHandle>>,
}

/// State shared with the worker thread.
struct Shared {
    stop: AtomicBool,
    initial_buffer_filled: AtomicBool,
    input_complete: AtomicBool,
    session: Mutex<SessionInfo>,
    stats: Arc<PlaybackStats>,
}

#[derive(Clone, Copy, Default)]
struct SessionInfo {
    state: SessionState,
    end_reason: Option<SessionEndReason>,
}

struct WorkerHandle {
    join: thread::JoinHandle<()>,
    done_rx: Receiver<()>,
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, SessionInfo> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: SessionState) {
        self.session().state = state;
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

impl PlaybackController {
    /// Create a controller that plays through `backend`.
    pub fn new(
        config: PlaybackConfig,
        backend: Arc<dyn OutputBackend>,
    ) -> Result<Self, PlaybackError> {
        config.validate()?;
        Ok(Self {
            queue: Arc::new(ChunkedAudioQueue::with_capacity_limit(config.max_buffered_samples)),
            shared: Arc::new(Shared {
                stop: AtomicBool::new(false),
                initial_buffer_filled: AtomicBool::new(false),
                input_complete: AtomicBool::new(false),
                session: Mutex::new(SessionInfo::default()),
                stats: Arc::new(PlaybackStats::default()),
            }),
            config,
            backend,
            worker: Mutex::new(None),
        })
    }

    /// Create a controller that plays through CPAL on `config.device`.
    pub fn with_cpal(config: PlaybackConfig) -> Result<Self, PlaybackError> {
        let backend = Arc::new(CpalBackend::new(config.device.clone()));
        Self::new(config, backend)
    }

    /// Append one chunk of little-endian `i16` bytes.
    ///
    /// Returns the number of samples queued from it.
    pub fn add_chunk(&self, bytes: &[u8]) -> usize {
        let (samples, odd) = samples_from_le_bytes(bytes);
        if odd {
            tracing::warn!(bytes = bytes.len(), "chunk has odd byte length; trailing byte ignored");
        }
        self.push_samples(&samples);
        samples.len()
    }

    /// Append one chunk of already-decoded samples.
    pub fn push_samples(&self, samples: &[i16]) {
        self.shared.stats.record_chunk(samples.len());
        self.queue.push(samples);

        if !self.shared.initial_buffer_filled.load(Ordering::Acquire)
            && self.queue.has_samples_at_least(self.config.initial_buffer_samples)
        {
            self.shared.initial_buffer_filled.store(true, Ordering::Release);
            tracing::debug!(
                buffered = self.queue.len(),
                threshold = self.config.initial_buffer_samples,
                "initial buffer filled"
            );
            self.queue.wake();
        }
    }

    /// Whether the sample-count prebuffer gate has cleared.
    pub fn is_initial_buffer_filled(&self) -> bool {
        self.shared.initial_buffer_filled.load(Ordering::Acquire)
    }

    /// Declare that no more chunks will arrive for this turn.
    ///
    /// A turn shorter than the prebuffer threshold would otherwise never leave
    /// `Buffering`; after this call the worker starts as soon as anything is queued.
    pub fn mark_input_complete(&self) {
        self.shared.input_complete.store(true, Ordering::Release);
        self.queue.wake();
    }

    /// Start the worker if none is alive. Calling this while a session is running is a no-op.
    pub fn start_playback(&self) -> Result<(), PlaybackError> {
        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = slot.as_ref() {
            if !worker.join.is_finished() {
                if self.shared.stop_requested() {
                    tracing::warn!("previous playback worker is still stopping; not restarting");
                } else {
                    tracing::debug!("playback worker already running");
                }
                return Ok(());
            }
        }
        if let Some(finished) = slot.take() {
            let _ = finished.join.join();
        }

        self.shared.stop.store(false, Ordering::Release);
        {
            let mut session = self.shared.session();
            session.state = SessionState::Buffering;
            session.end_reason = None;
        }

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let ctx = WorkerContext {
            config: self.config.clone(),
            queue: self.queue.clone(),
            shared: self.shared.clone(),
            backend: self.backend.clone(),
        };
        let join = thread::Builder::new()
            .name("chunk-player".into())
            .spawn(move || run_worker(ctx, done_tx));
        let join = match join {
            Ok(join) => join,
            Err(e) => {
                self.shared.set_state(SessionState::Idle);
                return Err(PlaybackError::WorkerSpawn(e));
            }
        };

        *slot = Some(WorkerHandle { join, done_rx });
        Ok(())
    }

    /// Request the worker to stop, wake it, and wait up to `join_timeout_ms`.
    ///
    /// Idempotent; a no-op when nothing is running. On timeout the worker keeps running
    /// until it notices the stop flag; its handle stays tracked so `start_playback` will not
    /// spawn a second worker, and `PlaybackError::StopTimeout` is returned for the caller
    /// to log.
    pub fn stop(&self) -> Result<(), PlaybackError> {
        self.shared.stop.store(true, Ordering::Release);
        self.queue.wake();

        let mut slot = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(worker) = slot.take() else {
            return Ok(());
        };

        let timeout = self.config.join_timeout();
        match worker.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.join.join().is_err() {
                    tracing::warn!("playback worker panicked");
                }
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "playback worker did not stop in time"
                );
                *slot = Some(worker);
                Err(PlaybackError::StopTimeout(timeout))
            }
        }
    }

    /// Clear per-turn state so the controller can serve the next turn.
    ///
    /// Call after `stop`. Discards anything still queued and re-arms the prebuffer gate.
    pub fn reset_turn(&self) {
        self.queue.clear();
        self.shared.initial_buffer_filled.store(false, Ordering::Release);
        self.shared.input_complete.store(false, Ordering::Release);
    }

    /// Whether a worker thread is currently alive.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.join.is_finished())
    }

    pub fn state(&self) -> SessionState {
        self.shared.session().state
    }

    pub fn end_reason(&self) -> Option<SessionEndReason> {
        self.shared.session().end_reason
    }

    pub fn queue(&self) -> &Arc<ChunkedAudioQueue> {
        &self.queue
    }

    pub fn stats(&self) -> &Arc<PlaybackStats> {
        &self.shared.stats
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Snapshot suitable for logging or API responses.
    pub fn status(&self) -> PlayerStatus {
        let session = *self.shared.session();
        status::snapshot(StatusInputs {
            state: session.state,
            end_reason: session.end_reason,
            config: &self.config,
            buffered_samples: self.queue.len(),
            dropped_samples: self.queue.dropped_samples(),
            initial_buffer_filled: self.is_initial_buffer_filled(),
            stats: &self.shared.stats,
        })
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("playback stop on drop: {e}");
        }
    }
}

struct WorkerContext {
    config: PlaybackConfig,
    queue: Arc<ChunkedAudioQueue>,
    shared: Arc<Shared>,
    backend: Arc<dyn OutputBackend>,
}

impl WorkerContext {
    fn gate_open(&self) -> bool {
        self.shared.initial_buffer_filled.load(Ordering::Acquire)
            || (self.shared.input_complete.load(Ordering::Acquire) && !self.queue.is_empty())
    }
}

/// Marks the session `Closed` with its end reason when the worker exits, even by panic.
struct CloseOnExit {
    shared: Arc<Shared>,
    end_reason: Option<SessionEndReason>,
}

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        let mut session = self.shared.session();
        session.state = SessionState::Closed;
        session.end_reason = self.end_reason.or(Some(SessionEndReason::DeviceFault));
    }
}

fn run_worker(ctx: WorkerContext, done_tx: Sender<()>) {
    let mut guard = CloseOnExit {
        shared: ctx.shared.clone(),
        end_reason: None,
    };
    let reason = run_session(&ctx);
    tracing::info!(reason = ?reason, "playback session closed");
    guard.end_reason = Some(reason);
    drop(guard);
    let _ = done_tx.send(());
}

fn run_session(ctx: &WorkerContext) -> SessionEndReason {
    tracing::info!(
        threshold = ctx.config.initial_buffer_samples,
        buffered = ctx.queue.len(),
        "playback buffering"
    );
    while !ctx.gate_open() && !ctx.shared.stop_requested() {
        ctx.queue.wait_for_data(ctx.config.wait_poll());
    }
    if ctx.shared.stop_requested() {
        tracing::info!("stop requested before prebuffer gate; output never opened");
        return SessionEndReason::StoppedBeforeStart;
    }

    ctx.shared.set_state(SessionState::Streaming);
    match stream_until_stopped(ctx) {
        Ok(()) => SessionEndReason::Completed,
        Err(e) => {
            tracing::warn!("audio playback error: {e}");
            SessionEndReason::DeviceFault
        }
    }
}

/// Open the sink, supervise it until stop or fault, then drain and close.
fn stream_until_stopped(ctx: &WorkerContext) -> Result<(), PlaybackError> {
    let sink = ctx.config.sink_config();
    let fault = FaultFlag::new();
    let render = build_render_fn(ctx.queue.clone(), ctx.shared.stats.clone());
    let stream = ctx.backend.open(&sink, render, fault.clone())?;
    stream.play()?;
    tracing::info!(
        rate_hz = sink.sample_rate,
        block_frames = sink.block_frames,
        buffered = ctx.queue.len(),
        "output stream opened"
    );

    while !ctx.shared.stop_requested() {
        if fault.is_raised() {
            return Err(PlaybackError::DeviceFault(
                fault.message().unwrap_or_else(|| "stream error".to_string()),
            ));
        }
        if ctx.queue.is_empty() {
            ctx.queue.wait_for_data(ctx.config.wait_poll());
        } else {
            thread::sleep(ctx.config.idle_sleep());
        }
    }

    ctx.shared.set_state(SessionState::Draining);
    tracing::info!(
        grace_ms = ctx.config.drain_grace_ms,
        buffered = ctx.queue.len(),
        "playback draining"
    );
    thread::sleep(ctx.config.drain_grace());
    drop(stream);
    Ok(())
}
