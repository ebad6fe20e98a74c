//! Turn driver: the caller-side policy between a remote session and the controller.
//!
//! A turn is a burst of audio chunks ended by a "turn complete" message. The driver
//! counts chunks, starts playback once `start_after_chunks` have arrived, and on turn
//! completion waits for the queue to drain before stopping the session.

use std::thread;
use std::time::{Duration, Instant};

use chunk_player_types::PlayerStatus;

use crate::controller::PlaybackController;
use crate::error::PlaybackError;

/// Messages delivered by the remote session client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnEvent {
    /// Raw little-endian `i16` audio bytes.
    Chunk(Vec<u8>),
    /// The producer finished this turn.
    TurnComplete,
    /// Anything else (text, tool calls, keep-alives); ignored by playback.
    Other,
}

/// Result of feeding one event to the driver.
#[derive(Debug)]
pub enum TurnProgress {
    Continue,
    Finished(TurnSummary),
}

/// What happened during one turn.
#[derive(Clone, Debug)]
pub struct TurnSummary {
    pub chunks: usize,
    /// Whether playback was started at all (a turn with no chunks never starts).
    pub played: bool,
    /// Audio was still queued when the turn ended: the drain deadline passed or the
    /// session closed early.
    pub drain_timed_out: bool,
    /// The worker had to be detached because it did not stop in time.
    pub stop_timed_out: bool,
    /// Controller status captured right after stopping.
    pub status: PlayerStatus,
}

pub struct TurnDriver {
    controller: PlaybackController,
    chunks_received: usize,
    playback_started: bool,
}

impl TurnDriver {
    pub fn new(controller: PlaybackController) -> Self {
        Self {
            controller,
            chunks_received: 0,
            playback_started: false,
        }
    }

    pub fn controller(&self) -> &PlaybackController {
        &self.controller
    }

    pub fn chunks_received(&self) -> usize {
        self.chunks_received
    }

    pub fn playback_started(&self) -> bool {
        self.playback_started
    }

    /// Feed one session event.
    pub fn handle(&mut self, event: TurnEvent) -> Result<TurnProgress, PlaybackError> {
        match event {
            TurnEvent::Chunk(bytes) => {
                self.on_chunk(&bytes)?;
                Ok(TurnProgress::Continue)
            }
            TurnEvent::TurnComplete => Ok(TurnProgress::Finished(self.finish_turn()?)),
            TurnEvent::Other => Ok(TurnProgress::Continue),
        }
    }

    /// Feed events until the turn completes.
    ///
    /// If the source ends without `TurnComplete`, the turn is finished as if it had
    /// arrived.
    pub fn run_turn(
        &mut self,
        events: impl IntoIterator<Item = TurnEvent>,
    ) -> Result<TurnSummary, PlaybackError> {
        for event in events {
            if let TurnProgress::Finished(summary) = self.handle(event)? {
                return Ok(summary);
            }
        }
        tracing::info!("event source ended before turn complete");
        self.finish_turn()
    }

    /// Queue one chunk and start playback once enough chunks have arrived.
    pub fn on_chunk(&mut self, bytes: &[u8]) -> Result<(), PlaybackError> {
        self.controller.add_chunk(bytes);
        self.chunks_received += 1;

        let start_after = self.controller.config().start_after_chunks;
        if !self.playback_started && self.chunks_received >= start_after {
            tracing::info!(chunks = self.chunks_received, "starting playback");
            self.controller.start_playback()?;
            self.playback_started = true;
        }
        Ok(())
    }

    /// Finish the turn: start playback if it never started, let the queue drain,
    /// stop the session and re-arm the controller for the next turn.
    pub fn finish_turn(&mut self) -> Result<TurnSummary, PlaybackError> {
        tracing::info!(chunks = self.chunks_received, "turn complete");
        if !self.playback_started && self.chunks_received > 0 {
            self.controller.start_playback()?;
            self.playback_started = true;
        }
        self.controller.mark_input_complete();

        let drain_timed_out = if self.playback_started {
            !self.wait_for_drain()
        } else {
            false
        };

        let stop_timed_out = match self.controller.stop() {
            Ok(()) => false,
            Err(e) if e.is_warning() => {
                tracing::warn!("{e}");
                true
            }
            Err(e) => return Err(e),
        };

        let summary = TurnSummary {
            chunks: self.chunks_received,
            played: self.playback_started,
            drain_timed_out,
            stop_timed_out,
            status: self.controller.status(),
        };
        self.reset();
        Ok(summary)
    }

    /// Clear per-turn counters and controller state.
    pub fn reset(&mut self) {
        self.chunks_received = 0;
        self.playback_started = false;
        self.controller.reset_turn();
    }

    /// Wait until every queued sample was handed to the device.
    ///
    /// Bounded by the playback time of what is queued now plus `turn_tail_ms`; returns
    /// early if the worker exits (device fault). Returns `false` if samples remain.
    fn wait_for_drain(&self) -> bool {
        let config = self.controller.config();
        let queue = self.controller.queue();
        let budget = config.samples_to_duration(queue.len()) + config.turn_tail();
        let deadline = Instant::now() + budget;
        let poll = config.idle_sleep().max(Duration::from_millis(1));

        while !queue.is_empty() {
            if !self.controller.is_running() {
                tracing::warn!(buffered = queue.len(), "worker exited before queue drained");
                return queue.is_empty();
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    buffered = queue.len(),
                    budget_ms = budget.as_millis() as u64,
                    "queue did not drain before deadline"
                );
                return false;
            }
            thread::sleep(poll);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlaybackConfig;
    use crate::test_support::ScriptedBackend;
    use chunk_player_types::{SessionEndReason, SessionState};
    use std::sync::Arc;

    fn driver(backend: &ScriptedBackend) -> TurnDriver {
        let config = PlaybackConfig {
            wait_poll_ms: 10,
            idle_sleep_ms: 1,
            drain_grace_ms: 5,
            turn_tail_ms: 2000,
            ..PlaybackConfig::default()
        };
        TurnDriver::new(PlaybackController::new(config, Arc::new(backend.clone())).unwrap())
    }

    fn chunk(len: usize, value: i16) -> TurnEvent {
        TurnEvent::Chunk(std::iter::repeat_n(value, len).flat_map(|s| s.to_le_bytes()).collect())
    }

    #[test]
    fn playback_starts_after_chunk_gate() {
        let backend = ScriptedBackend::new();
        let mut d = driver(&backend);

        d.handle(chunk(2000, 1)).unwrap();
        d.handle(TurnEvent::Other).unwrap();
        d.handle(chunk(2000, 1)).unwrap();
        assert!(!d.playback_started());
        assert!(!d.controller().is_running());

        d.handle(chunk(2000, 1)).unwrap();
        assert!(d.playback_started());
        assert_eq!(d.chunks_received(), 3);
        assert!(d.controller().is_running());

        let TurnProgress::Finished(summary) = d.handle(TurnEvent::TurnComplete).unwrap() else {
            panic!("turn should finish");
        };
        assert_eq!(summary.chunks, 3);
        assert!(summary.played);
        assert!(!summary.drain_timed_out);
        assert_eq!(summary.status.played_frames, 6000);
        assert_eq!(summary.status.end_reason, Some(SessionEndReason::Completed));
        assert_eq!(backend.open_count(), 1);
    }

    #[test]
    fn short_turn_still_plays() {
        let backend = ScriptedBackend::new();
        let mut d = driver(&backend);

        let summary = d
            .run_turn(vec![chunk(1, 5), chunk(1, 6), chunk(1, 7), TurnEvent::TurnComplete])
            .unwrap();

        assert!(summary.played);
        assert_eq!(summary.status.played_frames, 3);
        let first = &backend.recorded()[0];
        assert_eq!(first.len(), 1024);
        assert!(first[3..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn turn_below_chunk_gate_starts_on_complete() {
        let backend = ScriptedBackend::new();
        let mut d = driver(&backend);

        let summary = d.run_turn(vec![chunk(500, 3), TurnEvent::TurnComplete]).unwrap();
        assert!(summary.played);
        assert_eq!(summary.chunks, 1);
        assert_eq!(summary.status.played_frames, 500);
    }

    #[test]
    fn empty_turn_never_opens_sink() {
        let backend = ScriptedBackend::new();
        let mut d = driver(&backend);

        let summary = d.run_turn(vec![TurnEvent::Other, TurnEvent::TurnComplete]).unwrap();
        assert!(!summary.played);
        assert_eq!(summary.status.state, SessionState::Idle);
        assert_eq!(backend.open_count(), 0);
    }

    #[test]
    fn source_ending_early_finishes_turn() {
        let backend = ScriptedBackend::new();
        let mut d = driver(&backend);

        let summary = d.run_turn(vec![chunk(100, 1), chunk(100, 1), chunk(100, 1)]).unwrap();
        assert!(summary.played);
        assert_eq!(summary.status.played_frames, 300);
    }

    #[test]
    fn driver_serves_consecutive_turns() {
        let backend = ScriptedBackend::new();
        let mut d = driver(&backend);

        d.run_turn(vec![chunk(5000, 1), TurnEvent::TurnComplete]).unwrap();
        assert_eq!(d.chunks_received(), 0);
        assert!(!d.controller().is_initial_buffer_filled());

        let second = d.run_turn(vec![chunk(300, 2), TurnEvent::TurnComplete]).unwrap();
        assert!(second.played);
        assert_eq!(backend.open_count(), 2);
        assert_eq!(second.status.end_reason, Some(SessionEndReason::Completed));
    }

    #[test]
    fn device_fault_does_not_block_turn() {
        let backend = ScriptedBackend::failing_open();
        let mut d = driver(&backend);

        let summary = d.run_turn(vec![chunk(5000, 1), TurnEvent::TurnComplete]).unwrap();
        assert_eq!(summary.status.end_reason, Some(SessionEndReason::DeviceFault));
        assert!(!summary.stop_timed_out);
        assert!(summary.drain_timed_out);
    }

    #[test]
    fn stream_fault_reports_undrained_audio() {
        let backend = ScriptedBackend::faulting_after(1);
        let mut d = driver(&backend);

        let summary = d.run_turn(vec![chunk(20_000, 1), TurnEvent::TurnComplete]).unwrap();
        assert_eq!(summary.status.end_reason, Some(SessionEndReason::DeviceFault));
        assert!(summary.status.played_frames < 20_000);
        assert!(summary.drain_timed_out);
    }
}
