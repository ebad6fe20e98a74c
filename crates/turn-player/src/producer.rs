//! Simulated remote producer.
//!
//! Reads raw PCM from any `Read` source on a background thread and delivers it as
//! `TurnEvent`s, ending with `TurnComplete` at EOF. Short reads from pipes produce
//! irregular chunk sizes, much like a network stream.

use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chunk_player::turn::TurnEvent;
use crossbeam_channel::{Receiver, Sender};

#[derive(Clone, Debug)]
pub struct ProducerOptions {
    pub chunk_bytes: usize,
    /// Sleep for each chunk's playback time after sending it.
    pub pace: bool,
    pub sample_rate: u32,
}

impl ProducerOptions {
    fn chunk_duration(&self, bytes: usize) -> Duration {
        let samples = (bytes / 2) as u64;
        Duration::from_micros(samples.saturating_mul(1_000_000) / self.sample_rate.max(1) as u64)
    }
}

/// Spawn the reader thread. The channel closes when the thread exits.
pub fn spawn_reader(
    source: Box<dyn Read + Send>,
    opts: ProducerOptions,
    cancel: Arc<AtomicBool>,
) -> (Receiver<TurnEvent>, thread::JoinHandle<Result<()>>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let join = thread::spawn(move || read_chunks(source, &opts, &cancel, &tx));
    (rx, join)
}

fn read_chunks(
    mut source: Box<dyn Read + Send>,
    opts: &ProducerOptions,
    cancel: &AtomicBool,
    tx: &Sender<TurnEvent>,
) -> Result<()> {
    let chunk_bytes = opts.chunk_bytes.max(2);
    let mut buf = vec![0u8; chunk_bytes];
    // Odd byte left over from a short read; prepended to the next chunk.
    let mut carry: Option<u8> = None;

    while !cancel.load(Ordering::Relaxed) {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e).context("read pcm source"),
        };

        let mut chunk = Vec::with_capacity(n + 1);
        chunk.extend(carry.take());
        chunk.extend_from_slice(&buf[..n]);
        if chunk.len() % 2 != 0 {
            carry = chunk.pop();
        }
        if chunk.is_empty() {
            continue;
        }

        let duration = opts.chunk_duration(chunk.len());
        if tx.send(TurnEvent::Chunk(chunk)).is_err() {
            return Ok(());
        }
        if opts.pace {
            thread::sleep(duration);
        }
    }

    if carry.is_some() {
        tracing::warn!("pcm source ended on an odd byte; dropped");
    }
    let _ = tx.send(TurnEvent::TurnComplete);
    Ok(())
}

/// Synthesize a mono s16le sine tone at 0.3 full scale.
pub fn tone_pcm(freq: f32, seconds: f32, sample_rate: u32) -> Vec<u8> {
    let seconds = if seconds.is_finite() && seconds > 0.0 { seconds } else { 0.0 };
    let total = (sample_rate as f32 * seconds).round() as usize;
    let step = std::f32::consts::TAU * freq / sample_rate.max(1) as f32;
    (0..total)
        .map(|i| ((i as f32 * step).sin() * 0.3 * i16::MAX as f32) as i16)
        .flat_map(|s| s.to_le_bytes())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn opts(chunk_bytes: usize) -> ProducerOptions {
        ProducerOptions {
            chunk_bytes,
            pace: false,
            sample_rate: 24_000,
        }
    }

    fn collect(rx: Receiver<TurnEvent>) -> Vec<TurnEvent> {
        rx.iter().collect()
    }

    #[test]
    fn reader_splits_into_chunks_and_completes() {
        let data: Vec<u8> = (0..10u8).collect();
        let (rx, join) = spawn_reader(
            Box::new(Cursor::new(data)),
            opts(4),
            Arc::new(AtomicBool::new(false)),
        );
        let events = collect(rx);
        join.join().unwrap().unwrap();

        assert_eq!(
            events,
            vec![
                TurnEvent::Chunk(vec![0, 1, 2, 3]),
                TurnEvent::Chunk(vec![4, 5, 6, 7]),
                TurnEvent::Chunk(vec![8, 9]),
                TurnEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn odd_chunk_size_keeps_sample_alignment() {
        let data: Vec<u8> = (0..6u8).collect();
        let (rx, join) = spawn_reader(
            Box::new(Cursor::new(data)),
            opts(3),
            Arc::new(AtomicBool::new(false)),
        );
        let events = collect(rx);
        join.join().unwrap().unwrap();

        assert_eq!(
            events,
            vec![
                TurnEvent::Chunk(vec![0, 1]),
                TurnEvent::Chunk(vec![2, 3, 4, 5]),
                TurnEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn cancelled_reader_still_completes_turn() {
        let (rx, join) = spawn_reader(
            Box::new(Cursor::new(vec![0u8; 64])),
            opts(4),
            Arc::new(AtomicBool::new(true)),
        );
        let events = collect(rx);
        join.join().unwrap().unwrap();
        assert_eq!(events, vec![TurnEvent::TurnComplete]);
    }

    #[test]
    fn chunk_duration_follows_rate() {
        assert_eq!(opts(4800).chunk_duration(4800), Duration::from_millis(100));
    }

    #[test]
    fn tone_has_expected_length_and_range() {
        let pcm = tone_pcm(440.0, 0.5, 24_000);
        assert_eq!(pcm.len(), 24_000);
        let peak = pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]).unsigned_abs())
            .max()
            .unwrap();
        assert!(peak > 9000 && peak <= 9831);
        assert!(tone_pcm(440.0, -1.0, 24_000).is_empty());
    }
}
