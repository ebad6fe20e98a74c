//! Elastic sample queue between the chunk producer and the output callback.
//!
//! - producer thread → `push` (never blocks on the consumer)
//! - output callback → `pull_into` (never blocks, always fills the full block)
//! - controller worker → `wait_for_data` / length checks
//!
//! Samples live under one mutex. The "data available" event has its own lock so no
//! thread ever waits while holding the sample lock.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Auto-reset-on-wait event signaled on every push and on stop requests.
#[derive(Default)]
pub struct DataSignal {
    flag: Mutex<bool>,
    cv: Condvar,
}

impl DataSignal {
    /// Set the event and wake every waiter.
    pub fn set(&self) {
        let mut flag = self.flag.lock().unwrap_or_else(PoisonError::into_inner);
        *flag = true;
        drop(flag);
        self.cv.notify_all();
    }

    /// Wait up to `timeout` for the event, then clear it.
    ///
    /// Returns `true` if the event was set (before or during the wait).
    pub fn wait_and_clear(&self, timeout: Duration) -> bool {
        let flag = self.flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut flag, _timeout) = self
            .cv
            .wait_timeout_while(flag, timeout, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
        let was_set = *flag;
        *flag = false;
        was_set
    }
}

/// Thread-safe FIFO of mono `i16` samples, fed in chunks and drained in fixed blocks.
///
/// ## Design
/// - Unbounded by default: chunks are short-lived per utterance, so growth is accepted.
/// - With a cap, pushes that would overflow drop whole chunks from the head.
/// - `pull_into` pads any shortfall with zeros and empties the queue; the output
///   buffer is always completely written.
pub struct ChunkedAudioQueue {
    inner: Mutex<QueueInner>,
    data_ready: DataSignal,
    max_buffered_samples: Option<usize>,
}

struct QueueInner {
    samples: VecDeque<i16>,
    /// Remaining length of each chunk still in `samples`, oldest first.
    /// The front entry shrinks as the callback consumes it.
    chunk_lens: VecDeque<usize>,
    dropped_samples: u64,
}

impl Default for ChunkedAudioQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedAudioQueue {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        Self::with_capacity_limit(None)
    }

    /// Create a queue that keeps at most `max_buffered_samples` (when `Some`).
    pub fn with_capacity_limit(max_buffered_samples: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                samples: VecDeque::new(),
                chunk_lens: VecDeque::new(),
                dropped_samples: 0,
            }),
            data_ready: DataSignal::default(),
            max_buffered_samples,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one chunk to the tail and signal waiting consumers.
    ///
    /// Returns the number of samples dropped to honor the capacity limit.
    pub fn push(&self, chunk: &[i16]) -> usize {
        if chunk.is_empty() {
            return 0;
        }
        let mut g = self.lock();
        let mut dropped = 0usize;
        let mut chunk = chunk;

        if let Some(cap) = self.max_buffered_samples {
            if chunk.len() > cap {
                // Only the newest `cap` samples of an oversized chunk can be kept.
                dropped += chunk.len() - cap;
                chunk = &chunk[chunk.len() - cap..];
            }
            while g.samples.len() + chunk.len() > cap {
                let Some(oldest) = g.chunk_lens.pop_front() else {
                    break;
                };
                g.samples.drain(..oldest);
                dropped += oldest;
            }
        }

        g.samples.extend(chunk.iter().copied());
        g.chunk_lens.push_back(chunk.len());
        g.dropped_samples += dropped as u64;
        drop(g);

        if dropped > 0 {
            tracing::warn!(
                dropped_samples = dropped,
                cap = ?self.max_buffered_samples,
                "audio queue full; dropped oldest chunks"
            );
        }
        self.data_ready.set();
        dropped
    }

    /// Remove exactly `out.len()` samples from the head into `out`.
    ///
    /// When fewer are queued, the available samples are written first and the rest of
    /// `out` is zeroed. Returns how many real samples were written.
    pub fn pull_into(&self, out: &mut [i16]) -> usize {
        let mut g = self.lock();
        let take = g.samples.len().min(out.len());
        for (slot, sample) in out.iter_mut().zip(g.samples.drain(..take)) {
            *slot = sample;
        }

        let mut consumed = take;
        while consumed > 0 {
            let Some(front) = g.chunk_lens.front_mut() else {
                break;
            };
            if *front <= consumed {
                consumed -= *front;
                g.chunk_lens.pop_front();
            } else {
                *front -= consumed;
                consumed = 0;
            }
        }
        drop(g);

        out[take..].fill(0);
        take
    }

    /// Remove exactly `frame_count` samples, padding with silence on shortfall.
    pub fn pull(&self, frame_count: usize) -> Vec<i16> {
        let mut out = vec![0i16; frame_count];
        self.pull_into(&mut out);
        out
    }

    /// Non-blocking check used by the prebuffer gate.
    pub fn has_samples_at_least(&self, n: usize) -> bool {
        self.lock().samples.len() >= n
    }

    pub fn is_empty(&self) -> bool {
        self.lock().samples.is_empty()
    }

    /// Current queued samples (best-effort snapshot).
    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    /// Chunks with at least one sample still queued.
    pub fn chunks_queued(&self) -> usize {
        self.lock().chunk_lens.len()
    }

    /// Total samples discarded by the capacity limit.
    pub fn dropped_samples(&self) -> u64 {
        self.lock().dropped_samples
    }

    /// Discard every queued sample.
    pub fn clear(&self) {
        let mut g = self.lock();
        g.samples.clear();
        g.chunk_lens.clear();
    }

    /// Wait up to `timeout` for a push (or `wake`) and reset the event.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        self.data_ready.wait_and_clear(timeout)
    }

    /// Wake any thread blocked in `wait_for_data`.
    pub fn wake(&self) {
        self.data_ready.set();
    }
}

/// Decode a little-endian `i16` byte buffer into samples.
///
/// A trailing odd byte cannot form a sample and is ignored; the second return value
/// reports whether that happened.
pub fn samples_from_le_bytes(bytes: &[u8]) -> (Vec<i16>, bool) {
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    (samples, bytes.len() % 2 != 0)
}
