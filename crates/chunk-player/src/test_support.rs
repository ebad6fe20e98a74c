//! Scripted output backend for exercising the controller without audio hardware.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::PlaybackError;
use crate::sink::{FaultFlag, OutputBackend, OutputStream, RenderFn, SinkConfig};

/// Plays the role of a device driver: a thread calls the render closure every
/// `period` with a `block_frames` buffer and records what it was given.
#[derive(Clone)]
pub(crate) struct ScriptedBackend {
    pub opens: Arc<AtomicUsize>,
    pub blocks: Arc<Mutex<Vec<Vec<f32>>>>,
    closed_at: Arc<Mutex<Option<Instant>>>,
    period: Duration,
    fail_open: bool,
    open_delay: Duration,
    fault_after_blocks: Option<usize>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            opens: Arc::new(AtomicUsize::new(0)),
            blocks: Arc::new(Mutex::new(Vec::new())),
            closed_at: Arc::new(Mutex::new(None)),
            period: Duration::from_millis(2),
            fail_open: false,
            open_delay: Duration::ZERO,
            fault_after_blocks: None,
        }
    }

    pub fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    pub fn with_open_delay(delay: Duration) -> Self {
        Self {
            open_delay: delay,
            ..Self::new()
        }
    }

    pub fn faulting_after(blocks: usize) -> Self {
        Self {
            fault_after_blocks: Some(blocks),
            ..Self::new()
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<Vec<f32>> {
        self.blocks.lock().unwrap().clone()
    }

    /// When the most recently opened stream was dropped.
    pub fn closed_at(&self) -> Option<Instant> {
        *self.closed_at.lock().unwrap()
    }
}

struct ScriptedStream {
    running: Arc<AtomicBool>,
    playing: Arc<AtomicBool>,
    closed_at: Arc<Mutex<Option<Instant>>>,
    driver: Option<thread::JoinHandle<()>>,
}

impl OutputStream for ScriptedStream {
    fn play(&self) -> Result<(), PlaybackError> {
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        *self.closed_at.lock().unwrap() = Some(Instant::now());
        self.running.store(false, Ordering::SeqCst);
        if let Some(driver) = self.driver.take() {
            let _ = driver.join();
        }
    }
}

impl OutputBackend for ScriptedBackend {
    fn open(
        &self,
        config: &SinkConfig,
        mut render: RenderFn,
        fault: FaultFlag,
    ) -> Result<Box<dyn OutputStream>, PlaybackError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            thread::sleep(self.open_delay);
        }
        if self.fail_open {
            return Err(PlaybackError::DeviceFault("scripted open failure".into()));
        }

        let running = Arc::new(AtomicBool::new(true));
        let playing = Arc::new(AtomicBool::new(false));
        let frames = config.block_frames as usize;
        let blocks = self.blocks.clone();
        let period = self.period;
        let fault_after = self.fault_after_blocks;
        let running_driver = running.clone();
        let playing_driver = playing.clone();

        let driver = thread::spawn(move || {
            let mut delivered = 0usize;
            while running_driver.load(Ordering::SeqCst) {
                if playing_driver.load(Ordering::SeqCst) {
                    if fault_after.is_some_and(|n| delivered >= n) {
                        fault.raise("scripted device disconnect");
                        return;
                    }
                    let mut data = vec![f32::NAN; frames];
                    render(&mut data);
                    blocks.lock().unwrap().push(data);
                    delivered += 1;
                }
                thread::sleep(period);
            }
        });

        Ok(Box::new(ScriptedStream {
            running,
            playing,
            closed_at: self.closed_at.clone(),
            driver: Some(driver),
        }))
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}
