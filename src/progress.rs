//! Console feedback: elapsed-time measurement, the optional spinner, and the
//! byte counter the spinner displays.

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(80);
// The last frame is what indicatif shows once the bar is finished.
const FRAMES: [&str; 5] = ["|", "/", "-", "\\", " "];

/// Shared count of bytes pulled through the backend.
#[derive(Clone, Default, Debug)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Reader adapter that records every byte read into a [`ByteCounter`].
pub struct CountingReader<R> {
    inner: R,
    counter: ByteCounter,
}

impl<R: Read> CountingReader<R> {
    pub fn new(inner: R, counter: ByteCounter) -> Self {
        Self { inner, counter }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.counter.add(n as u64);
        Ok(n)
    }
}

/// Spinner configuration. Starting it hands back a guard that owns the
/// drawing thread; a disabled spinner starts nothing.
#[derive(Debug, Clone)]
pub struct Spinner {
    prefix: String,
    enabled: bool,
}

impl Spinner {
    pub fn new(prefix: impl Into<String>, enabled: bool) -> Self {
        Self {
            prefix: prefix.into(),
            enabled,
        }
    }

    pub fn disabled() -> Self {
        Self::new("", false)
    }

    pub fn start(&self, counter: ByteCounter) -> SpinnerGuard {
        if !self.enabled {
            return SpinnerGuard { inner: None };
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let prefix = self.prefix.clone();
        let handle = thread::spawn(move || {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{prefix} {spinner} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(&FRAMES),
            );
            bar.set_prefix(prefix);
            // Either a stop message or a dropped sender ends the loop.
            while let Err(RecvTimeoutError::Timeout) = stop_rx.recv_timeout(TICK) {
                bar.set_message(HumanBytes(counter.get()).to_string());
                bar.tick();
            }
            bar.finish_and_clear();
        });

        SpinnerGuard {
            inner: Some((stop_tx, handle)),
        }
    }
}

/// Running spinner. Stopping (explicitly or on drop) sends the cancellation
/// message and joins the drawing thread, so the line is cleared before the
/// caller prints anything else.
pub struct SpinnerGuard {
    inner: Option<(Sender<()>, JoinHandle<()>)>,
}

impl SpinnerGuard {
    pub fn is_running(&self) -> bool {
        self.inner.is_some()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some((stop_tx, handle)) = self.inner.take() {
            let _ = stop_tx.send(());
            let _ = handle.join();
        }
    }
}

impl Drop for SpinnerGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Wall-clock timer for `--benchmark`.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn report(&self) -> String {
        format!("Elapsed: {:.3} s", self.elapsed().as_secs_f64())
    }
}
