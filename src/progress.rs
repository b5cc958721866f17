//! Walk progress counters and the background reporter
//!
//! The traversal thread is the only writer of [`ProgressCounters`]; the
//! reporter task only reads them. Counters are atomics and the current
//! path sits behind a mutex, so there are no data races, but reads are
//! not synchronized against writes as a group, and a displayed snapshot
//! may mix values from adjacent moments. That staleness is acceptable for
//! a human-facing display and must not be repurposed for correctness
//! decisions.

use crate::utils::format_bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::info;

/// Shared progress counters written by the walker
#[derive(Debug, Default)]
pub struct ProgressCounters {
    /// Files whose contents were chunked this run
    pub files_processed: AtomicU64,
    /// Files skipped as unchanged
    pub files_skipped: AtomicU64,
    /// Bytes chunked this run
    pub bytes_processed: AtomicU64,
    /// Bytes belonging to skipped files
    pub bytes_skipped: AtomicU64,
    current_path: Mutex<String>,
}

/// One point-in-time reading of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Files chunked so far
    pub files_processed: u64,
    /// Files skipped as unchanged so far
    pub files_skipped: u64,
    /// Bytes chunked so far
    pub bytes_processed: u64,
    /// Bytes in skipped files so far
    pub bytes_skipped: u64,
    /// Path most recently visited by the walker
    pub current_path: String,
}

impl ProgressCounters {
    /// Fresh zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one processed (chunked) file of `bytes`
    pub fn add_processed(&self, bytes: u64) {
        self.files_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record one skipped (unchanged) file of `bytes`
    pub fn add_skipped(&self, bytes: u64) {
        self.files_skipped.fetch_add(1, Ordering::Relaxed);
        self.bytes_skipped.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Update the path shown by the reporter
    pub fn set_current_path(&self, path: &str) {
        *self.current_path.lock() = path.to_string();
    }

    /// Read all counters at (roughly) one moment
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            bytes_skipped: self.bytes_skipped.load(Ordering::Relaxed),
            current_path: self.current_path.lock().clone(),
        }
    }
}

/// Background task printing a periodic status block
///
/// Spawned alongside a walk; wakes on a fixed interval, reads the shared
/// counters, computes a throughput rate since its previous tick and logs
/// a status line. Stopped (and joined) with [`ProgressReporter::stop`]
/// when the walk ends.
#[derive(Debug)]
pub struct ProgressReporter {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressReporter {
    /// Spawn a reporter reading `counters` every `interval`
    pub fn spawn(counters: Arc<ProgressCounters>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = std::thread::spawn(move || {
            let mut last = counters.snapshot();
            let mut last_tick = Instant::now();

            while !stop_flag.load(Ordering::Relaxed) {
                // Sleep in short slices so stop() returns promptly.
                let wake = Instant::now() + interval;
                while Instant::now() < wake {
                    if stop_flag.load(Ordering::Relaxed) {
                        return;
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }

                let snap = counters.snapshot();
                let elapsed = last_tick.elapsed().as_secs_f64();
                let rate = if elapsed > 0.0 {
                    ((snap.bytes_processed - last.bytes_processed) as f64 / elapsed) as u64
                } else {
                    0
                };

                info!(
                    "progress: {} files processed ({}), {} skipped ({}), {}/s, at {}",
                    snap.files_processed,
                    format_bytes(snap.bytes_processed),
                    snap.files_skipped,
                    format_bytes(snap.bytes_skipped),
                    format_bytes(rate),
                    if snap.current_path.is_empty() {
                        "<root>"
                    } else {
                        &snap.current_path
                    }
                );

                last = snap;
                last_tick = Instant::now();
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the reporter to terminate and wait for it
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}
