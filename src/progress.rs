//! Periodic rate/ETA reporting and the cooperative stop point a sync pass
//! checks at every block-index boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

/// A shared, cooperative stop flag. Cloning shares the same underlying
/// flag; a caller (e.g. a signal handler) sets it from outside the sync
/// pass, which observes it at the next block-index boundary.
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        StopFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Samples wall time at a fixed cadence and emits "%done, MiB processed"
/// narration at `info` level. Cheap to call every block index; the cadence
/// check is a single `Instant::elapsed` comparison.
pub struct ProgressReporter {
    label: String,
    total_units: u64,
    processed_units: u64,
    bytes_processed: u64,
    block_size: usize,
    started: Instant,
    last_emit: Instant,
    cadence: Duration,
}

impl ProgressReporter {
    pub fn new(label: impl Into<String>, total_units: u64, block_size: usize) -> Self {
        let now = Instant::now();
        ProgressReporter {
            label: label.into(),
            total_units,
            processed_units: 0,
            bytes_processed: 0,
            block_size,
            started: now,
            last_emit: now,
            cadence: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    /// Records one more processed block index and narrates at `info` if
    /// the cadence has elapsed since the last emission.
    pub fn advance(&mut self) {
        self.processed_units += 1;
        self.bytes_processed += self.block_size as u64;

        let now = Instant::now();
        if now.duration_since(self.last_emit) < self.cadence {
            return;
        }
        self.last_emit = now;
        self.emit(now);
    }

    /// Narrates the current totals regardless of cadence, without
    /// recording an additional processed unit. Meant for the single call
    /// at pass completion so the final line always reflects the true end
    /// state.
    pub fn finish(&mut self) {
        self.emit(Instant::now());
    }

    fn emit(&self, now: Instant) {
        let percent = if self.total_units == 0 {
            100.0
        } else {
            (self.processed_units as f64 / self.total_units as f64) * 100.0
        };
        let mib = self.bytes_processed as f64 / (1024.0 * 1024.0);
        let elapsed = now.duration_since(self.started).as_secs_f64();
        let rate_mib_s = if elapsed > 0.0 { mib / elapsed } else { 0.0 };
        let eta = if rate_mib_s > 0.0 && self.total_units > self.processed_units {
            let remaining_units = (self.total_units - self.processed_units) as f64;
            let remaining_mib = remaining_units * (self.block_size as f64 / (1024.0 * 1024.0));
            Some(Duration::from_secs_f64(remaining_mib / rate_mib_s))
        } else {
            None
        };

        match eta {
            Some(eta) => info!(
                "{}: {:.1}% done, {:.1} MiB processed, ETA {:.0}s",
                self.label,
                percent,
                mib,
                eta.as_secs_f64()
            ),
            None => info!("{}: {:.1}% done, {:.1} MiB processed", self.label, percent, mib),
        }
    }

    pub fn processed_units(&self) -> u64 {
        self.processed_units
    }
}
