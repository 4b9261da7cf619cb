//! # Monotonic clock
//!
//! ## Purpose
//!
//! One process-wide monotonic clock backing every internal comparison
//! (`detected_at`, TTL checks, history ordering). Wallclock (`chrono::Utc`)
//! is reserved for UTC-midnight daily-counter resets and any timestamp that
//! crosses a process boundary — never for internal comparisons, per the
//! "wallclock comparisons" re-architecture item.
//!
//! Modeled on the teacher's `CachedClock`: a background task refreshes an
//! atomic nanosecond counter so hot paths read it without a syscall.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use types::MonoTimestamp;

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone)]
pub struct Clock {
    epoch: Instant,
    cached_nanos: Arc<AtomicU64>,
}

impl Clock {
    /// Starts the clock and spawns the background refresher. Must be called
    /// from within a Tokio runtime.
    pub fn start() -> Self {
        let epoch = Instant::now();
        let cached_nanos = Arc::new(AtomicU64::new(0));
        let clock = Self {
            epoch,
            cached_nanos,
        };
        clock.spawn_updater();
        clock
    }

    fn spawn_updater(&self) {
        let epoch = self.epoch;
        let cached_nanos = self.cached_nanos.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DEFAULT_UPDATE_INTERVAL);
            loop {
                ticker.tick().await;
                let nanos = epoch.elapsed().as_nanos() as u64;
                cached_nanos.store(nanos, Ordering::Relaxed);
            }
        });
    }

    /// Cheap (~1ns, no syscall) monotonic timestamp relative to process
    /// start.
    pub fn now(&self) -> MonoTimestamp {
        MonoTimestamp::from_nanos(self.cached_nanos.load(Ordering::Relaxed))
    }

    /// Exact, syscall-backed timestamp; used where the 1ms cache staleness
    /// would matter (e.g. measuring a single step's elapsed time).
    pub fn now_precise(&self) -> MonoTimestamp {
        MonoTimestamp::from_nanos(self.epoch.elapsed().as_nanos() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn now_advances() {
        let clock = Clock::start();
        let first = clock.now_precise();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = clock.now_precise();
        assert!(second.0 > first.0);
    }
}
