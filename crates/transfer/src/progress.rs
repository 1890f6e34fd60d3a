use std::time::{Duration, Instant};

/// Progress and speed arithmetic shared by both pipelines.
///
/// The associated functions are pure; an instance only remembers when the
/// transfer started moving data so callers do not have to.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEstimator {
    started_at: Instant,
}

impl ProgressEstimator {
    /// Starts the clock now.
    pub fn start() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    /// Starts the clock at a given instant.
    pub fn started_at(started_at: Instant) -> Self {
        Self { started_at }
    }

    /// Wall-clock time since the transfer started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average speed for `bytes` moved since start.
    pub fn speed(&self, bytes: u64) -> f64 {
        Self::bytes_per_second(bytes, self.elapsed())
    }

    /// Estimated time left to move the remaining bytes at the average speed.
    pub fn remaining(&self, done_bytes: u64, total_bytes: u64) -> Option<Duration> {
        Self::eta(done_bytes, total_bytes, self.elapsed())
    }

    /// Percentage of `total_chunks` covered by `done_chunks`, in `0.0..=100.0`.
    pub fn percent(done_chunks: u32, total_chunks: u32) -> f64 {
        if total_chunks == 0 {
            return 100.0;
        }
        let done = done_chunks.min(total_chunks);
        f64::from(done) / f64::from(total_chunks) * 100.0
    }

    /// Cumulative bytes divided by elapsed seconds. Never negative; 0.0 when
    /// no time has elapsed.
    pub fn bytes_per_second(bytes: u64, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        bytes as f64 / secs
    }

    /// Estimates time remaining to move `total_bytes - done_bytes`.
    ///
    /// Returns `None` while the speed is zero.
    pub fn eta(done_bytes: u64, total_bytes: u64, elapsed: Duration) -> Option<Duration> {
        let speed = Self::bytes_per_second(done_bytes, elapsed);
        if speed <= 0.0 {
            return None;
        }
        let remaining = total_bytes.saturating_sub(done_bytes);
        Some(Duration::from_secs_f64(remaining as f64 / speed))
    }
}
