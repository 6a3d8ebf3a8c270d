// Batch progress reporting

use std::time::{Duration, Instant};

/// Format a duration as `MM:SS`. Minutes keep counting past an hour.
pub fn format_time(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Tracks throughput for one phase and logs a block per batch.
pub struct Progress {
    label: &'static str,
    total: usize,
    done: usize,
    started: Instant,
}

impl Progress {
    pub fn new(label: &'static str, total: usize) -> Self {
        Self {
            label,
            total,
            done: 0,
            started: Instant::now(),
        }
    }

    /// Log the state before a batch of `batch_len` items starts, then count it.
    pub fn batch(&mut self, batch_len: usize) {
        let elapsed = self.started.elapsed();
        log::info!("----------------------------------------");
        log::info!("{}", self.label);
        log::info!("Batch Size: {batch_len}");
        log::info!("Processed: {} of {}", self.done, self.total);
        log::info!("Execution Time: {}", format_time(elapsed));
        log::info!("Estimated Time Remaining: {}", format_time(self.remaining(elapsed)));
        log::info!("Items Per Second: {}", self.rate(elapsed));
        self.done += batch_len;
    }

    /// Log the closing summary for the phase.
    pub fn finish(&self) {
        log::info!("----------------------------------------");
        log::info!("{} - Complete", self.label);
        log::info!("Total Time: {}", format_time(self.started.elapsed()));
        log::info!("Total Items: {}", self.done);
    }

    pub fn done(&self) -> usize {
        self.done
    }

    fn remaining(&self, elapsed: Duration) -> Duration {
        if self.done == 0 {
            return Duration::ZERO;
        }
        let left = self.total.saturating_sub(self.done) as f64;
        Duration::from_secs_f64(elapsed.as_secs_f64() / self.done as f64 * left)
    }

    fn rate(&self, elapsed: Duration) -> u64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (self.done as f64 / secs).floor() as u64
    }
}
