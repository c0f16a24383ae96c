//! Online bandwidth-delay-product estimator that proposes a new chunk
//! size from recent `(bytes, elapsed)` samples and a latency hint.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const MIN_SIZE: usize = 8 * 1024;
pub const MAX_SIZE: usize = 1024 * 1024;
const HISTORY_CAPACITY: usize = 10;
const MIN_ADJUST_INTERVAL: Duration = Duration::from_secs(1);

/// One transferred-chunk observation.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub rate_bps: f64,
    pub bytes: u64,
    pub time_s: f64,
    pub ts: Instant,
}

/// Read-only snapshot of [`BufferManager`] metrics, for observability.
#[derive(Debug, Clone, Copy)]
pub struct BufferMetrics {
    pub average_rate_bps: f64,
    pub peak_rate_bps: f64,
    /// `1 - coefficient_of_variation`; closer to 1 is steadier.
    pub stability: f64,
    pub current_size: usize,
}

/// Tracks chunk-size history and proposes the next chunk size using a
/// bandwidth-delay-product target smoothed with an EMA-like blend.
pub struct BufferManager {
    current_size: usize,
    min_size: usize,
    max_size: usize,
    latency_s: f64,
    history: VecDeque<Sample>,
    last_adjust_ts: Option<Instant>,
    samples_since_adjust: u32,
    total_bytes: u64,
    total_time_s: f64,
}

impl BufferManager {
    pub fn new(initial_size: usize, latency_s: f64) -> Self {
        Self {
            current_size: pow2_round(initial_size.clamp(MIN_SIZE, MAX_SIZE)),
            min_size: MIN_SIZE,
            max_size: MAX_SIZE,
            latency_s,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            last_adjust_ts: None,
            samples_since_adjust: 0,
            total_bytes: 0,
            total_time_s: 0.0,
        }
    }

    pub fn current_size(&self) -> usize {
        self.current_size
    }

    pub fn set_latency(&mut self, latency_s: f64) {
        self.latency_s = latency_s;
    }

    /// Record one chunk transfer. Always updates the running totals, even
    /// when `propose()` later short-circuits without resizing.
    pub fn sample(&mut self, bytes: u64, dt: Duration) {
        let time_s = dt.as_secs_f64();
        self.total_bytes += bytes;
        self.total_time_s += time_s;
        if time_s <= 0.0 {
            return;
        }
        let rate_bps = bytes as f64 / time_s;
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(Sample {
            rate_bps,
            bytes,
            time_s,
            ts: Instant::now(),
        });
        self.samples_since_adjust += 1;
    }

    /// Propose (and apply) a new `current_size`. Returns the current size
    /// unchanged if fewer than one sample has arrived since the last
    /// adjustment, or if less than 1s has elapsed since then.
    pub fn propose(&mut self) -> usize {
        if self.samples_since_adjust < 1 {
            return self.current_size;
        }
        if let Some(last) = self.last_adjust_ts {
            if last.elapsed() < MIN_ADJUST_INTERVAL {
                return self.current_size;
            }
        }

        let Some(latest) = self.history.back() else {
            return self.current_size;
        };
        let target = latest.rate_bps * self.latency_s;
        let trend = self.trend();
        let alpha = (0.2 * (1.0 + 0.5 * trend)).clamp(0.1, 0.4);
        let raw = self.current_size as f64 * (1.0 - alpha) + target * alpha;
        let clamped = raw.clamp(self.min_size as f64, self.max_size as f64);

        self.current_size = pow2_round(clamped as usize);
        self.last_adjust_ts = Some(Instant::now());
        self.samples_since_adjust = 0;
        self.current_size
    }

    /// Normalized slope over the last three samples: `(newest - oldest) /
    /// oldest`, clamped to `[-1, 1]`.
    fn trend(&self) -> f64 {
        if self.history.len() < 3 {
            return 0.0;
        }
        let n = self.history.len();
        let oldest = self.history[n - 3].rate_bps;
        let newest = self.history[n - 1].rate_bps;
        if oldest <= 0.0 {
            return 0.0;
        }
        ((newest - oldest) / oldest).clamp(-1.0, 1.0)
    }

    pub fn metrics(&self) -> BufferMetrics {
        if self.history.is_empty() {
            return BufferMetrics {
                average_rate_bps: 0.0,
                peak_rate_bps: 0.0,
                stability: 1.0,
                current_size: self.current_size,
            };
        }
        let rates: Vec<f64> = self.history.iter().map(|s| s.rate_bps).collect();
        let n = rates.len() as f64;
        let mean = rates.iter().sum::<f64>() / n;
        let variance = rates.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();
        let cv = if mean > 0.0 { std_dev / mean } else { 0.0 };
        BufferMetrics {
            average_rate_bps: mean,
            peak_rate_bps: rates.iter().cloned().fold(0.0, f64::max),
            stability: (1.0 - cv).max(0.0),
            current_size: self.current_size,
        }
    }
}

/// `2^clamp(floor(log2(x)), 13, 20)`.
pub fn pow2_round(x: usize) -> usize {
    if x == 0 {
        return 1 << 13;
    }
    let log2 = (x as f64).log2().floor() as i32;
    let exponent = log2.clamp(13, 20);
    1usize << exponent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pow2_round_stays_within_bounds() {
        assert_eq!(pow2_round(0), 1 << 13);
        assert_eq!(pow2_round(1), 1 << 13);
        assert_eq!(pow2_round(usize::MAX), 1 << 20);
        assert_eq!(pow2_round(1 << 16), 1 << 16);
    }

    #[test]
    fn proposal_always_stays_within_min_max_and_a_power_of_two() {
        let mut mgr = BufferManager::new(16 * 1024, 0.05);
        for _ in 0..10 {
            mgr.sample(16 * 1024, Duration::from_millis(1));
            // Force the 1s gate open for this deterministic test.
            mgr.last_adjust_ts = None;
            let size = mgr.propose();
            assert!(size >= MIN_SIZE && size <= MAX_SIZE);
            assert_eq!(size & (size - 1), 0, "{size} is not a power of two");
        }
    }

    #[test]
    fn adaptive_growth_increases_chunk_size_towards_the_bdp_target() {
        let mut mgr = BufferManager::new(16 * 1024, 0.05);
        let mut last = mgr.current_size();
        for _ in 0..10 {
            mgr.sample(16 * 1024, Duration::from_millis(1));
            mgr.last_adjust_ts = None;
            last = mgr.propose();
        }
        assert!(last > 16 * 1024, "expected growth, got {last}");
    }

    #[test]
    fn propose_is_a_no_op_before_the_first_sample() {
        let mut mgr = BufferManager::new(32 * 1024, 0.05);
        assert_eq!(mgr.propose(), 32 * 1024);
    }

    #[test]
    fn propose_is_rate_limited_to_once_per_second() {
        let mut mgr = BufferManager::new(16 * 1024, 0.05);
        mgr.sample(1024 * 1024, Duration::from_millis(1));
        let first = mgr.propose();
        mgr.sample(1024 * 1024, Duration::from_millis(1));
        let second = mgr.propose();
        assert_eq!(first, second, "second propose should be gated by the 1s interval");
    }

    #[test]
    fn totals_accumulate_even_when_propose_short_circuits() {
        let mut mgr = BufferManager::new(16 * 1024, 0.05);
        mgr.sample(100, Duration::from_millis(10));
        mgr.sample(200, Duration::from_millis(10));
        assert_eq!(mgr.total_bytes, 300);
    }
}
