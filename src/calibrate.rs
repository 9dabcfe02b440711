use std::time::Duration;

/// Upper bound on calls folded into one sample.
const MAX_PER_SAMPLE: usize = 10_000_000;

/// Batch size controller for pure measurement.
///
/// A batch whose total time falls below the target latency grows the batch
/// to `ceil(target / per_call)` so that fixed overhead and timer resolution
/// are amortized. The size only ever grows, and a pinned size never changes.
#[derive(Clone, Debug)]
pub struct Batching {
    per_sample: usize,
    pinned: bool,
    target: Duration,
}

impl Batching {
    pub fn adaptive(initial: usize, target: Duration) -> Self {
        Self {
            per_sample: initial.clamp(1, MAX_PER_SAMPLE),
            pinned: false,
            target,
        }
    }

    pub fn pinned(per_sample: usize) -> Self {
        Self {
            per_sample: per_sample.max(1),
            pinned: true,
            target: Duration::ZERO,
        }
    }

    pub fn per_sample(&self) -> usize {
        self.per_sample
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Record a batch of `per_sample()` calls that took `elapsed` and return
    /// the per-call duration in milliseconds.
    pub fn observe(&mut self, elapsed: Duration) -> f64 {
        let per_call_ns = elapsed.as_nanos() as f64 / self.per_sample as f64;

        if !self.pinned && elapsed < self.target {
            let target_ns = self.target.as_nanos() as f64;
            let wanted = if per_call_ns > 0.0 {
                (target_ns / per_call_ns).ceil().min(MAX_PER_SAMPLE as f64) as usize
            } else {
                // below timer resolution
                self.per_sample.saturating_mul(2)
            };
            self.per_sample = self.per_sample.max(wanted).min(MAX_PER_SAMPLE);
        }

        per_call_ns / 1e6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_to_reach_target() {
        let mut b = Batching::adaptive(1, Duration::from_millis(10));
        let per_call = b.observe(Duration::from_micros(250));
        assert!((per_call - 0.25).abs() < 1e-12);
        assert_eq!(b.per_sample(), 40);

        // 40 calls at 0.2ms each = 8ms, still short
        let per_call = b.observe(Duration::from_millis(8));
        assert!((per_call - 0.2).abs() < 1e-12);
        assert_eq!(b.per_sample(), 50);
    }

    #[test]
    fn never_shrinks() {
        let mut b = Batching::adaptive(100, Duration::from_millis(1));
        // slow batch, above target
        b.observe(Duration::from_millis(50));
        assert_eq!(b.per_sample(), 100);
        // fast batch: 9us per call needs 112 calls for 1ms
        b.observe(Duration::from_micros(900));
        assert_eq!(b.per_sample(), 112);
        b.observe(Duration::from_secs(1));
        assert_eq!(b.per_sample(), 112);
    }

    #[test]
    fn pinned_size_is_fixed() {
        let mut b = Batching::pinned(3);
        assert!(b.is_pinned());
        let per_call = b.observe(Duration::from_micros(3));
        assert!((per_call - 0.001).abs() < 1e-12);
        assert_eq!(b.per_sample(), 3);
    }

    #[test]
    fn zero_elapsed_doubles_and_is_capped() {
        let mut b = Batching::adaptive(4, Duration::from_millis(1));
        assert_eq!(b.observe(Duration::ZERO), 0.0);
        assert_eq!(b.per_sample(), 8);

        let mut big = Batching::adaptive(MAX_PER_SAMPLE, Duration::from_secs(1));
        big.observe(Duration::from_nanos(1));
        assert_eq!(big.per_sample(), MAX_PER_SAMPLE);
    }
}
