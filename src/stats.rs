use serde::{Deserialize, Serialize};

/// Percentile ranks reported in every snapshot.
pub const P50: f64 = 0.5;
pub const P75: f64 = 0.75;
pub const P95: f64 = 0.95;
pub const P99: f64 = 0.99;
pub const P999: f64 = 0.999;

/// Online latency statistics for one benchmark.
///
/// Durations (milliseconds) are kept in ascending order so order statistics
/// are plain index lookups; mean and mean-of-squares are updated
/// incrementally on every insertion.
#[derive(Clone, Debug, Default)]
pub struct RunningStats {
    durations: Vec<f64>,
    mean: f64,
    mean_sq: f64,
}

/// Point-in-time view of a [`RunningStats`]. A field is `None` while there
/// are too few samples to define it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub count: usize,
    pub avg: Option<f64>,
    pub stdev: Option<f64>,
    pub min: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    #[serde(rename = "p99.9")]
    pub p999: Option<f64>,
    pub max: Option<f64>,
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, duration: f64) {
        let index = insertion_point(&self.durations, duration);
        self.durations.insert(index, duration);

        let n = self.durations.len() as f64;
        self.mean += (duration - self.mean) / n;
        self.mean_sq += (duration * duration - self.mean_sq) / n;
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    /// Recorded durations, ascending.
    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    pub fn mean(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.mean)
    }

    pub fn mean_of_squares(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.mean_sq)
    }

    /// Bias-corrected sample variance, defined for two or more samples.
    pub fn variance(&self) -> Option<f64> {
        let n = self.len();
        if n < 2 {
            return None;
        }
        let n = n as f64;
        Some(n / (n - 1.0) * (self.mean_sq - self.mean * self.mean))
    }

    pub fn stdev(&self) -> Option<f64> {
        self.variance().map(|v| v.max(0.0).sqrt())
    }

    pub fn percentile(&self, p: f64) -> Option<f64> {
        percentile(p, &self.durations)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            count: self.len(),
            avg: self.mean(),
            stdev: self.stdev(),
            min: self.percentile(0.0),
            p50: self.percentile(P50),
            p75: self.percentile(P75),
            p95: self.percentile(P95),
            p99: self.percentile(P99),
            p999: self.percentile(P999),
            max: self.percentile(1.0),
        }
    }
}

impl StatsSnapshot {
    pub fn ops_per_sec(&self) -> Option<f64> {
        self.avg.filter(|avg| *avg > 0.0).map(|avg| 1e3 / avg)
    }
}

/// Leftmost position at which `value` keeps `sorted` ascending.
pub fn insertion_point(sorted: &[f64], value: f64) -> usize {
    sorted.partition_point(|&x| x < value)
}

/// Nearest-rank percentile of an ascending slice: `max(0, ceil(n·p) − 1)`.
pub fn percentile(p: f64, sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (sorted.len() as f64 * p).ceil().max(1.0) as usize;
    let index = (rank - 1).min(sorted.len() - 1);
    Some(sorted[index])
}
