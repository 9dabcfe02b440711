use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::complexity::EvolutionSettings;
use crate::system::SystemInfo;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Run-wide measurement knobs. Missing fields in a config file fall back to
/// the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Pure-measurement trials per benchmark.
    pub iterations: usize,
    /// Size-varying trials per benchmark.
    pub complexity_iterations: usize,
    /// Initial batch size for pure trials.
    pub iterations_per_sample: usize,
    /// Batch time (ms) below which the batch size grows.
    pub target_latency: f64,
    pub population_size: usize,
    pub workers_count: usize,
    /// Upper bound of each randomly drawn size.
    pub max_size: u64,
    pub crossover_skip: f64,
    pub mutation_skip: f64,
    /// Where finished benchmarks dump their raw durations.
    pub results_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            iterations: 100,
            complexity_iterations: 100,
            iterations_per_sample: 1,
            target_latency: 10.0,
            population_size: 64,
            workers_count: 1,
            max_size: 1024,
            crossover_skip: 0.5,
            mutation_skip: 0.5,
            results_dir: None,
        }
    }
}

/// Values given explicitly by the user, e.g. on the command line.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub iterations: Option<usize>,
    pub complexity_iterations: Option<usize>,
    pub iterations_per_sample: Option<usize>,
    pub target_latency: Option<f64>,
    pub population_size: Option<usize>,
    pub workers_count: Option<usize>,
    pub max_size: Option<u64>,
    pub results_dir: Option<PathBuf>,
}

impl Config {
    /// Defaults sized for the host: one worker per spare CPU.
    pub fn for_host(system: &SystemInfo) -> Self {
        Self {
            workers_count: system.default_workers(),
            ..Self::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_overrides(mut self, o: ConfigOverrides) -> Self {
        if let Some(v) = o.iterations {
            self.iterations = v;
        }
        if let Some(v) = o.complexity_iterations {
            self.complexity_iterations = v;
        }
        if let Some(v) = o.iterations_per_sample {
            self.iterations_per_sample = v;
        }
        if let Some(v) = o.target_latency {
            self.target_latency = v;
        }
        if let Some(v) = o.population_size {
            self.population_size = v;
        }
        if let Some(v) = o.workers_count {
            self.workers_count = v;
        }
        if let Some(v) = o.max_size {
            self.max_size = v;
        }
        if o.results_dir.is_some() {
            self.results_dir = o.results_dir;
        }
        self
    }

    /// Coerce out-of-range values into something runnable.
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        self.iterations_per_sample = self.iterations_per_sample.max(1);
        self.population_size = self.population_size.max(2);
        self.workers_count = self.workers_count.max(1);
        if !(self.target_latency.is_finite() && self.target_latency >= 0.0) {
            self.target_latency = 0.0;
        }
        self.crossover_skip = probability(self.crossover_skip, defaults.crossover_skip);
        self.mutation_skip = probability(self.mutation_skip, defaults.mutation_skip);
        self
    }

    /// Saturates at `Duration::MAX` for values beyond its range.
    pub fn target_latency(&self) -> Duration {
        Duration::try_from_secs_f64(self.target_latency.max(0.0) / 1e3).unwrap_or(Duration::MAX)
    }

    pub fn evolution(&self) -> EvolutionSettings {
        EvolutionSettings {
            population_size: self.population_size,
            crossover_skip: self.crossover_skip,
            mutation_skip: self.mutation_skip,
        }
    }
}

fn probability(p: f64, fallback: f64) -> f64 {
    if p.is_nan() {
        fallback
    } else {
        p.clamp(0.0, 1.0)
    }
}
