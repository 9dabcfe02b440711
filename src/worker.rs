use std::collections::HashMap;
use std::hint::black_box;
use std::io;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::calibrate::Batching;
use crate::complexity::{ComplexityModel, Sample};
use crate::config::Config;
use crate::protocol::{Command, Event};
use crate::registry::{guarded, BenchId, BenchmarkDefinition, Mode, PreparedCall};
use crate::results;
use crate::stats::RunningStats;

/// Error text of the `Failed` event sent for a benchmark cut short by abort.
pub const ABORTED: &str = "aborted";

/// Lifecycle of one benchmark. `Done` and `Failed` are terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchState {
    #[default]
    Pending,
    Running,
    Done,
    Failed,
}

impl BenchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BenchState::Done | BenchState::Failed)
    }
}

enum Stop {
    Failed { error: anyhow::Error, sizes: Vec<u64> },
    Aborted,
}

impl Stop {
    fn failed(error: anyhow::Error, sizes: Vec<u64>) -> Self {
        Stop::Failed { error, sizes }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Sequential executor for a disjoint subset of the registered benchmarks.
/// Owns the statistics and complexity models of its benchmarks outright.
pub struct Worker {
    index: usize,
    benches: Vec<Arc<BenchmarkDefinition>>,
    config: Arc<Config>,
    commands: Receiver<Command>,
    events: Sender<Event>,
    states: HashMap<BenchId, BenchState>,
    stats: HashMap<BenchId, RunningStats>,
    models: HashMap<BenchId, ComplexityModel>,
    rng: StdRng,
    aborted: bool,
}

/// Start a worker on its own thread. It waits for `Run`, measures every
/// assigned benchmark once and exits.
pub fn spawn(
    index: usize,
    benches: Vec<Arc<BenchmarkDefinition>>,
    config: Arc<Config>,
    commands: Receiver<Command>,
    events: Sender<Event>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("worker-{index}"))
        .spawn(move || Worker::new(index, benches, config, commands, events).serve())
}

impl Worker {
    pub fn new(
        index: usize,
        benches: Vec<Arc<BenchmarkDefinition>>,
        config: Arc<Config>,
        commands: Receiver<Command>,
        events: Sender<Event>,
    ) -> Self {
        let states = benches.iter().map(|b| (b.id, BenchState::Pending)).collect();
        Self {
            index,
            benches,
            config,
            commands,
            events,
            states,
            stats: HashMap::new(),
            models: HashMap::new(),
            rng: StdRng::from_entropy(),
            aborted: false,
        }
    }

    /// Block until the first command; `Run` measures everything, `Abort`
    /// (or a vanished coordinator) returns without measuring.
    pub fn serve(mut self) {
        match self.commands.recv() {
            Ok(Command::Run) => self.run_all(),
            Ok(Command::Abort) | Err(_) => {
                debug!("worker {} stopped before running", self.index);
            }
        }
    }

    pub fn run_all(&mut self) {
        debug!(
            "worker {} running {} benchmark(s)",
            self.index,
            self.benches.len()
        );
        for bench in self.benches.clone() {
            if self.aborted {
                break;
            }
            self.run_bench(&bench);
        }
    }

    pub fn state(&self, id: BenchId) -> Option<BenchState> {
        self.states.get(&id).copied()
    }

    pub fn stats(&self, id: BenchId) -> Option<&RunningStats> {
        self.stats.get(&id)
    }

    pub fn model(&self, id: BenchId) -> Option<&ComplexityModel> {
        self.models.get(&id)
    }

    fn run_bench(&mut self, bench: &BenchmarkDefinition) {
        let id = bench.id;
        if self.state(id).is_some_and(BenchState::is_terminal) {
            return;
        }
        self.states.insert(id, BenchState::Running);
        self.emit(Event::Start { bench_id: id });
        debug!("worker {}: {} ({:?}) started", self.index, bench.name, bench.mode);

        match self.measure(bench) {
            Ok(()) => {
                self.states.insert(id, BenchState::Done);
                self.emit(Event::Done { bench_id: id });
                self.persist(bench);
            }
            Err(Stop::Failed { error, sizes }) => {
                warn!("{} failed at sizes {:?}: {:#}", bench.name, sizes, error);
                self.states.insert(id, BenchState::Failed);
                self.emit(Event::Failed {
                    bench_id: id,
                    error: format!("{error:#}"),
                    sizes,
                });
            }
            Err(Stop::Aborted) => {
                debug!("worker {}: {} aborted", self.index, bench.name);
                self.states.insert(id, BenchState::Failed);
                self.emit(Event::Failed {
                    bench_id: id,
                    error: ABORTED.to_string(),
                    sizes: Vec::new(),
                });
            }
        }
    }

    fn measure(&mut self, bench: &BenchmarkDefinition) -> Result<(), Stop> {
        let iterations = bench.overrides.iterations.unwrap_or(self.config.iterations);
        let complexity_iterations = bench
            .overrides
            .complexity_iterations
            .unwrap_or(self.config.complexity_iterations);
        let mut batching = match bench.overrides.iterations_per_sample {
            Some(n) => Batching::pinned(n),
            None => Batching::adaptive(
                self.config.iterations_per_sample,
                self.config.target_latency(),
            ),
        };

        let (pure, sized) = match bench.mode {
            Mode::Pure => (iterations, 0),
            Mode::Complexity => (0, complexity_iterations),
            Mode::Combined => (iterations, complexity_iterations),
        };

        for round in 0..pure.max(sized) {
            if round < pure {
                self.check_abort()?;
                self.pure_trial(bench, &mut batching)?;
            }
            if round < sized {
                self.check_abort()?;
                self.complexity_trial(bench)?;
            }
        }
        Ok(())
    }

    fn pure_trial(&mut self, bench: &BenchmarkDefinition, batching: &mut Batching) -> Result<(), Stop> {
        let call = match bench.prepare_base() {
            Some(prepared) => prepared.map_err(|e| Stop::failed(e, Vec::new()))?,
            None => {
                return Err(Stop::failed(
                    anyhow::anyhow!("no base case to measure"),
                    Vec::new(),
                ))
            }
        };
        let elapsed =
            time_calls(&call, batching.per_sample()).map_err(|e| Stop::failed(e, Vec::new()))?;
        let duration = batching.observe(elapsed);

        let stats = self.stats.entry(bench.id).or_default();
        stats.record(duration);
        let measured = stats.snapshot();
        self.emit(Event::Stats {
            bench_id: bench.id,
            measured,
        });
        Ok(())
    }

    fn complexity_trial(&mut self, bench: &BenchmarkDefinition) -> Result<(), Stop> {
        let max_size = self.config.max_size;
        let sizes: Vec<u64> = (0..bench.params_count)
            .map(|_| self.rng.gen_range(0..=max_size))
            .collect();

        let call = match bench.prepare_sized(&sizes) {
            Some(prepared) => prepared.map_err(|e| Stop::failed(e, sizes.clone()))?,
            None => {
                return Err(Stop::failed(
                    anyhow::anyhow!("no sample generator"),
                    sizes,
                ))
            }
        };
        let elapsed = time_calls(&call, 1).map_err(|e| Stop::failed(e, sizes.clone()))?;
        let duration = elapsed.as_nanos() as f64 / 1e6;

        let sample = Sample {
            duration,
            sizes: sizes.clone(),
        };
        let evolution = self.config.evolution();
        let fit = self
            .models
            .entry(bench.id)
            .or_insert_with(|| ComplexityModel::new(bench.params_count, evolution))
            .observe(duration, sizes);
        self.emit(Event::Complexity {
            bench_id: bench.id,
            measured: fit.expression,
            objective: fit.objective,
            samples: fit.samples,
            sample,
        });
        Ok(())
    }

    fn check_abort(&mut self) -> Result<(), Stop> {
        if !self.aborted {
            match self.commands.try_recv() {
                Ok(Command::Abort) | Err(TryRecvError::Disconnected) => self.aborted = true,
                Ok(Command::Run) | Err(TryRecvError::Empty) => {}
            }
        }
        if self.aborted {
            Err(Stop::Aborted)
        } else {
            Ok(())
        }
    }

    fn persist(&self, bench: &BenchmarkDefinition) {
        let Some(dir) = &self.config.results_dir else {
            return;
        };
        let durations = self
            .stats
            .get(&bench.id)
            .map(RunningStats::durations)
            .unwrap_or_default();
        match results::write_durations(dir, &bench.name, bench.id, durations) {
            Ok(path) => debug!("{}: durations written to {}", bench.name, path.display()),
            Err(err) => warn!("{}: {err}", bench.name),
        }
    }

    fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }
}

/// Time `n` back-to-back invocations. Input synthesis happened before.
fn time_calls(call: &PreparedCall, n: usize) -> anyhow::Result<Duration> {
    guarded(|| {
        let start = Instant::now();
        for _ in 0..n {
            black_box(call())?;
        }
        Ok(start.elapsed())
    })
}
