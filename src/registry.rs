//! Benchmark registration.
//!
//! A [`Registry`] is built by the host before any worker starts and handed to
//! the coordinator by reference. Definitions are immutable once registered.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;

pub type BenchId = usize;

/// One invocation of the callable under test, bound to an already
/// synthesized input.
pub type PreparedCall = Box<dyn Fn() -> anyhow::Result<()>>;

type RunFn<T> = Arc<dyn Fn(&T) -> anyhow::Result<()> + Send + Sync>;
type BaseFn<T> = Box<dyn Fn() -> anyhow::Result<T> + Send + Sync>;
type GenFn<T> = Box<dyn Fn(&[u64]) -> anyhow::Result<T> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("benchmark `{0}` has neither a base case nor a sample generator")]
    MissingInput(String),
    #[error("benchmark `{0}` has a sample generator but no size parameters")]
    NoSizeParameters(String),
}

/// How the worker measures a benchmark, derived from what was declared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Repeated calls on the base case input.
    Pure,
    /// Single calls on inputs synthesized from random size vectors.
    Complexity,
    /// Both of the above, interleaved round by round.
    Combined,
}

/// Per-benchmark overrides of the run-wide configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Overrides {
    pub iterations: Option<usize>,
    pub complexity_iterations: Option<usize>,
    pub iterations_per_sample: Option<usize>,
}

trait Workload: Send + Sync {
    fn prepare_base(&self) -> Option<anyhow::Result<PreparedCall>>;
    fn prepare_sized(&self, sizes: &[u64]) -> Option<anyhow::Result<PreparedCall>>;
}

struct Typed<T> {
    run: RunFn<T>,
    base_case: Option<BaseFn<T>>,
    gen_samples: Option<GenFn<T>>,
}

impl<T: 'static> Typed<T> {
    fn bind(&self, input: T) -> PreparedCall {
        let run = Arc::clone(&self.run);
        Box::new(move || run(&input))
    }
}

impl<T: 'static> Workload for Typed<T> {
    fn prepare_base(&self) -> Option<anyhow::Result<PreparedCall>> {
        let base = self.base_case.as_ref()?;
        Some(guarded(|| base()).map(|input| self.bind(input)))
    }

    fn prepare_sized(&self, sizes: &[u64]) -> Option<anyhow::Result<PreparedCall>> {
        let generate = self.gen_samples.as_ref()?;
        Some(guarded(|| generate(sizes)).map(|input| self.bind(input)))
    }
}

/// Run `f`, turning a panic into an error.
pub fn guarded<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow::anyhow!("panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Builder for one benchmark, generic over the input type it consumes.
pub struct Benchmark<T> {
    name: String,
    params_count: usize,
    workload: Typed<T>,
    overrides: Overrides,
}

impl Benchmark<()> {
    /// A benchmark without input.
    pub fn pure<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Benchmark::new(name, move |_: &()| f()).base_case(|| Ok(()))
    }
}

impl<T: 'static> Benchmark<T> {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params_count: 0,
            workload: Typed {
                run: Arc::new(f),
                base_case: None,
                gen_samples: None,
            },
            overrides: Overrides::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed input used for plain latency measurement.
    pub fn base_case<F>(mut self, f: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.workload.base_case = Some(Box::new(f));
        self
    }

    /// Input generator over `params_count` size dimensions, used to infer
    /// a complexity model.
    pub fn sizes<F>(mut self, params_count: usize, f: F) -> Self
    where
        F: Fn(&[u64]) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.params_count = params_count;
        self.workload.gen_samples = Some(Box::new(f));
        self
    }

    pub fn iterations(mut self, n: usize) -> Self {
        self.overrides.iterations = Some(n);
        self
    }

    pub fn complexity_iterations(mut self, n: usize) -> Self {
        self.overrides.complexity_iterations = Some(n);
        self
    }

    /// Pin the batch size; disables adaptive batching for this benchmark.
    pub fn iterations_per_sample(mut self, n: usize) -> Self {
        self.overrides.iterations_per_sample = Some(n.max(1));
        self
    }

    fn mode(&self) -> Result<Mode, RegistryError> {
        let base = self.workload.base_case.is_some();
        let sized = self.workload.gen_samples.is_some();
        if sized && self.params_count == 0 {
            return Err(RegistryError::NoSizeParameters(self.name.clone()));
        }
        match (base, sized) {
            (true, false) => Ok(Mode::Pure),
            (false, true) => Ok(Mode::Complexity),
            (true, true) => Ok(Mode::Combined),
            (false, false) => Err(RegistryError::MissingInput(self.name.clone())),
        }
    }
}

pub struct BenchmarkDefinition {
    pub id: BenchId,
    pub name: String,
    pub params_count: usize,
    pub mode: Mode,
    pub overrides: Overrides,
    workload: Box<dyn Workload>,
}

impl BenchmarkDefinition {
    /// Synthesize the base-case input. `None` when no base case exists.
    pub fn prepare_base(&self) -> Option<anyhow::Result<PreparedCall>> {
        self.workload.prepare_base()
    }

    /// Synthesize an input for `sizes`. `None` when no generator exists.
    pub fn prepare_sized(&self, sizes: &[u64]) -> Option<anyhow::Result<PreparedCall>> {
        self.workload.prepare_sized(sizes)
    }
}

impl fmt::Debug for BenchmarkDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("params_count", &self.params_count)
            .field("mode", &self.mode)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

/// Ordered collection of benchmark definitions; ids follow registration
/// order starting at 0.
#[derive(Debug, Default)]
pub struct Registry {
    benches: Vec<Arc<BenchmarkDefinition>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: 'static>(&mut self, bench: Benchmark<T>) -> Result<BenchId, RegistryError> {
        let mode = bench.mode()?;
        let id = self.benches.len();
        self.benches.push(Arc::new(BenchmarkDefinition {
            id,
            name: bench.name,
            params_count: bench.params_count,
            mode,
            overrides: bench.overrides,
            workload: Box::new(bench.workload),
        }));
        Ok(id)
    }

    pub fn get(&self, id: BenchId) -> Option<&Arc<BenchmarkDefinition>> {
        self.benches.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BenchmarkDefinition>> {
        self.benches.iter()
    }

    pub fn ids(&self) -> Vec<BenchId> {
        (0..self.benches.len()).collect()
    }

    pub fn len(&self) -> usize {
        self.benches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.benches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_registration_order() {
        let mut registry = Registry::new();
        let a = registry.register(Benchmark::pure("a", || Ok(()))).unwrap();
        let b = registry
            .register(Benchmark::new("b", |v: &Vec<u8>| {
                assert!(v.len() < 100);
                Ok(())
            })
            .sizes(1, |s| Ok(vec![0; s[0] as usize % 100])))
            .unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(1).unwrap().name, "b");
        assert_eq!(registry.ids(), vec![0, 1]);
    }

    #[test]
    fn derives_mode() {
        let mut registry = Registry::new();
        registry.register(Benchmark::pure("pure", || Ok(()))).unwrap();
        registry
            .register(Benchmark::new("sized", |_: &u64| Ok(())).sizes(1, |s| Ok(s[0])))
            .unwrap();
        registry
            .register(
                Benchmark::new("both", |_: &u64| Ok(()))
                    .sizes(2, |s| Ok(s[0] + s[1]))
                    .base_case(|| Ok(10)),
            )
            .unwrap();
        let modes: Vec<Mode> = registry.iter().map(|b| b.mode).collect();
        assert_eq!(modes, vec![Mode::Pure, Mode::Complexity, Mode::Combined]);
    }

    #[test]
    fn rejects_incomplete_definitions() {
        let mut registry = Registry::new();
        let err = registry
            .register(Benchmark::new("nothing", |_: &u64| Ok(())))
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingInput(name) if name == "nothing"));

        let err = registry
            .register(Benchmark::new("no-dims", |_: &u64| Ok(())).sizes(0, |_| Ok(1)))
            .unwrap_err();
        assert!(matches!(err, RegistryError::NoSizeParameters(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn overrides_are_recorded() {
        let mut registry = Registry::new();
        registry
            .register(
                Benchmark::pure("tuned", || Ok(()))
                    .iterations(3)
                    .complexity_iterations(4)
                    .iterations_per_sample(0),
            )
            .unwrap();
        let overrides = registry.get(0).unwrap().overrides;
        assert_eq!(overrides.iterations, Some(3));
        assert_eq!(overrides.complexity_iterations, Some(4));
        assert_eq!(overrides.iterations_per_sample, Some(1));
    }

    #[test]
    fn prepared_calls_run_on_synthesized_input() {
        let mut registry = Registry::new();
        registry
            .register(
                Benchmark::new("even", |n: &u64| {
                    anyhow::ensure!(n % 2 == 0, "odd input {n}");
                    Ok(())
                })
                .sizes(1, |s| Ok(s[0] * 2))
                .base_case(|| Ok(3)),
            )
            .unwrap();
        let bench = registry.get(0).unwrap();

        let call = bench.prepare_sized(&[5]).unwrap().unwrap();
        assert!(call().is_ok());

        let call = bench.prepare_base().unwrap().unwrap();
        let err = call().unwrap_err();
        assert_eq!(err.to_string(), "odd input 3");
    }

    #[test]
    fn generator_panics_become_errors() {
        let mut registry = Registry::new();
        registry
            .register(Benchmark::new("boom", |_: &u64| Ok(())).sizes(1, |_| panic!("no input")))
            .unwrap();
        let err = match registry.get(0).unwrap().prepare_sized(&[1]).unwrap() {
            Ok(_) => panic!("expected a failure"),
            Err(err) => err,
        };
        assert_eq!(err.to_string(), "panicked: no input");
        assert!(registry.get(0).unwrap().prepare_base().is_none());
    }
}
