//! Per-benchmark view of the event stream, as shown to the user.

use serde::Serialize;

use crate::complexity::Expression;
use crate::protocol::Event;
use crate::registry::{BenchId, Mode, Registry};
use crate::stats::StatsSnapshot;
use crate::worker::BenchState;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchReport {
    pub id: BenchId,
    pub name: String,
    #[serde(skip)]
    pub mode: Mode,
    pub state: BenchState,
    pub stats: Option<StatsSnapshot>,
    pub complexity: Option<Expression>,
    pub objective: Option<f64>,
    pub complexity_samples: usize,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_sizes: Vec<u64>,
}

/// Latest known state of every registered benchmark.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Report {
    benches: Vec<BenchReport>,
}

impl Report {
    pub fn new(registry: &Registry) -> Self {
        let benches = registry
            .iter()
            .map(|b| BenchReport {
                id: b.id,
                name: b.name.clone(),
                mode: b.mode,
                state: BenchState::Pending,
                stats: None,
                complexity: None,
                objective: None,
                complexity_samples: 0,
                error: None,
                failed_sizes: Vec::new(),
            })
            .collect();
        Self { benches }
    }

    /// Fold one event in. Events for unknown ids, or arriving after the
    /// benchmark reached a terminal state, are ignored.
    pub fn apply(&mut self, event: &Event) {
        let Some(bench) = self.benches.get_mut(event.bench_id()) else {
            return;
        };
        if bench.state.is_terminal() {
            return;
        }
        match event {
            Event::Start { .. } => bench.state = BenchState::Running,
            Event::Stats { measured, .. } => bench.stats = Some(measured.clone()),
            Event::Complexity {
                measured,
                objective,
                samples,
                ..
            } => {
                bench.complexity = Some(measured.clone());
                bench.objective = Some(*objective);
                bench.complexity_samples = *samples;
            }
            Event::Done { .. } => bench.state = BenchState::Done,
            Event::Failed { error, sizes, .. } => {
                bench.state = BenchState::Failed;
                bench.error = Some(error.clone());
                bench.failed_sizes = sizes.clone();
            }
        }
    }

    pub fn benches(&self) -> &[BenchReport] {
        &self.benches
    }

    pub fn total(&self) -> usize {
        self.benches.len()
    }

    pub fn finished(&self) -> usize {
        self.benches.iter().filter(|b| b.state.is_terminal()).count()
    }

    pub fn failed(&self) -> usize {
        self.count(BenchState::Failed)
    }

    pub fn running(&self) -> usize {
        self.count(BenchState::Running)
    }

    fn count(&self, state: BenchState) -> usize {
        self.benches.iter().filter(|b| b.state == state).count()
    }

    pub fn progress(&self) -> f64 {
        if self.benches.is_empty() {
            1.0
        } else {
            self.finished() as f64 / self.total() as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.finished() == self.total()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complexity::Sample;
    use crate::registry::Benchmark;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(Benchmark::pure("a", || Ok(()))).unwrap();
        registry
            .register(Benchmark::new("b", |_: &u64| Ok(())).sizes(1, |s| Ok(s[0])))
            .unwrap();
        registry
    }

    #[test]
    fn tracks_lifecycle() {
        let mut report = Report::new(&registry());
        assert_eq!(report.progress(), 0.0);

        report.apply(&Event::Start { bench_id: 0 });
        report.apply(&Event::Start { bench_id: 1 });
        assert_eq!(report.running(), 2);

        let measured = StatsSnapshot {
            count: 1,
            ..Default::default()
        };
        report.apply(&Event::Stats {
            bench_id: 0,
            measured: measured.clone(),
        });
        report.apply(&Event::Complexity {
            bench_id: 1,
            measured: Expression::variable(0),
            objective: 0.5,
            samples: 1,
            sample: Sample {
                duration: 0.5,
                sizes: vec![3],
            },
        });
        report.apply(&Event::Done { bench_id: 0 });
        report.apply(&Event::Failed {
            bench_id: 1,
            error: "boom".into(),
            sizes: vec![7],
        });

        let [a, b] = report.benches() else {
            panic!("expected two benchmarks");
        };
        assert_eq!(a.state, BenchState::Done);
        assert_eq!(a.stats.as_ref(), Some(&measured));
        assert_eq!(b.state, BenchState::Failed);
        assert_eq!(b.complexity, Some(Expression::variable(0)));
        assert_eq!(b.failed_sizes, vec![7]);
        assert_eq!(report.failed(), 1);
        assert!(report.is_complete());
        assert_eq!(report.progress(), 1.0);
    }

    #[test]
    fn terminal_state_is_sticky() {
        let mut report = Report::new(&registry());
        report.apply(&Event::Done { bench_id: 0 });
        report.apply(&Event::Failed {
            bench_id: 0,
            error: "late".into(),
            sizes: vec![],
        });
        report.apply(&Event::Done { bench_id: 42 });
        assert_eq!(report.benches()[0].state, BenchState::Done);
        assert_eq!(report.benches()[0].error, None);
    }
}
