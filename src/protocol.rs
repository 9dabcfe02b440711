//! Messages between the coordinator and its workers.

use serde::{Deserialize, Serialize};

use crate::complexity::{Expression, Sample};
use crate::registry::BenchId;
use crate::stats::StatsSnapshot;

/// Coordinator → worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Command {
    Run,
    Abort,
}

/// Worker → coordinator. Per benchmark a worker sends `Start`, then any
/// number of `Stats`/`Complexity` in measurement order, then exactly one of
/// `Done`/`Failed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Event {
    Start {
        bench_id: BenchId,
    },
    Stats {
        bench_id: BenchId,
        measured: StatsSnapshot,
    },
    /// `measured` is the best expression after folding in `sample`;
    /// `objective` is its score over all `samples` seen so far.
    Complexity {
        bench_id: BenchId,
        measured: Expression,
        #[serde(with = "crate::json_float")]
        objective: f64,
        samples: usize,
        sample: Sample,
    },
    Done {
        bench_id: BenchId,
    },
    Failed {
        bench_id: BenchId,
        error: String,
        sizes: Vec<u64>,
    },
}

impl Event {
    pub fn bench_id(&self) -> BenchId {
        match self {
            Event::Start { bench_id }
            | Event::Stats { bench_id, .. }
            | Event::Complexity { bench_id, .. }
            | Event::Done { bench_id }
            | Event::Failed { bench_id, .. } => *bench_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Done { .. } | Event::Failed { .. })
    }
}
