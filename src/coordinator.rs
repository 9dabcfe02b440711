use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, info};
use thiserror::Error;

use crate::config::Config;
use crate::protocol::{Command, Event};
use crate::registry::{BenchId, Registry};
use crate::worker;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        index: usize,
        #[source]
        source: io::Error,
    },
    #[error("worker {0} panicked")]
    WorkerPanicked(usize),
}

/// Split `ids` over `workers` round-robin. Every id lands in exactly one
/// part, parts keep the input order and never differ in size by more than
/// one. There are never more parts than ids (and always at least one).
pub fn partition(ids: &[BenchId], workers: usize) -> Vec<Vec<BenchId>> {
    let workers = workers.clamp(1, ids.len().max(1));
    let mut parts = vec![Vec::new(); workers];
    for (i, &id) in ids.iter().enumerate() {
        parts[i % workers].push(id);
    }
    parts
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Owner of the worker threads. Workers wait for [`Coordinator::run`];
/// their events are relayed through a single channel in arrival order.
pub struct Coordinator {
    assignment: Vec<Vec<BenchId>>,
    commands: Vec<Sender<Command>>,
    events: Receiver<Event>,
    handles: Vec<(usize, JoinHandle<()>)>,
}

impl Coordinator {
    /// Partition the registry and start one worker per non-empty part.
    pub fn start(registry: &Registry, config: &Config) -> Result<Self, CoordinatorError> {
        let config = Arc::new(config.clone().normalized());
        let assignment = partition(&registry.ids(), config.workers_count);
        let (event_tx, events) = mpsc::channel();

        let mut commands = Vec::new();
        let mut handles = Vec::new();
        for (index, ids) in assignment.iter().enumerate() {
            if ids.is_empty() {
                continue;
            }
            let benches = ids
                .iter()
                .filter_map(|&id| registry.get(id).cloned())
                .collect();
            let (cmd_tx, cmd_rx) = mpsc::channel();
            let handle = worker::spawn(
                index,
                benches,
                Arc::clone(&config),
                cmd_rx,
                event_tx.clone(),
            )
            .map_err(|source| CoordinatorError::Spawn { index, source })?;
            debug!("worker {index} assigned {ids:?}");
            commands.push(cmd_tx);
            handles.push((index, handle));
        }

        info!(
            "{} benchmark(s) over {} worker(s)",
            registry.len(),
            handles.len()
        );
        Ok(Self {
            assignment,
            commands,
            events,
            handles,
        })
    }

    pub fn assignment(&self) -> &[Vec<BenchId>] {
        &self.assignment
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    pub fn run(&self) {
        self.broadcast(Command::Run);
    }

    /// Ask every worker to stop. The benchmark in flight reports `Failed`;
    /// the rest of the assignment is skipped.
    pub fn abort(&self) {
        info!("aborting");
        self.broadcast(Command::Abort);
    }

    fn broadcast(&self, command: Command) {
        for tx in &self.commands {
            // a worker that already finished has dropped its receiver
            let _ = tx.send(command);
        }
    }

    /// Next event, blocking. `None` once every worker has exited.
    pub fn recv(&self) -> Option<Event> {
        self.events.recv().ok()
    }

    pub fn try_recv(&self) -> Result<Event, TryRecvError> {
        self.events.try_recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Event, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    /// Wait for all workers to exit.
    pub fn join(self) -> Result<(), CoordinatorError> {
        drop(self.commands);
        let mut result = Ok(());
        for (index, handle) in self.handles {
            if handle.join().is_err() && result.is_ok() {
                result = Err(CoordinatorError::WorkerPanicked(index));
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Benchmark;

    #[test]
    fn partition_is_round_robin() {
        let ids: Vec<BenchId> = (0..7).collect();
        assert_eq!(
            partition(&ids, 3),
            vec![vec![0, 3, 6], vec![1, 4], vec![2, 5]]
        );
        assert_eq!(partition(&ids, 0), vec![ids.clone()]);
        assert_eq!(partition(&[], 2), vec![Vec::<BenchId>::new()]);
    }

    #[test]
    fn more_workers_than_benchmarks() {
        assert_eq!(partition(&[0, 1], 4), vec![vec![0], vec![1]]);
        assert_eq!(partition(&[0, 1], usize::MAX), vec![vec![0], vec![1]]);

        let mut registry = Registry::new();
        registry.register(Benchmark::pure("a", || Ok(()))).unwrap();
        registry.register(Benchmark::pure("b", || Ok(()))).unwrap();
        let config = Config {
            workers_count: 4,
            iterations: 2,
            ..Config::default()
        };
        let coordinator = Coordinator::start(&registry, &config).unwrap();
        assert_eq!(coordinator.workers(), 2);
        assert_eq!(coordinator.assignment().len(), 2);
        coordinator.run();
        let done = std::iter::from_fn(|| coordinator.recv())
            .filter(|e| matches!(e, Event::Done { .. }))
            .count();
        assert_eq!(done, 2);
        coordinator.join().unwrap();
    }

    #[test]
    fn huge_worker_count_is_capped() {
        let mut registry = Registry::new();
        for name in ["a", "b", "c"] {
            registry.register(Benchmark::pure(name, || Ok(()))).unwrap();
        }
        let config = Config {
            workers_count: usize::MAX,
            iterations: 1,
            ..Config::default()
        };
        let coordinator = Coordinator::start(&registry, &config).unwrap();
        assert_eq!(coordinator.workers(), 3);
        coordinator.run();
        let terminal = std::iter::from_fn(|| coordinator.recv())
            .filter(Event::is_terminal)
            .count();
        assert_eq!(terminal, 3);
        coordinator.join().unwrap();
    }

    #[test]
    fn recv_ends_when_workers_exit() {
        let mut registry = Registry::new();
        registry.register(Benchmark::pure("a", || Ok(()))).unwrap();
        let config = Config {
            iterations: 1,
            ..Config::default()
        };
        let coordinator = Coordinator::start(&registry, &config).unwrap();
        coordinator.abort();
        assert_eq!(coordinator.recv(), None);
        assert!(matches!(
            coordinator.try_recv(),
            Err(TryRecvError::Disconnected)
        ));
        coordinator.join().unwrap();
    }

    #[test]
    fn empty_registry_has_no_workers() {
        let coordinator = Coordinator::start(&Registry::new(), &Config::default()).unwrap();
        assert_eq!(coordinator.workers(), 0);
        coordinator.run();
        assert_eq!(coordinator.recv(), None);
        coordinator.join().unwrap();
    }
}
