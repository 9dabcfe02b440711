//! Micro-benchmark harness: latency statistics per benchmark plus an
//! evolved closed-form model of how run time scales with input size.

pub mod calibrate;
pub mod complexity;
pub mod config;
pub mod coordinator;
mod json_float;
pub mod protocol;
pub mod registry;
pub mod report;
pub mod results;
pub mod stats;
pub mod system;
pub mod worker;

pub use complexity::{ComplexityModel, Expression};
pub use config::{Config, ConfigOverrides};
pub use coordinator::{partition, Coordinator, CoordinatorError};
pub use protocol::{Command, Event};
pub use registry::{BenchId, Benchmark, Mode, Registry, RegistryError};
pub use report::{BenchReport, Report};
pub use stats::{RunningStats, StatsSnapshot};
pub use system::SystemInfo;
pub use worker::BenchState;
