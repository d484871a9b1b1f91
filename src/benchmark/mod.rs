mod config;
mod results;
mod runner;

pub use config::{BenchmarkConfig, ConfigurationSet, SingleRunConfig};
pub use results::{AggregatedResult, RunResult};
pub use runner::BenchmarkRunner;
