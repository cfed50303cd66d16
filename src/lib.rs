pub mod cli;
pub mod collector;
pub mod config;
pub mod metrics;
pub mod qstat;
pub mod ssh;
pub mod utils;

pub use cli::Cli;
pub use collector::{collect_from_stream, run_pass, run_periodic, PassReport, PassSettings};
pub use config::Config;
pub use metrics::{GaugeRegistry, JobSample, MetricSink};
