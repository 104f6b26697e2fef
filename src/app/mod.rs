// Application layer: ports and the run use case

pub mod pipeline_driver;
pub mod ports;

pub use pipeline_driver::{DatasetOutcome, PipelineDriver, RunSummary, SkipReason};
