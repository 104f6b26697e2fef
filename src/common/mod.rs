// Configuration, constants and the error type shared across the pipeline

pub mod config;
pub mod constants;
pub mod error;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
