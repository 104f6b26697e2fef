// Data processing pipeline: ingestion, processing, and storage

pub mod dataset;
pub mod ingestion;
pub mod processing;
pub mod storage;

pub use dataset::{Dataset, DatasetName, Row, Value};
