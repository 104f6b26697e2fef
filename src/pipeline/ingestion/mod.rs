// Pipeline ingestion: exchange rates with retry, chunked dataset reading

pub mod rates;
pub mod reader;
pub mod retry;

pub use rates::{RateMap, RateSource};
pub use reader::{read_and_dedupe, InputSource, ReadOutcome};
pub use retry::RetryPolicy;
