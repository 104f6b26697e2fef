use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Rate fetch failed after {attempts} attempts: {last_failure}")]
    RateFetch { attempts: u32, last_failure: String },

    #[error("Validation failed for {dataset}: {}", issues.join("; "))]
    Validation { dataset: String, issues: Vec<String> },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Object sink error: {0}")]
    Sink(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
