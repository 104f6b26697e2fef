use crate::common::constants::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BASE_CURRENCY, DEFAULT_CHUNK_SIZE, DEFAULT_INPUT_TIMEOUT_SECS,
    DEFAULT_MAX_RETRIES,
    DEFAULT_RATES_BASE_URL, DEFAULT_RATE_TIMEOUT_SECS, INGESTION_DATE_FORMAT,
};
use crate::common::error::{PipelineError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Config file picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "etl.toml";

/// Everything one pipeline run needs. Built once at startup and passed into the
/// driver; nothing in the pipeline reads process-wide state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Local path or http(s) URI of the raw clickstream CSV
    pub clickstream_input: String,
    /// Local path or http(s) URI of the raw transactions CSV
    pub transactions_input: String,
    /// Whole-request timeout for downloading remote inputs
    pub input_timeout_secs: u64,
    pub chunk_size: usize,
    pub raw_rates_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub metadata_dir: PathBuf,
    pub log_dir: PathBuf,
    pub pushgateway_url: Option<String>,
    /// Logical date of the batch; defaults to the current UTC date when unset
    pub ingestion_date: Option<NaiveDate>,
    pub rates: RatesConfig,
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RatesConfig {
    pub api_key: String,
    pub base_url: String,
    pub base_currency: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkBackend {
    Fs,
    Supabase,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub backend: SinkBackend,
    /// Root directory for the filesystem backend
    pub root: PathBuf,
    pub bucket: Option<String>,
    pub url: Option<String>,
    pub service_key: Option<String>,
    pub prefix: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clickstream_input: "clickstream.csv".to_string(),
            transactions_input: "transactions.csv".to_string(),
            input_timeout_secs: DEFAULT_INPUT_TIMEOUT_SECS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            raw_rates_dir: PathBuf::from("data/raw/api_currency"),
            staging_dir: PathBuf::from("data/processed"),
            metadata_dir: PathBuf::from("data/metadata"),
            log_dir: PathBuf::from("logs"),
            pushgateway_url: None,
            ingestion_date: None,
            rates: RatesConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_RATES_BASE_URL.to_string(),
            base_currency: DEFAULT_BASE_CURRENCY.to_string(),
            timeout_secs: DEFAULT_RATE_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            backend: SinkBackend::Fs,
            root: PathBuf::from("data/sink"),
            bucket: None,
            url: None,
            service_key: None,
            prefix: None,
        }
    }
}

impl RatesConfig {
    /// `{base_url}/{api_key}/latest/{base_currency}`
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}/latest/{}",
            self.base_url.trim_end_matches('/'),
            self.api_key,
            self.base_currency
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl PipelineConfig {
    /// Load from an explicit TOML file, or from `etl.toml` if it exists, or
    /// fall back to defaults. Environment overrides are applied afterwards.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `ETL_*` / `SUPABASE_*` overrides using the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ETL_CLICKSTREAM_INPUT") {
            self.clickstream_input = v;
        }
        if let Some(v) = lookup("ETL_TRANSACTIONS_INPUT") {
            self.transactions_input = v;
        }
        if let Some(v) = lookup("ETL_INPUT_TIMEOUT_SECS") {
            self.input_timeout_secs = parse_setting("ETL_INPUT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("ETL_API_KEY") {
            self.rates.api_key = v;
        }
        if let Some(v) = lookup("ETL_CHUNK_SIZE") {
            self.chunk_size = parse_setting("ETL_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = lookup("ETL_MAX_RETRIES") {
            self.rates.max_retries = parse_setting("ETL_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("ETL_BACKOFF_BASE") {
            self.rates.backoff_base = parse_setting("ETL_BACKOFF_BASE", &v)?;
        }
        if let Some(v) = lookup("ETL_INGESTION_DATE") {
            self.ingestion_date = Some(parse_ingestion_date(&v)?);
        }
        if let Some(v) = lookup("ETL_SINK_BACKEND") {
            self.sink.backend = match v.to_lowercase().as_str() {
                "fs" => SinkBackend::Fs,
                "supabase" => SinkBackend::Supabase,
                other => {
                    return Err(PipelineError::Config(format!("Unknown sink backend '{}'", other)))
                }
            };
        }
        if let Some(v) = lookup("ETL_SINK_ROOT") {
            self.sink.root = PathBuf::from(v);
        }
        if let Some(v) = lookup("ETL_BUCKET") {
            self.sink.bucket = Some(v);
        }
        if let Some(v) = lookup("SUPABASE_URL") {
            self.sink.url = Some(v);
        }
        if let Some(v) = lookup("SUPABASE_SERVICE_ROLE_KEY") {
            self.sink.service_key = Some(v);
        }
        if let Some(v) = lookup("ETL_PUSHGATEWAY_URL") {
            self.pushgateway_url = Some(v);
        }
        Ok(())
    }

    pub fn input_timeout(&self) -> Duration {
        Duration::from_secs(self.input_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(PipelineError::Config("chunk_size must be at least 1".to_string()));
        }
        if self.input_timeout_secs == 0 {
            return Err(PipelineError::Config("input_timeout_secs must be at least 1".to_string()));
        }
        if self.rates.max_retries == 0 {
            return Err(PipelineError::Config("max_retries must be at least 1".to_string()));
        }
        if !self.rates.backoff_base.is_finite() || self.rates.backoff_base <= 0.0 {
            return Err(PipelineError::Config(format!(
                "backoff_base must be a positive number, got {}",
                self.rates.backoff_base
            )));
        }
        if self.rates.api_key.trim().is_empty() {
            return Err(PipelineError::Config(
                "rate API key is missing (set rates.api_key or ETL_API_KEY)".to_string(),
            ));
        }
        if self.sink.backend == SinkBackend::Supabase
            && (self.sink.url.is_none() || self.sink.bucket.is_none() || self.sink.service_key.is_none())
        {
            return Err(PipelineError::Config(
                "supabase sink needs url, bucket and service_key".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn parse_ingestion_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), INGESTION_DATE_FORMAT).map_err(|e| {
        PipelineError::Config(format!("Invalid ingestion date '{}': {}", value, e))
    })
}

fn parse_setting<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| PipelineError::Config(format!("Invalid value for {}: '{}' ({})", key, value, e)))
}
