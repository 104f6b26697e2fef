use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::app::ports::ObjectSinkPort;
use crate::common::constants::{LOG_TIMESTAMP_FORMAT, RUN_LOG_FILE, RUN_LOG_HEADER, RUN_LOG_KEY};
use crate::common::error::{PipelineError, Result};

/// Status recorded for a dataset in the run log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Pass,
    Fail,
    /// The dataset has no validation stage
    Unvalidated,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pass => "PASS",
            RunStatus::Fail => "FAIL",
            RunStatus::Unvalidated => "UNVALIDATED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(RunStatus::Pass),
            "FAIL" => Ok(RunStatus::Fail),
            "UNVALIDATED" => Ok(RunStatus::Unvalidated),
            other => Err(format!("unknown run status '{}'", other)),
        }
    }
}

/// One append-only line of the run log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub dataset: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub validation_status: RunStatus,
    pub timestamp: DateTime<Utc>,
}

impl RunRecord {
    fn to_fields(&self) -> [String; 5] {
        [
            self.dataset.clone(),
            self.rows_in.to_string(),
            self.rows_out.to_string(),
            self.validation_status.to_string(),
            self.timestamp.format(LOG_TIMESTAMP_FORMAT).to_string(),
        ]
    }

    fn from_fields(record: &csv::StringRecord) -> Result<Self> {
        let field = |idx: usize| {
            record
                .get(idx)
                .ok_or_else(|| PipelineError::Input(format!("run log line missing field {}", idx)))
        };
        let parse_count = |idx: usize| -> Result<usize> {
            field(idx)?
                .parse()
                .map_err(|e| PipelineError::Input(format!("run log count: {}", e)))
        };
        let timestamp = NaiveDateTime::parse_from_str(field(4)?, LOG_TIMESTAMP_FORMAT)
            .map_err(|e| PipelineError::Input(format!("run log timestamp: {}", e)))?
            .and_utc();

        Ok(Self {
            dataset: field(0)?.to_string(),
            rows_in: parse_count(1)?,
            rows_out: parse_count(2)?,
            validation_status: field(3)?.parse().map_err(PipelineError::Input)?,
            timestamp,
        })
    }
}

/// Append-only CSV run log, mirrored whole to the sink after each append
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(metadata_dir: &Path) -> Self {
        Self {
            path: metadata_dir.join(RUN_LOG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record`, writing the header first if the log does not exist yet.
    pub fn append(&self, record: &RunRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let is_new = !self.path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::Writer::from_writer(file);
        if is_new {
            writer.write_record(RUN_LOG_HEADER)?;
        }
        writer.write_record(record.to_fields())?;
        writer.flush()?;
        Ok(())
    }

    pub fn records(&self) -> Result<Vec<RunRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        reader
            .records()
            .map(|record| RunRecord::from_fields(&record?))
            .collect()
    }

    /// Restore the local log from the sink copy when only the sink has one,
    /// so appends continue the published history.
    pub async fn seed_from(&self, sink: &dyn ObjectSinkPort) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }
        let sink_err = |e: String| PipelineError::Sink(format!("{}: {}", RUN_LOG_KEY, e));
        if !sink.exists(RUN_LOG_KEY).await.map_err(sink_err)? {
            return Ok(false);
        }
        let Some(bytes) = sink.read(RUN_LOG_KEY).await.map_err(sink_err)? else {
            return Ok(false);
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, bytes)?;
        Ok(true)
    }

    /// Upload the whole local log to its sink key.
    pub async fn mirror(&self, sink: &dyn ObjectSinkPort) -> Result<()> {
        let bytes = fs::read(&self.path)?;
        sink.upload(RUN_LOG_KEY, bytes, "text/csv")
            .await
            .map_err(|e| PipelineError::Sink(format!("{}: {}", RUN_LOG_KEY, e)))
    }
}
