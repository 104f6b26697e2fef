// Publication: staged CSV files, durable sink uploads, run metadata and alerts

pub mod alerts;
pub mod run_log;

pub use alerts::AlertLog;
pub use run_log::{RunLog, RunRecord, RunStatus};

use chrono::NaiveDate;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::app::ports::{ClockPort, ObjectSinkPort};
use crate::common::constants::{processed_key, staging_file_name, INGESTION_DATE_FORMAT};
use crate::common::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::dataset::{Dataset, DatasetName};
use crate::pipeline::ingestion::reader::{read_chunks, ReadOutcome};
use crate::pipeline::processing::dedupe::DedupeStats;

/// Where a published dataset landed
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub staging_path: PathBuf,
    pub key: String,
    pub bytes: usize,
    pub record: RunRecord,
}

/// Stages cleaned datasets locally, uploads them date-partitioned and keeps
/// the run log.
#[derive(Clone)]
pub struct RunPublisher {
    staging_dir: PathBuf,
    run_log: RunLog,
    sink: Arc<dyn ObjectSinkPort>,
    clock: Arc<dyn ClockPort>,
}

impl RunPublisher {
    pub fn new(
        staging_dir: impl Into<PathBuf>,
        metadata_dir: &Path,
        sink: Arc<dyn ObjectSinkPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            run_log: RunLog::new(metadata_dir),
            sink,
            clock,
        }
    }

    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    pub fn staging_path(&self, name: DatasetName, ingestion_date: NaiveDate) -> PathBuf {
        let date = ingestion_date.format(INGESTION_DATE_FORMAT).to_string();
        self.staging_dir.join(staging_file_name(name.as_str(), &date))
    }

    /// Write the dataset to its staging file, overwriting any earlier run of the day.
    pub fn stage(&self, dataset: &Dataset, ingestion_date: NaiveDate) -> Result<PathBuf> {
        fs::create_dir_all(&self.staging_dir)?;
        let path = self.staging_path(dataset.name, ingestion_date);

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&dataset.schema)?;
        for row in &dataset.rows {
            writer.write_record(row.iter().map(|value| value.render()))?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// Stage, upload, then append and mirror the dataset's run record.
    #[instrument(skip_all, fields(dataset = %dataset.name, ingestion_date = %ingestion_date))]
    pub async fn publish(
        &self,
        dataset: &Dataset,
        stats: &DedupeStats,
        status: RunStatus,
        ingestion_date: NaiveDate,
    ) -> Result<PublishReceipt> {
        let staging_path = self.stage(dataset, ingestion_date)?;
        let date = ingestion_date.format(INGESTION_DATE_FORMAT).to_string();
        let key = processed_key(dataset.name.as_str(), &date);

        let bytes = fs::read(&staging_path)?;
        let size = bytes.len();
        match self.sink.upload(&key, bytes, "text/csv").await {
            Ok(()) => metrics::publish::upload_success(),
            Err(e) => {
                metrics::publish::upload_error();
                return Err(PipelineError::Sink(format!("{}: {}", key, e)));
            }
        }
        info!(key = %key, bytes = size, rows = dataset.len(), "Uploaded dataset");

        let record = self.record_run(dataset.name, stats, status).await?;
        Ok(PublishReceipt {
            staging_path,
            key,
            bytes: size,
            record,
        })
    }

    /// Append one run record and mirror the whole log to the sink.
    pub async fn record_run(
        &self,
        name: DatasetName,
        stats: &DedupeStats,
        status: RunStatus,
    ) -> Result<RunRecord> {
        let record = RunRecord {
            dataset: name.as_str().to_string(),
            rows_in: stats.rows_in,
            rows_out: stats.rows_out,
            validation_status: status,
            timestamp: self.clock.now(),
        };
        if self.run_log.seed_from(self.sink.as_ref()).await? {
            info!(path = %self.run_log.path().display(), "Restored run log from sink");
        }
        self.run_log.append(&record)?;
        metrics::publish::run_record(name.as_str());
        self.run_log.mirror(self.sink.as_ref()).await?;
        info!(
            dataset = %name,
            rows_in = record.rows_in,
            rows_out = record.rows_out,
            status = %record.validation_status,
            "Recorded run"
        );
        Ok(record)
    }
}

/// Re-read a staged file with the same reader the pipeline ingests with.
pub fn read_staged(path: &Path, name: DatasetName) -> Result<Option<Dataset>> {
    let file = File::open(path)?;
    match read_chunks(name, file, usize::MAX)? {
        ReadOutcome::Loaded(ingested) => Ok(Some(ingested.dataset)),
        _ => Ok(None),
    }
}
