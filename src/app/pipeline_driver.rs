use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::app::ports::{ClockPort, HttpClientPort, ObjectSinkPort};
use crate::common::config::{PipelineConfig, SinkBackend};
use crate::common::error::{PipelineError, Result};
use crate::infra::{FsObjectSink, ReqwestHttp, SupabaseObjectSink, SystemClock};
use crate::observability::metrics;
use crate::pipeline::dataset::{Dataset, DatasetName};
use crate::pipeline::ingestion::rates::{RateMap, RateSource};
use crate::pipeline::ingestion::reader::{read_and_dedupe, InputSource, ReadOutcome};
use crate::pipeline::ingestion::retry::RetryPolicy;
use crate::pipeline::processing::dedupe::DedupeStats;
use crate::pipeline::processing::enrich::{enrich, EnrichmentReport};
use crate::pipeline::processing::quality_gate::{ValidationReport, Validator};
use crate::pipeline::storage::{AlertLog, PublishReceipt, RunPublisher, RunRecord, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingInput,
    NoRows,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingInput => "missing_input",
            SkipReason::NoRows => "no_rows",
        }
    }
}

/// A dataset carried through every stage that applies to it
#[derive(Debug, Clone)]
pub struct DatasetRun {
    pub dataset: Dataset,
    pub stats: DedupeStats,
    pub chunks: usize,
    pub timestamps_nulled: usize,
    pub enrichment: Option<EnrichmentReport>,
    pub validation: Option<ValidationReport>,
}

impl DatasetRun {
    pub fn status(&self) -> RunStatus {
        match &self.validation {
            None => RunStatus::Unvalidated,
            Some(report) if report.passed() => RunStatus::Pass,
            Some(_) => RunStatus::Fail,
        }
    }
}

#[derive(Debug)]
pub enum DatasetOutcome {
    Published { run: DatasetRun, receipt: PublishReceipt },
    Skipped(SkipReason),
    /// Validation failed: the run was recorded but nothing was published
    Rejected {
        run: DatasetRun,
        record: RunRecord,
        error: PipelineError,
    },
    Failed(PipelineError),
}

impl DatasetOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, DatasetOutcome::Published { .. })
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            DatasetOutcome::Rejected { error, .. } | DatasetOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub ingestion_date: NaiveDate,
    pub clickstream: DatasetOutcome,
    pub transactions: DatasetOutcome,
}

impl RunSummary {
    /// The error surfaced to the caller, if any dataset failed
    pub fn first_failure(&self) -> Option<&PipelineError> {
        self.clickstream.error().or_else(|| self.transactions.error())
    }
}

/// Composes rate fetch, ingestion, enrichment, validation and publication
/// for one run. Datasets are processed one after the other.
pub struct PipelineDriver {
    config: PipelineConfig,
    input_http: Arc<dyn HttpClientPort>,
    rate_source: RateSource,
    validator: Validator,
    publisher: RunPublisher,
    alerts: AlertLog,
}

impl PipelineDriver {
    pub fn new(
        config: PipelineConfig,
        http: Arc<dyn HttpClientPort>,
        sink: Arc<dyn ObjectSinkPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        let policy = RetryPolicy::new(config.rates.max_retries, config.rates.backoff_base);
        let rate_source = RateSource::new(
            http.clone(),
            config.rates.endpoint(),
            policy,
            config.raw_rates_dir.clone(),
        );
        let publisher = RunPublisher::new(
            config.staging_dir.clone(),
            &config.metadata_dir,
            sink.clone(),
            clock.clone(),
        );
        let alerts = AlertLog::new(&config.metadata_dir, sink, clock);

        Self {
            config,
            input_http: http,
            rate_source,
            validator: Validator::default(),
            publisher,
            alerts,
        }
    }

    /// Fetch remote inputs through `http` instead of the rate client.
    pub fn with_input_http(mut self, http: Arc<dyn HttpClientPort>) -> Self {
        self.input_http = http;
        self
    }

    /// Wire the production adapters selected by `config`.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let rates_http = ReqwestHttp::with_timeout(config.rates.timeout())?;
        let input_http = ReqwestHttp::with_timeout(config.input_timeout())?;
        let sink: Arc<dyn ObjectSinkPort> = match config.sink.backend {
            SinkBackend::Fs => Arc::new(FsObjectSink::new(config.sink.root.clone())),
            SinkBackend::Supabase => {
                let missing = |field: &str| PipelineError::Config(format!("supabase sink requires {}", field));
                Arc::new(SupabaseObjectSink::new(
                    config.sink.url.clone().ok_or_else(|| missing("url"))?,
                    config.sink.bucket.clone().ok_or_else(|| missing("bucket"))?,
                    config.sink.service_key.clone().ok_or_else(|| missing("service_key"))?,
                    config.sink.prefix.clone(),
                ))
            }
        };
        Ok(Self::new(config, Arc::new(rates_http), sink, Arc::new(SystemClock))
            .with_input_http(Arc::new(input_http)))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn publisher(&self) -> &RunPublisher {
        &self.publisher
    }

    /// Fetch rates once, then process clickstream and transactions in turn.
    /// Rate exhaustion aborts the run; dataset failures are reported in the summary.
    pub async fn run(&self, ingestion_date: NaiveDate) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id, ingestion_date = %ingestion_date);

        async move {
            info!("Starting daily ingestion run");
            let rates = self.fetch_rates(ingestion_date).await?;

            let clickstream = self.process_clickstream(ingestion_date).await;
            let transactions = self.process_transactions(&rates, ingestion_date).await;

            let summary = RunSummary {
                run_id,
                ingestion_date,
                clickstream,
                transactions,
            };
            match summary.first_failure() {
                Some(error) => warn!(error = %error, "Run finished with a failed dataset"),
                None => info!("Run finished"),
            }
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Fetch and archive the day's rates, raising an alert when retries run out.
    pub async fn fetch_rates(&self, ingestion_date: NaiveDate) -> Result<RateMap> {
        match self.rate_source.fetch_rates(ingestion_date).await {
            Ok(rates) => Ok(rates),
            Err(e) => {
                self.alert(&format!("Exchange rate fetch failed for {}: {}", ingestion_date, e))
                    .await;
                Err(e)
            }
        }
    }

    pub async fn process_clickstream(&self, ingestion_date: NaiveDate) -> DatasetOutcome {
        self.process_dataset(DatasetName::Clickstream, None, ingestion_date)
            .await
    }

    pub async fn process_transactions(&self, rates: &RateMap, ingestion_date: NaiveDate) -> DatasetOutcome {
        self.process_dataset(DatasetName::Transactions, Some(rates), ingestion_date)
            .await
    }

    /// Process a single dataset, fetching rates first when it needs them.
    pub async fn process(&self, name: DatasetName, ingestion_date: NaiveDate) -> Result<DatasetOutcome> {
        match name {
            DatasetName::Clickstream => Ok(self.process_clickstream(ingestion_date).await),
            DatasetName::Transactions => {
                let rates = self.fetch_rates(ingestion_date).await?;
                Ok(self.process_transactions(&rates, ingestion_date).await)
            }
        }
    }

    async fn process_dataset(
        &self,
        name: DatasetName,
        rates: Option<&RateMap>,
        ingestion_date: NaiveDate,
    ) -> DatasetOutcome {
        let span = info_span!("dataset", dataset = %name);
        let outcome = match self
            .try_process(name, rates, ingestion_date)
            .instrument(span)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => DatasetOutcome::Failed(e),
        };

        match &outcome {
            DatasetOutcome::Rejected { error, .. } => {
                self.alert(&format!("{} rejected for {}: {}", name, ingestion_date, error))
                    .await;
            }
            DatasetOutcome::Failed(error) => {
                self.alert(&format!("{} pipeline failed for {}: {}", name, ingestion_date, error))
                    .await;
            }
            _ => {}
        }
        outcome
    }

    async fn try_process(
        &self,
        name: DatasetName,
        rates: Option<&RateMap>,
        ingestion_date: NaiveDate,
    ) -> Result<DatasetOutcome> {
        let input = InputSource::parse(self.input_for(name));
        let ingested = match read_and_dedupe(&input, name, self.config.chunk_size, self.input_http.as_ref()).await? {
            ReadOutcome::Loaded(ingested) => ingested,
            ReadOutcome::Missing => return Ok(self.skip(name, &input, SkipReason::MissingInput)),
            ReadOutcome::NoRows => return Ok(self.skip(name, &input, SkipReason::NoRows)),
        };

        let stats = ingested.stats;
        metrics::ingest::rows(name.as_str(), stats.rows_in, stats.rows_out, stats.rows_removed);
        info!(
            input = %input,
            chunks = ingested.chunks,
            rows_in = stats.rows_in,
            rows_out = stats.rows_out,
            rows_removed = stats.rows_removed,
            "Read and deduplicated dataset"
        );

        let mut dataset = ingested.dataset;
        let (enrichment, validation) = match rates {
            Some(rates) => {
                let enrichment = enrich(&mut dataset, rates);
                let validation = self.validator.validate(&mut dataset);
                (Some(enrichment), Some(validation))
            }
            None => (None, None),
        };

        let run = DatasetRun {
            dataset,
            stats,
            chunks: ingested.chunks,
            timestamps_nulled: ingested.timestamps_nulled,
            enrichment,
            validation,
        };
        let status = run.status();

        if status == RunStatus::Fail {
            let record = self.publisher.record_run(name, &stats, status).await?;
            let issues = run
                .validation
                .as_ref()
                .map(ValidationReport::issue_messages)
                .unwrap_or_default();
            warn!(issues = issues.len(), "Validation failed; dataset not published");
            return Ok(DatasetOutcome::Rejected {
                run,
                record,
                error: PipelineError::Validation {
                    dataset: name.to_string(),
                    issues,
                },
            });
        }

        let receipt = self
            .publisher
            .publish(&run.dataset, &stats, status, ingestion_date)
            .await?;
        Ok(DatasetOutcome::Published { run, receipt })
    }

    fn skip(&self, name: DatasetName, input: &InputSource, reason: SkipReason) -> DatasetOutcome {
        metrics::ingest::dataset_skipped(name.as_str(), reason.as_str());
        warn!(input = %input, reason = reason.as_str(), "No data read; skipping {}", name);
        DatasetOutcome::Skipped(reason)
    }

    fn input_for(&self, name: DatasetName) -> &str {
        match name {
            DatasetName::Clickstream => &self.config.clickstream_input,
            DatasetName::Transactions => &self.config.transactions_input,
        }
    }

    async fn alert(&self, message: &str) {
        if let Err(e) = self.alerts.raise(message).await {
            warn!(error = %e, "Failed to record alert");
        }
    }
}
