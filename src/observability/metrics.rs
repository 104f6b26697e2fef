//! Metrics for the daily ingestion run
//!
//! Metrics go through the `metrics` facade. When no recorder is installed
//! (library use, tests) every call is a no-op. The binary installs a
//! Prometheus recorder and pushes the rendered text to a Pushgateway once
//! the run is over, since a batch job does not live long enough to be scraped.

use std::fmt;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Every metric name used in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Rate source
    RatesFetchAttempts,
    RatesFetchFailures,
    RatesFetchExhausted,
    RatesFetchDuration,

    // Ingestion
    IngestChunksRead,
    IngestRowsIn,
    IngestRowsOut,
    IngestRowsRemoved,
    IngestTimestampsNulled,
    IngestDatasetsSkipped,

    // Enrichment
    EnrichRowsConverted,
    EnrichRowsUnrated,

    // Validation
    ValidateBatchesPassed,
    ValidateBatchesFailed,
    ValidateIssuesDetected,

    // Publication
    PublishUploadsSuccess,
    PublishUploadsError,
    PublishRunRecords,
    PublishAlertsRaised,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RatesFetchAttempts => "etl_rates_fetch_attempts_total",
            MetricName::RatesFetchFailures => "etl_rates_fetch_failures_total",
            MetricName::RatesFetchExhausted => "etl_rates_fetch_exhausted_total",
            MetricName::RatesFetchDuration => "etl_rates_fetch_duration_seconds",
            MetricName::IngestChunksRead => "etl_ingest_chunks_read_total",
            MetricName::IngestRowsIn => "etl_ingest_rows_in_total",
            MetricName::IngestRowsOut => "etl_ingest_rows_out_total",
            MetricName::IngestRowsRemoved => "etl_ingest_rows_removed_total",
            MetricName::IngestTimestampsNulled => "etl_ingest_timestamps_nulled_total",
            MetricName::IngestDatasetsSkipped => "etl_ingest_datasets_skipped_total",
            MetricName::EnrichRowsConverted => "etl_enrich_rows_converted_total",
            MetricName::EnrichRowsUnrated => "etl_enrich_rows_unrated_total",
            MetricName::ValidateBatchesPassed => "etl_validate_batches_passed_total",
            MetricName::ValidateBatchesFailed => "etl_validate_batches_failed_total",
            MetricName::ValidateIssuesDetected => "etl_validate_issues_detected_total",
            MetricName::PublishUploadsSuccess => "etl_publish_uploads_success_total",
            MetricName::PublishUploadsError => "etl_publish_uploads_error_total",
            MetricName::PublishRunRecords => "etl_publish_run_records_total",
            MetricName::PublishAlertsRaised => "etl_publish_alerts_raised_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Idempotent.
pub fn init() {
    if HANDLE.get().is_some() {
        return;
    }
    match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = HANDLE.set(handle);
            info!("Prometheus recorder installed");
        }
        Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
    }
}

/// Current metrics in Prometheus text format, if a recorder is installed
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// Push everything recorded so far to a Pushgateway under `job`/`instance`.
pub async fn push_to_gateway(pushgateway_url: &str, job: &str, instance: &str) -> anyhow::Result<()> {
    let Some(body) = render() else {
        warn!("Metrics recorder not installed; nothing to push");
        return Ok(());
    };
    let push_url = format!(
        "{}/metrics/job/{}/instance/{}",
        pushgateway_url.trim_end_matches('/'),
        job,
        instance
    );
    let resp = reqwest::Client::new()
        .post(&push_url)
        .header("Content-Type", "text/plain; version=0.0.4")
        .body(body)
        .send()
        .await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        anyhow::bail!("Pushgateway returned status {}: {}", status, text);
    }
    info!("Pushed metrics to Pushgateway for instance={}", instance);
    Ok(())
}

// ============================================================================
// Rate source
// ============================================================================

pub mod rates {
    use super::MetricName;

    pub fn attempt() {
        ::metrics::counter!(MetricName::RatesFetchAttempts.as_str()).increment(1);
    }

    pub fn failure() {
        ::metrics::counter!(MetricName::RatesFetchFailures.as_str()).increment(1);
    }

    pub fn exhausted() {
        ::metrics::counter!(MetricName::RatesFetchExhausted.as_str()).increment(1);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::RatesFetchDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Ingestion
// ============================================================================

pub mod ingest {
    use super::MetricName;

    pub fn chunk_read(dataset: &'static str) {
        ::metrics::counter!(MetricName::IngestChunksRead.as_str(), "dataset" => dataset).increment(1);
    }

    pub fn rows(dataset: &'static str, rows_in: usize, rows_out: usize, rows_removed: usize) {
        ::metrics::counter!(MetricName::IngestRowsIn.as_str(), "dataset" => dataset).increment(rows_in as u64);
        ::metrics::counter!(MetricName::IngestRowsOut.as_str(), "dataset" => dataset).increment(rows_out as u64);
        ::metrics::counter!(MetricName::IngestRowsRemoved.as_str(), "dataset" => dataset)
            .increment(rows_removed as u64);
    }

    pub fn timestamps_nulled(dataset: &'static str, count: usize) {
        ::metrics::counter!(MetricName::IngestTimestampsNulled.as_str(), "dataset" => dataset)
            .increment(count as u64);
    }

    pub fn dataset_skipped(dataset: &'static str, reason: &'static str) {
        ::metrics::counter!(
            MetricName::IngestDatasetsSkipped.as_str(),
            "dataset" => dataset,
            "reason" => reason
        )
        .increment(1);
    }
}

// ============================================================================
// Enrichment
// ============================================================================

pub mod enrich {
    use super::MetricName;

    pub fn rows(converted: usize, unrated: usize) {
        ::metrics::counter!(MetricName::EnrichRowsConverted.as_str()).increment(converted as u64);
        ::metrics::counter!(MetricName::EnrichRowsUnrated.as_str()).increment(unrated as u64);
    }
}

// ============================================================================
// Validation
// ============================================================================

pub mod validate {
    use super::MetricName;

    pub fn batch(passed: bool, issue_count: usize) {
        if passed {
            ::metrics::counter!(MetricName::ValidateBatchesPassed.as_str()).increment(1);
        } else {
            ::metrics::counter!(MetricName::ValidateBatchesFailed.as_str()).increment(1);
        }
        ::metrics::counter!(MetricName::ValidateIssuesDetected.as_str()).increment(issue_count as u64);
    }
}

// ============================================================================
// Publication
// ============================================================================

pub mod publish {
    use super::MetricName;

    pub fn upload_success() {
        ::metrics::counter!(MetricName::PublishUploadsSuccess.as_str()).increment(1);
    }

    pub fn upload_error() {
        ::metrics::counter!(MetricName::PublishUploadsError.as_str()).increment(1);
    }

    pub fn run_record(dataset: &'static str) {
        ::metrics::counter!(MetricName::PublishRunRecords.as_str(), "dataset" => dataset).increment(1);
    }

    pub fn alert_raised() {
        ::metrics::counter!(MetricName::PublishAlertsRaised.as_str()).increment(1);
    }
}
