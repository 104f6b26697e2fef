/// Dataset, key and default constants shared across the pipeline.
/// Keys written to the object sink are built only from these templates.

pub const CLICKSTREAM: &str = "clickstream";
pub const TRANSACTIONS: &str = "transactions";

// Dataset-specific timestamp columns, coerced to UTC on read
pub const CLICK_TIME_COLUMN: &str = "click_time";
pub const TXN_TIME_COLUMN: &str = "txn_time";

// Transaction columns used by enrichment and validation
pub const AMOUNT_COLUMN: &str = "amount";
pub const CURRENCY_COLUMN: &str = "currency";
pub const AMOUNT_IN_USD_COLUMN: &str = "amount_in_usd";
pub const VALIDATION_STATUS_COLUMN: &str = "validation_status";

/// Currencies a transaction batch may contain and still pass validation.
pub const VALID_CURRENCIES: [&str; 5] = ["USD", "EUR", "GBP", "INR", "JPY"];

pub const DEFAULT_CHUNK_SIZE: usize = 50_000;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BACKOFF_BASE: f64 = 1.5;
pub const DEFAULT_RATE_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_INPUT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_RATES_BASE_URL: &str = "https://v6.exchangerate-api.com/v6";
pub const DEFAULT_BASE_CURRENCY: &str = "USD";

pub const RATES_SNAPSHOT_FILE: &str = "rates.json";
pub const RUN_LOG_FILE: &str = "run_log.csv";
pub const ALERTS_FILE: &str = "alerts.log";

pub const RUN_LOG_KEY: &str = "metadata/run_log.csv";
pub const ALERTS_KEY: &str = "alerts/alerts.log";
pub const RUN_LOG_HEADER: [&str; 5] = ["dataset", "rows_in", "rows_out", "validation_status", "timestamp"];

/// Timestamp format for the run log and alert trail (UTC).
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Format used when timestamps are written to staged files. Sub-second
/// precision is kept; whole seconds carry no fraction.
pub const STAGED_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";
pub const INGESTION_DATE_FORMAT: &str = "%Y-%m-%d";

/// Local staging file name for a cleaned dataset.
pub fn staging_file_name(dataset: &str, ingestion_date: &str) -> String {
    format!("{}_clean_{}.csv", dataset, ingestion_date)
}

/// Date-partitioned object key a cleaned dataset is published under.
pub fn processed_key(dataset: &str, ingestion_date: &str) -> String {
    format!("processed/{}/ingest_date={}/{}.csv", dataset, ingestion_date, dataset)
}
