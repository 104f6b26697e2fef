use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use tracing::{debug, instrument, warn};

use crate::app::ports::HttpClientPort;
use crate::common::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::dataset::{parse_decimal, Dataset, DatasetName, Value};
use crate::pipeline::processing::dedupe::{dedupe, DedupeStats};
use crate::pipeline::processing::normalize::{SchemaNormalizer, SnakeCaseNormalizer};

/// Cell spellings read as null
const NA_VALUES: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

const TZ_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];
const NAIVE_DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Where a raw dataset is read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Local(PathBuf),
    Remote(String),
}

impl InputSource {
    pub fn parse(location: &str) -> Self {
        let trimmed = location.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            InputSource::Remote(trimmed.to_string())
        } else {
            InputSource::Local(PathBuf::from(trimmed))
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Local(path) => write!(f, "{}", path.display()),
            InputSource::Remote(url) => f.write_str(url),
        }
    }
}

/// A dataset read, normalized, typed and deduplicated
#[derive(Debug, Clone)]
pub struct IngestedDataset {
    pub dataset: Dataset,
    pub stats: DedupeStats,
    pub chunks: usize,
    /// Timestamp cells that could not be parsed and were nulled
    pub timestamps_nulled: usize,
}

#[derive(Debug, Clone)]
pub enum ReadOutcome {
    /// The input does not exist
    Missing,
    /// The input exists but yielded no chunks
    NoRows,
    Loaded(IngestedDataset),
}

/// Reads a CSV source in chunks of at most `chunk_size` rows. Each chunk comes
/// back with the raw header as its schema and every non-null cell as text.
pub struct ChunkedReader<R: Read> {
    name: DatasetName,
    reader: csv::Reader<R>,
    header: Vec<String>,
    chunk_size: usize,
    record: csv::StringRecord,
    line: u64,
}

impl<R: Read> ChunkedReader<R> {
    pub fn new(name: DatasetName, source: R, chunk_size: usize) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(source);
        let header = reader.headers()?.iter().map(str::to_string).collect();
        Ok(Self {
            name,
            reader,
            header,
            chunk_size: chunk_size.max(1),
            record: csv::StringRecord::new(),
            line: 1,
        })
    }

    pub fn next_chunk(&mut self) -> Result<Option<Dataset>> {
        let mut chunk = Dataset::new(self.name, self.header.clone());
        let width = self.header.len();

        while chunk.rows.len() < self.chunk_size {
            if !self.reader.read_record(&mut self.record)? {
                break;
            }
            self.line += 1;
            if self.record.len() > width {
                return Err(PipelineError::Input(format!(
                    "{}: line {} has {} fields but the header has {}",
                    self.name,
                    self.line,
                    self.record.len(),
                    width
                )));
            }
            let mut row: Vec<Value> = self.record.iter().map(raw_cell).collect();
            row.resize(width, Value::Null);
            chunk.rows.push(row);
        }

        if chunk.rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(chunk))
        }
    }
}

impl<R: Read> Iterator for ChunkedReader<R> {
    type Item = Result<Dataset>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

fn raw_cell(raw: &str) -> Value {
    if NA_VALUES.contains(&raw) {
        Value::Null
    } else {
        Value::Text(raw.to_string())
    }
}

/// Parse a timestamp in any accepted form, normalized to UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in TZ_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(s, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Coerce `column` to UTC timestamps; unparsable cells become null.
/// Returns how many non-null cells were nulled.
pub fn coerce_timestamps(dataset: &mut Dataset, column: &str) -> usize {
    let mut nulled = 0;
    dataset.map_column(column, |value| match value {
        Value::Null => Value::Null,
        Value::Timestamp(ts) => Value::Timestamp(*ts),
        other => match parse_timestamp(&other.render()) {
            Some(ts) => Value::Timestamp(ts),
            None => {
                nulled += 1;
                Value::Null
            }
        },
    });
    nulled
}

/// Type as numeric every column whose non-null cells all parse as decimals.
/// Runs on the assembled dataset so every chunk ends up with the same typing.
pub fn infer_numeric_columns(dataset: &mut Dataset) {
    for idx in 0..dataset.schema.len() {
        let mut any_value = false;
        let numeric = dataset.rows.iter().all(|row| match &row[idx] {
            Value::Null | Value::Number(_) => true,
            Value::Text(s) => {
                any_value = true;
                parse_decimal(s).is_some()
            }
            Value::Timestamp(_) => false,
        });
        if !numeric || !any_value {
            continue;
        }
        for row in &mut dataset.rows {
            if let Value::Text(s) = &row[idx] {
                if let Some(d) = parse_decimal(s) {
                    row[idx] = Value::Number(d);
                }
            }
        }
    }
}

/// Read `source` chunk by chunk, normalizing each chunk's schema and coercing
/// the dataset's timestamp column before it joins the buffer, then type and
/// deduplicate the assembled dataset.
pub fn read_chunks<R: Read>(name: DatasetName, source: R, chunk_size: usize) -> Result<ReadOutcome> {
    let normalizer = SnakeCaseNormalizer::new();
    let reader = ChunkedReader::new(name, source, chunk_size)?;

    let mut buffer: Option<Dataset> = None;
    let mut chunks = 0;
    let mut timestamps_nulled = 0;

    for chunk in reader {
        let mut chunk = chunk?;
        normalizer.normalize(&mut chunk);
        timestamps_nulled += coerce_timestamps(&mut chunk, name.timestamp_column());

        chunks += 1;
        metrics::ingest::chunk_read(name.as_str());
        debug!(dataset = %name, chunk = chunks, rows = chunk.len(), "Read chunk");

        match buffer.as_mut() {
            Some(buf) => buf.append(chunk),
            None => buffer = Some(chunk),
        }
    }

    let Some(mut dataset) = buffer else {
        return Ok(ReadOutcome::NoRows);
    };

    if timestamps_nulled > 0 {
        metrics::ingest::timestamps_nulled(name.as_str(), timestamps_nulled);
        warn!(
            dataset = %name,
            column = name.timestamp_column(),
            count = timestamps_nulled,
            "Unparsable timestamps set to null"
        );
    }

    infer_numeric_columns(&mut dataset);
    let stats = dedupe(&mut dataset);

    Ok(ReadOutcome::Loaded(IngestedDataset {
        dataset,
        stats,
        chunks,
        timestamps_nulled,
    }))
}

/// Check the input exists, then read and deduplicate it.
#[instrument(skip(http), fields(dataset = %name))]
pub async fn read_and_dedupe(
    input: &InputSource,
    name: DatasetName,
    chunk_size: usize,
    http: &dyn HttpClientPort,
) -> Result<ReadOutcome> {
    match input {
        InputSource::Local(path) => {
            if !path.is_file() {
                return Ok(ReadOutcome::Missing);
            }
            let file = File::open(path)?;
            read_chunks(name, file, chunk_size)
        }
        InputSource::Remote(url) => {
            let resp = http
                .get(url)
                .await
                .map_err(|e| PipelineError::Input(format!("fetching {}: {}", url, e)))?;
            if resp.status == 404 || resp.status == 410 {
                return Ok(ReadOutcome::Missing);
            }
            if !resp.is_success() {
                return Err(PipelineError::Input(format!("fetching {}: HTTP {}", url, resp.status)));
            }
            read_chunks(name, Cursor::new(resp.bytes), chunk_size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn read(name: DatasetName, csv: &str, chunk_size: usize) -> ReadOutcome {
        read_chunks(name, csv.as_bytes(), chunk_size).unwrap()
    }

    fn loaded(outcome: ReadOutcome) -> IngestedDataset {
        match outcome {
            ReadOutcome::Loaded(ingested) => ingested,
            other => panic!("expected loaded dataset, got {other:?}"),
        }
    }

    #[test]
    fn test_input_source_parse() {
        assert_eq!(
            InputSource::parse("https://host/data.csv"),
            InputSource::Remote("https://host/data.csv".to_string())
        );
        assert_eq!(InputSource::parse("data/clicks.csv"), InputSource::Local(PathBuf::from("data/clicks.csv")));
    }

    #[test]
    fn test_chunks_respect_chunk_size() {
        let csv = "a,b\n1,2\n3,4\n5,6\n7,8\n9,10\n";
        let chunks: Vec<Dataset> = ChunkedReader::new(DatasetName::Clickstream, csv.as_bytes(), 2)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        let sizes: Vec<usize> = chunks.iter().map(Dataset::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_short_rows_are_padded_long_rows_rejected() {
        let outcome = read(DatasetName::Clickstream, "a,b,c\n1,2\n", 10);
        assert_eq!(loaded(outcome).dataset.rows[0][2], Value::Null);

        let err = read_chunks(DatasetName::Clickstream, "a,b\n1,2,3\n".as_bytes(), 10).unwrap_err();
        assert!(matches!(err, PipelineError::Input(_)));
    }

    #[test]
    fn test_headers_normalized_and_dedupe_across_chunks() {
        let csv = "User ID,Page URL,Click Time!!\n\
                   1,/home,2025-09-13T10:00:00Z\n\
                   2,/cart,2025-09-13 11:00:00\n\
                   1,/home,2025-09-13T10:00:00Z\n\
                   3,/buy,not a time\n";
        let ingested = loaded(read(DatasetName::Clickstream, csv, 1));

        assert_eq!(ingested.chunks, 4);
        assert_eq!(ingested.dataset.schema, vec!["user_id", "page_url", "click_time"]);
        assert_eq!(ingested.stats, DedupeStats { rows_in: 4, rows_out: 3, rows_removed: 1 });
        assert_eq!(ingested.timestamps_nulled, 1);

        let rows = &ingested.dataset.rows;
        assert_eq!(rows[0][0], Value::Number(Decimal::from(1)));
        assert_eq!(
            rows[1][2],
            Value::Timestamp(Utc.with_ymd_and_hms(2025, 9, 13, 11, 0, 0).unwrap())
        );
        assert_eq!(rows[2][2], Value::Null);
    }

    #[test]
    fn test_timestamps_normalized_to_utc() {
        let expected = Utc.with_ymd_and_hms(2025, 9, 13, 8, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-09-13T10:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-09-13 08:00:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-09-13 08:00:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-09-13"),
            Some(Utc.with_ymd_and_hms(2025, 9, 13, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("13th of September"), None);
        assert_eq!(parse_timestamp("2025-13-45"), None);
    }

    #[test]
    fn test_mixed_column_stays_text() {
        let csv = "amount,currency,note\n10.50,usd,\n abc ,EUR,x\n";
        let ingested = loaded(read(DatasetName::Transactions, csv, 10));
        let rows = &ingested.dataset.rows;
        assert_eq!(rows[0][0], Value::Text("10.50".to_string()));
        assert_eq!(rows[0][2], Value::Null);
        assert_eq!(rows[0][0].as_decimal(), Some(Decimal::from_str("10.50").unwrap()));
    }

    #[test]
    fn test_numeric_typing_spans_chunks() {
        let csv = "amount\n1\n2.5\nNA\n";
        let ingested = loaded(read(DatasetName::Transactions, csv, 1));
        let rows = &ingested.dataset.rows;
        assert_eq!(rows[1][0], Value::Number(Decimal::from_str("2.5").unwrap()));
        assert_eq!(rows[2][0], Value::Null);
    }

    #[test]
    fn test_header_only_and_empty_sources_yield_no_rows() {
        assert!(matches!(read(DatasetName::Clickstream, "a,b\n", 10), ReadOutcome::NoRows));
        assert!(matches!(read(DatasetName::Clickstream, "", 10), ReadOutcome::NoRows));
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = InputSource::Local(dir.path().join("nope.csv"));
        let http = crate::infra::ReqwestHttp::with_timeout(std::time::Duration::from_secs(1)).unwrap();
        let outcome = read_and_dedupe(&input, DatasetName::Clickstream, 10, &http).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Missing));
    }
}
