use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::app::ports::HttpClientPort;
use crate::common::constants::{INGESTION_DATE_FORMAT, RATES_SNAPSHOT_FILE};
use crate::common::error::{PipelineError, Result};
use crate::observability::metrics;
use crate::pipeline::ingestion::retry::{RetryDecision, RetryPolicy, RetryState};

/// Conversion factors keyed by upper-case currency code, read-only for the run.
/// A factor is "units of that currency per 1 USD".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateMap {
    rates: BTreeMap<String, Decimal>,
}

impl RateMap {
    pub fn get(&self, code: &str) -> Option<Decimal> {
        self.rates.get(code).copied()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rates.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Build from the `conversion_rates` object of a rate payload.
    /// Entries that are not numbers are dropped with a warning.
    pub fn from_json(conversion_rates: &serde_json::Map<String, JsonValue>) -> Self {
        let mut rates = BTreeMap::new();
        for (code, raw) in conversion_rates {
            let parsed = match raw {
                JsonValue::Number(n) => {
                    let s = n.to_string();
                    Decimal::from_str(&s).or_else(|_| Decimal::from_scientific(&s)).ok()
                }
                _ => None,
            };
            match parsed {
                Some(rate) => {
                    rates.insert(code.to_uppercase(), rate);
                }
                None => warn!(currency = %code, "Ignoring non-numeric conversion rate: {}", raw),
            }
        }
        Self { rates }
    }
}

impl FromIterator<(String, Decimal)> for RateMap {
    fn from_iter<I: IntoIterator<Item = (String, Decimal)>>(iter: I) -> Self {
        Self {
            rates: iter.into_iter().map(|(k, v)| (k.to_uppercase(), v)).collect(),
        }
    }
}

/// Fetches the daily rate table over HTTP with bounded retries and archives
/// the raw payload of the successful response under `<archive_root>/<date>/rates.json`.
pub struct RateSource {
    http: Arc<dyn HttpClientPort>,
    endpoint: String,
    policy: RetryPolicy,
    archive_root: PathBuf,
}

impl RateSource {
    pub fn new(
        http: Arc<dyn HttpClientPort>,
        endpoint: impl Into<String>,
        policy: RetryPolicy,
        archive_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            policy,
            archive_root: archive_root.into(),
        }
    }

    /// Path the snapshot for `ingestion_date` is archived at
    pub fn snapshot_path(&self, ingestion_date: NaiveDate) -> PathBuf {
        snapshot_path(&self.archive_root, ingestion_date)
    }

    #[instrument(skip(self), fields(max_attempts = self.policy.max_attempts))]
    pub async fn fetch_rates(&self, ingestion_date: NaiveDate) -> Result<RateMap> {
        let mut state = RetryState::new(self.policy);
        let t0 = Instant::now();

        loop {
            let attempt = state.begin_attempt();
            metrics::rates::attempt();

            let failure = match self.attempt().await {
                Ok((payload, rates)) => {
                    let path = self.archive(&payload, ingestion_date)?;
                    metrics::rates::duration(t0.elapsed().as_secs_f64());
                    info!(
                        attempt,
                        currencies = rates.len(),
                        "Fetched exchange rates; saved raw rates JSON to {}",
                        path.display()
                    );
                    return Ok(rates);
                }
                Err(failure) => failure,
            };

            metrics::rates::failure();
            match state.record_failure(failure) {
                RetryDecision::RetryAfter { delay, .. } => {
                    warn!(
                        attempt,
                        delay_secs = delay.as_secs_f64(),
                        "Rate API failed: {}. Retrying in {:.1}s",
                        state.last_failure().unwrap_or_default(),
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp { attempts, last_failure } => {
                    metrics::rates::exhausted();
                    error!(attempts, "Rate API failed after {} attempts: {}", attempts, last_failure);
                    return Err(PipelineError::RateFetch { attempts, last_failure });
                }
            }
        }
    }

    /// One request. `Err` carries the failure payload used for logging and
    /// for the final `RateFetch` error.
    async fn attempt(&self) -> std::result::Result<(JsonValue, RateMap), String> {
        let resp = self
            .http
            .get(&self.endpoint)
            .await
            .map_err(|e| format!("request error: {}", e))?;

        let body = String::from_utf8_lossy(&resp.bytes).into_owned();
        if resp.status != 200 {
            return Err(format!("HTTP {}: {}", resp.status, body));
        }

        let payload: JsonValue =
            serde_json::from_str(&body).map_err(|e| format!("malformed response ({}): {}", e, body))?;

        if payload.get("result").and_then(JsonValue::as_str) != Some("success") {
            return Err(payload.to_string());
        }

        let conversion_rates = payload
            .get("conversion_rates")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| format!("response has no conversion_rates object: {}", payload))?;

        let rates = RateMap::from_json(conversion_rates);
        Ok((payload, rates))
    }

    fn archive(&self, payload: &JsonValue, ingestion_date: NaiveDate) -> Result<PathBuf> {
        let path = self.snapshot_path(ingestion_date);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, serde_json::to_string_pretty(payload)?)?;
        Ok(path)
    }
}

pub fn snapshot_path(archive_root: &Path, ingestion_date: NaiveDate) -> PathBuf {
    archive_root
        .join(ingestion_date.format(INGESTION_DATE_FORMAT).to_string())
        .join(RATES_SNAPSHOT_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::HttpGetResult;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Replays a fixed sequence of responses, then keeps failing.
    struct ScriptedHttp {
        responses: Mutex<VecDeque<std::result::Result<HttpGetResult, String>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedHttp {
        fn new(responses: Vec<std::result::Result<HttpGetResult, String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl HttpClientPort for ScriptedHttp {
        async fn get(&self, _url: &str) -> std::result::Result<HttpGetResult, String> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err("connection refused".to_string()))
        }
    }

    fn json_response(status: u16, body: serde_json::Value) -> std::result::Result<HttpGetResult, String> {
        Ok(HttpGetResult {
            status,
            bytes: body.to_string().into_bytes(),
            content_type: "application/json".to_string(),
        })
    }

    fn success_body(eur: f64) -> serde_json::Value {
        json!({
            "result": "success",
            "base_code": "USD",
            "conversion_rates": { "USD": 1, "EUR": eur, "GBP": 0.79 }
        })
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 13).unwrap()
    }

    fn source(http: Arc<ScriptedHttp>, root: &Path) -> RateSource {
        RateSource::new(http, "https://rates.test/latest/USD", RetryPolicy::new(5, 0.0), root)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt_archives_snapshot() {
        let dir = tempdir().unwrap();
        let http = ScriptedHttp::new(vec![json_response(200, success_body(0.92))]);
        let rs = source(http.clone(), dir.path());

        let rates = rs.fetch_rates(date()).await.unwrap();
        assert_eq!(rates.get("EUR"), Some(Decimal::from_str("0.92").unwrap()));
        assert_eq!(rates.len(), 3);
        assert_eq!(http.calls(), 1);

        let archived: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(rs.snapshot_path(date())).unwrap()).unwrap();
        assert_eq!(archived, success_body(0.92));
        assert!(rs.snapshot_path(date()).ends_with("2025-09-13/rates.json"));
    }

    #[tokio::test]
    async fn test_snapshot_keeps_payload_key_order() {
        let dir = tempdir().unwrap();
        let http = ScriptedHttp::new(vec![json_response(200, success_body(0.92))]);
        let rs = source(http, dir.path());

        rs.fetch_rates(date()).await.unwrap();

        let text = fs::read_to_string(rs.snapshot_path(date())).unwrap();
        let position = |key: &str| text.find(&format!("\"{}\"", key)).unwrap();
        assert!(text.starts_with("{\n  \"result\": \"success\""));
        assert!(position("result") < position("base_code"));
        assert!(position("base_code") < position("conversion_rates"));
        let usd = text.find("\"USD\": 1").unwrap();
        assert!(usd < position("EUR"));
        assert!(position("EUR") < position("GBP"));
    }

    #[tokio::test]
    async fn test_fifth_attempt_wins_after_four_failures() {
        let dir = tempdir().unwrap();
        let http = ScriptedHttp::new(vec![
            Err("timeout".to_string()),
            json_response(500, json!({"result": "error"})),
            json_response(200, json!({"result": "error", "error-type": "quota-reached"})),
            Ok(HttpGetResult { status: 200, bytes: b"<html>".to_vec(), content_type: "text/html".to_string() }),
            json_response(200, success_body(0.5)),
        ]);
        let rs = source(http.clone(), dir.path());

        let rates = rs.fetch_rates(date()).await.unwrap();
        assert_eq!(http.calls(), 5);
        assert_eq!(rates.get("EUR"), Some(Decimal::from_str("0.5").unwrap()));

        let archived: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(rs.snapshot_path(date())).unwrap()).unwrap();
        assert_eq!(archived, success_body(0.5));
    }

    #[tokio::test]
    async fn test_exhaustion_raises_and_writes_no_snapshot() {
        let dir = tempdir().unwrap();
        let http = ScriptedHttp::new(vec![
            json_response(403, json!({"result": "error", "error-type": "invalid-key"})),
        ]);
        let rs = source(http.clone(), dir.path());

        let err = rs.fetch_rates(date()).await.unwrap_err();
        match err {
            PipelineError::RateFetch { attempts, last_failure } => {
                assert_eq!(attempts, 5);
                assert!(last_failure.contains("connection refused"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(http.calls(), 5);
        assert!(!rs.snapshot_path(date()).exists());
    }

    #[tokio::test]
    async fn test_same_day_refetch_overwrites_snapshot() {
        let dir = tempdir().unwrap();
        let http = ScriptedHttp::new(vec![
            json_response(200, success_body(0.9)),
            json_response(200, success_body(0.95)),
        ]);
        let rs = source(http, dir.path());

        rs.fetch_rates(date()).await.unwrap();
        rs.fetch_rates(date()).await.unwrap();

        let archived: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(rs.snapshot_path(date())).unwrap()).unwrap();
        assert_eq!(archived, success_body(0.95));
    }

    #[test]
    fn test_rate_map_skips_non_numeric_entries() {
        let rates = json!({"eur": 0.92, "BAD": "n/a", "JPY": 147.5});
        let map = RateMap::from_json(rates.as_object().unwrap());
        assert_eq!(map.len(), 2);
        assert!(map.contains("EUR"));
        assert!(!map.contains("BAD"));
    }
}
