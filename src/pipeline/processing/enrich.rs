use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::common::constants::{AMOUNT_COLUMN, AMOUNT_IN_USD_COLUMN, CURRENCY_COLUMN};
use crate::observability::metrics;
use crate::pipeline::dataset::{Dataset, Value};
use crate::pipeline::ingestion::rates::RateMap;

/// Result of converting one row's amount into USD
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Conversion {
    Converted(Decimal),
    /// The currency has no usable rate (absent from the map or zero)
    Unrated(String),
    /// The row has no numeric amount or no currency to convert
    Unconvertible,
}

impl Conversion {
    pub fn amount(&self) -> Option<Decimal> {
        match self {
            Conversion::Converted(value) => Some(*value),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Conversion::Converted(value) => Value::Number(value),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichmentReport {
    /// One entry per row, in row order
    pub conversions: Vec<Conversion>,
    /// Distinct uppercased currency codes with no entry in the rate map, sorted
    pub missing_currencies: Vec<String>,
    /// Set when the dataset lacked the columns needed for enrichment
    pub skipped: bool,
}

impl EnrichmentReport {
    pub fn converted(&self) -> usize {
        self.conversions
            .iter()
            .filter(|c| matches!(c, Conversion::Converted(_)))
            .count()
    }

    pub fn unrated(&self) -> usize {
        self.conversions.len() - self.converted()
    }
}

/// Convert one amount. `rate` is units of the source currency per 1 USD.
pub fn convert(amount: Option<Decimal>, currency: Option<&str>, rates: &RateMap) -> Conversion {
    let (Some(amount), Some(currency)) = (amount, currency) else {
        return Conversion::Unconvertible;
    };
    let code = currency.trim().to_uppercase();
    match rates.get(&code) {
        Some(rate) if !rate.is_zero() => match amount.checked_div(rate) {
            Some(usd) => Conversion::Converted(usd),
            None => Conversion::Unconvertible,
        },
        _ => Conversion::Unrated(code),
    }
}

/// Add `amount_in_usd` to every row. Rows are never dropped; a row whose
/// currency cannot be rated keeps a null amount.
pub fn enrich(dataset: &mut Dataset, rates: &RateMap) -> EnrichmentReport {
    let (Some(amount_idx), Some(currency_idx)) = (
        dataset.column_index(AMOUNT_COLUMN),
        dataset.column_index(CURRENCY_COLUMN),
    ) else {
        warn!(
            dataset = %dataset.name,
            "Missing '{}' or '{}' column; skipping currency enrichment",
            AMOUNT_COLUMN,
            CURRENCY_COLUMN
        );
        return EnrichmentReport {
            skipped: true,
            ..Default::default()
        };
    };

    let mut missing = BTreeSet::new();
    let conversions: Vec<Conversion> = dataset
        .rows
        .iter()
        .map(|row| {
            let currency = row[currency_idx].as_text();
            if let Some(code) = &currency {
                let code = code.trim().to_uppercase();
                if !rates.contains(&code) {
                    missing.insert(code);
                }
            }
            convert(row[amount_idx].as_decimal(), currency.as_deref(), rates)
        })
        .collect();

    dataset.set_column(
        AMOUNT_IN_USD_COLUMN,
        conversions.iter().cloned().map(Conversion::into_value).collect(),
    );

    let report = EnrichmentReport {
        conversions,
        missing_currencies: missing.into_iter().collect(),
        skipped: false,
    };

    if !report.missing_currencies.is_empty() {
        warn!(
            dataset = %dataset.name,
            "Missing FX rate for currencies: {}",
            report.missing_currencies.join(", ")
        );
    }
    metrics::enrich::rows(report.converted(), report.unrated());
    info!(
        dataset = %dataset.name,
        converted = report.converted(),
        unrated = report.unrated(),
        "Enriched amounts into USD"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dataset::DatasetName;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn transactions(rows: &[(&str, Option<&str>)]) -> Dataset {
        let mut ds = Dataset::new(
            DatasetName::Transactions,
            vec!["txn_id".to_string(), "amount".to_string(), "currency".to_string()],
        );
        for (i, (amount, currency)) in rows.iter().enumerate() {
            ds.rows.push(vec![
                Value::Number(Decimal::from(i as i64)),
                Value::Number(dec(amount)),
                currency.map(|c| Value::Text(c.to_string())).unwrap_or(Value::Null),
            ]);
        }
        ds
    }

    fn rates() -> RateMap {
        [("EUR".to_string(), dec("0.92")), ("USD".to_string(), dec("1")), ("JPY".to_string(), Decimal::ZERO)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_lowercase_currency_converts() {
        let mut ds = transactions(&[("92", Some("eur"))]);
        let report = enrich(&mut ds, &rates());
        assert_eq!(report.conversions, vec![Conversion::Converted(dec("100"))]);

        let idx = ds.column_index("amount_in_usd").unwrap();
        assert_eq!(ds.rows[0][idx].as_decimal(), Some(dec("100.0")));
    }

    #[test]
    fn test_unknown_currency_keeps_row_with_null_amount() {
        let mut ds = transactions(&[("10", Some("ZZZ")), ("5", Some("usd")), ("7", Some("zzz"))]);
        let report = enrich(&mut ds, &rates());

        assert_eq!(ds.len(), 3);
        assert_eq!(report.missing_currencies, vec!["ZZZ"]);
        assert_eq!(report.conversions[0], Conversion::Unrated("ZZZ".to_string()));
        assert_eq!(report.converted(), 1);
        assert_eq!(report.unrated(), 2);

        let idx = ds.column_index("amount_in_usd").unwrap();
        assert!(ds.rows[0][idx].is_null());
        assert_eq!(ds.rows[1][idx], Value::Number(dec("5")));
    }

    #[test]
    fn test_zero_rate_is_unrated_but_not_missing() {
        let mut ds = transactions(&[("1000", Some("JPY"))]);
        let report = enrich(&mut ds, &rates());
        assert_eq!(report.conversions, vec![Conversion::Unrated("JPY".to_string())]);
        assert!(report.missing_currencies.is_empty());
    }

    #[test]
    fn test_null_currency_is_unconvertible() {
        let mut ds = transactions(&[("3", None)]);
        let report = enrich(&mut ds, &rates());
        assert_eq!(report.conversions, vec![Conversion::Unconvertible]);
        assert!(report.missing_currencies.is_empty());
    }

    #[test]
    fn test_missing_columns_is_noop() {
        let mut ds = Dataset::new(DatasetName::Transactions, vec!["amount".to_string()]);
        ds.rows.push(vec![Value::Number(dec("1"))]);
        let before = ds.clone();

        let report = enrich(&mut ds, &rates());
        assert!(report.skipped);
        assert_eq!(ds, before);
    }
}
