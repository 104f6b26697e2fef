use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, warn};

use crate::common::constants::{
    AMOUNT_COLUMN, CURRENCY_COLUMN, VALIDATION_STATUS_COLUMN, VALID_CURRENCIES,
};
use crate::observability::metrics;
use crate::pipeline::dataset::{Dataset, Value};

/// Batch-level validation status, applied uniformly to every row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Passed,
    Failed,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Passed => "passed",
            ValidationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business rule violated somewhere in the batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidationIssue {
    /// Columns holding at least one null, in schema order
    NullValues { columns: Vec<String> },
    /// Rows whose amount is zero, negative, or not a number
    NonPositiveAmounts { rows: usize },
    /// Distinct raw currency values outside the allow-list, sorted
    InvalidCurrencies { codes: Vec<String> },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::NullValues { columns } => {
                write!(f, "Null values in columns: [{}]", columns.join(", "))
            }
            ValidationIssue::NonPositiveAmounts { rows } => {
                write!(f, "Negative or zero amounts: {} rows", rows)
            }
            ValidationIssue::InvalidCurrencies { codes } => {
                write!(f, "Invalid currencies: [{}]", codes.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub status: ValidationStatus,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.status == ValidationStatus::Passed
    }

    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

/// Rule-based batch validator for transactions
#[derive(Debug, Clone)]
pub struct Validator {
    allowed_currencies: BTreeSet<String>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::with_currencies(VALID_CURRENCIES.iter().copied())
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_currencies<'a>(codes: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            allowed_currencies: codes.into_iter().map(|c| c.to_uppercase()).collect(),
        }
    }

    /// Check every rule over the whole batch, then tag every row with the one
    /// resulting status. Never fails; the outcome travels in the report.
    pub fn validate(&self, dataset: &mut Dataset) -> ValidationReport {
        let issues = self.collect_issues(dataset);
        let status = if issues.is_empty() {
            ValidationStatus::Passed
        } else {
            ValidationStatus::Failed
        };

        let tag = Value::Text(status.as_str().to_string());
        dataset.set_column(VALIDATION_STATUS_COLUMN, vec![tag; dataset.len()]);

        let report = ValidationReport { status, issues };
        metrics::validate::batch(report.passed(), report.issues.len());
        if report.passed() {
            info!(dataset = %dataset.name, rows = dataset.len(), "Validation passed");
        } else {
            warn!(
                dataset = %dataset.name,
                "Validation issues: {}",
                report.issue_messages().join("; ")
            );
        }
        report
    }

    fn collect_issues(&self, dataset: &Dataset) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let null_columns: Vec<String> = dataset
            .schema
            .iter()
            .enumerate()
            .filter(|(idx, _)| dataset.rows.iter().any(|row| row[*idx].is_null()))
            .map(|(_, column)| column.clone())
            .collect();
        if !null_columns.is_empty() {
            issues.push(ValidationIssue::NullValues { columns: null_columns });
        }

        if let Some(idx) = dataset.column_index(AMOUNT_COLUMN) {
            let rows = dataset
                .rows
                .iter()
                .filter(|row| match &row[idx] {
                    Value::Null => false,
                    value => value.as_decimal().map_or(true, |amount| amount <= Decimal::ZERO),
                })
                .count();
            if rows > 0 {
                issues.push(ValidationIssue::NonPositiveAmounts { rows });
            }
        }

        if let Some(idx) = dataset.column_index(CURRENCY_COLUMN) {
            let codes: BTreeSet<String> = dataset
                .rows
                .iter()
                .filter_map(|row| row[idx].as_text())
                .filter(|code| !self.allowed_currencies.contains(&code.trim().to_uppercase()))
                .collect();
            if !codes.is_empty() {
                issues.push(ValidationIssue::InvalidCurrencies {
                    codes: codes.into_iter().collect(),
                });
            }
        }

        issues
    }
}
