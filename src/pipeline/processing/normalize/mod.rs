use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::pipeline::dataset::Dataset;

static NON_WORD_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]+").expect("static regex"));
static UNDERSCORE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"__+").expect("static regex"));

/// Fallback name for a header that contains no usable characters
const EMPTY_COLUMN_NAME: &str = "column";
/// Prefix for headers that would otherwise start with a digit
const LEADING_DIGIT_PREFIX: &str = "col_";

/// Rewrites raw headers into canonical snake_case names.
///
/// Every produced name matches `^[a-z][a-z0-9_]*$` and never contains `__`,
/// whatever the input looks like.
pub trait SchemaNormalizer {
    fn normalize_column(&self, raw: &str) -> String;

    /// Normalize every column name of the dataset in place. Names that collide
    /// after normalization get a numeric suffix so the schema stays a set.
    fn normalize(&self, dataset: &mut Dataset) {
        let mut seen = HashSet::with_capacity(dataset.schema.len());
        let mut out = Vec::with_capacity(dataset.schema.len());
        for raw in &dataset.schema {
            let base = self.normalize_column(raw);
            let mut name = base.clone();
            let mut suffix = 2;
            while !seen.insert(name.clone()) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            out.push(name);
        }
        dataset.schema = out;
    }
}

/// Default normalizer: trim, collapse every run of non-word characters to a
/// single underscore, collapse repeated underscores, lowercase.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnakeCaseNormalizer;

impl SnakeCaseNormalizer {
    pub fn new() -> Self {
        Self
    }
}

impl SchemaNormalizer for SnakeCaseNormalizer {
    fn normalize_column(&self, raw: &str) -> String {
        let replaced = NON_WORD_RUN.replace_all(raw.trim(), "_");
        let collapsed = UNDERSCORE_RUN.replace_all(&replaced, "_");
        let name = collapsed.trim_matches('_').to_lowercase();

        match name.chars().next() {
            None => EMPTY_COLUMN_NAME.to_string(),
            Some(c) if c.is_ascii_digit() => format!("{}{}", LEADING_DIGIT_PREFIX, name),
            Some(_) => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dataset::DatasetName;

    fn is_canonical(name: &str) -> bool {
        let re = Regex::new(r"^[a-z][a-z0-9_]*$").unwrap();
        re.is_match(name) && !name.contains("__")
    }

    #[test]
    fn test_normalizes_punctuation_and_case() {
        let n = SnakeCaseNormalizer::new();
        assert_eq!(n.normalize_column("Click Time!!"), "click_time");
        assert_eq!(n.normalize_column("  TXN-Time "), "txn_time");
        assert_eq!(n.normalize_column("Amount (USD)"), "amount_usd");
        assert_eq!(n.normalize_column("user__id"), "user_id");
        assert_eq!(n.normalize_column("currency"), "currency");
    }

    #[test]
    fn test_degenerate_headers_stay_canonical() {
        let n = SnakeCaseNormalizer::new();
        let headers = ["", "!!!", "  ", "2nd value", "_hidden_", "Prénom", "a - - b", "ÆØÅ", "9"];
        for raw in headers {
            let name = n.normalize_column(raw);
            assert!(is_canonical(&name), "{:?} -> {:?}", raw, name);
        }
        assert_eq!(n.normalize_column("!!!"), "column");
        assert_eq!(n.normalize_column("2nd value"), "col_2nd_value");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let n = SnakeCaseNormalizer::new();
        for raw in ["Click Time!!", "Amount (USD)", "9", "__x__"] {
            let once = n.normalize_column(raw);
            assert_eq!(n.normalize_column(&once), once);
        }
    }

    #[test]
    fn test_colliding_headers_get_suffixes() {
        let mut ds = Dataset::new(
            DatasetName::Transactions,
            vec!["Amount".to_string(), "amount ".to_string(), "AMOUNT!".to_string()],
        );
        SnakeCaseNormalizer::new().normalize(&mut ds);
        assert_eq!(ds.schema, vec!["amount", "amount_2", "amount_3"]);
    }
}
