//! Column type inference.
//!
//! Rules run in a fixed order and the first one that holds wins:
//! boolean → datetime → numeric → categorical → text. Each rule tolerates a
//! configurable share of unparseable cells, which are later read as missing.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::config::InferenceConfig;
use crate::error::InferenceError;

use super::model::{Column, ColumnType, Table, Value};

const RULE_ORDER: [ColumnType; 4] = [
    ColumnType::Boolean,
    ColumnType::Datetime,
    ColumnType::Numeric,
    ColumnType::Categorical,
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

// ---------------------------------------------------------------------------
// Literal parsers
// ---------------------------------------------------------------------------

/// Parse a boolean literal (`true/false`, `yes/no`, `y/n`, `t/f`, `1/0`).
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "t" | "1" => Some(true),
        "false" | "no" | "n" | "f" | "0" => Some(false),
        _ => None,
    }
}

/// Parse a date or date-time under the accepted formats.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
}

/// Parse a finite number with a `.` decimal point.
pub fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse one raw cell under `kind`; anything unparseable becomes `Missing`.
pub fn parse_value(raw: Option<&str>, kind: ColumnType) -> Value {
    let Some(raw) = raw else {
        return Value::Missing;
    };
    let parsed = match kind {
        ColumnType::Boolean => parse_bool(raw).map(Value::Bool),
        ColumnType::Datetime => parse_datetime(raw).map(Value::DateTime),
        ColumnType::Numeric => parse_number(raw).map(Value::Number),
        ColumnType::Categorical | ColumnType::Text => Some(Value::Text(raw.to_string())),
    };
    parsed.unwrap_or(Value::Missing)
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Classify a column. Deterministic for identical input.
pub fn infer(column: &Column, config: &InferenceConfig) -> ColumnType {
    let values: Vec<&str> = column.non_missing().collect();
    if values.is_empty() {
        log::debug!("Column '{}': {}", column.name, InferenceError::NoValues);
        return ColumnType::Text;
    }

    for target in RULE_ORDER {
        match check_rule(target, &values, column.len(), config) {
            Ok(()) => return target,
            Err(e) => log::debug!("Column '{}' is not {target}: {e}", column.name),
        }
    }
    ColumnType::Text
}

/// Classify every column of a table, in column order.
pub fn infer_types(table: &Table, config: &InferenceConfig) -> Vec<ColumnType> {
    table.columns().iter().map(|c| infer(c, config)).collect()
}

fn check_rule(
    target: ColumnType,
    values: &[&str],
    rows: usize,
    config: &InferenceConfig,
) -> Result<(), InferenceError> {
    match target {
        ColumnType::Boolean => {
            check_parse(target, values, config, |s| parse_bool(s).is_some())?;
            let literals: BTreeSet<String> = values
                .iter()
                .filter(|s| parse_bool(**s).is_some())
                .map(|s| s.trim().to_ascii_lowercase())
                .collect();
            if literals.len() > config.boolean_max_distinct {
                return Err(InferenceError::TooManyDistinct {
                    target,
                    distinct: literals.len(),
                    limit: config.boolean_max_distinct,
                });
            }
            Ok(())
        }
        ColumnType::Datetime => {
            check_parse(target, values, config, |s| parse_datetime(s).is_some())
        }
        ColumnType::Numeric => check_parse(target, values, config, |s| parse_number(s).is_some()),
        ColumnType::Categorical => {
            let distinct = values.iter().collect::<BTreeSet<_>>().len();
            let limit = config.categorical_limit(rows);
            if distinct > limit {
                return Err(InferenceError::TooManyDistinct {
                    target,
                    distinct,
                    limit,
                });
            }
            let repeat_limit = config.categorical_max_unique_ratio * values.len() as f64;
            if distinct as f64 >= repeat_limit {
                return Err(InferenceError::TooManyDistinct {
                    target,
                    distinct,
                    limit: (repeat_limit.ceil() as usize).saturating_sub(1),
                });
            }
            Ok(())
        }
        ColumnType::Text => Ok(()),
    }
}

/// Every value must parse, up to the configured tolerance, and at least one
/// value must actually parse.
fn check_parse(
    target: ColumnType,
    values: &[&str],
    config: &InferenceConfig,
    parses: impl Fn(&str) -> bool,
) -> Result<(), InferenceError> {
    let failed = values.iter().filter(|s| !parses(**s)).count();
    let allowed = config.allowed_failures(values.len());
    if failed > allowed || failed == values.len() {
        return Err(InferenceError::TooManyInvalid {
            target,
            failed,
            total: values.len(),
            allowed,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn column(values: &[&str]) -> Column {
        Column::new(
            "col",
            values
                .iter()
                .map(|v| if v.is_empty() { None } else { Some(v.to_string()) })
                .collect(),
        )
    }

    fn infer_default(values: &[&str]) -> ColumnType {
        infer(&column(values), &InferenceConfig::default())
    }

    #[test]
    fn test_boolean_literals() {
        assert_eq!(infer_default(&["true", "false", "true"]), ColumnType::Boolean);
        assert_eq!(infer_default(&["Yes", "no", "", "yes"]), ColumnType::Boolean);
        assert_eq!(infer_default(&["0", "1", "1", "0"]), ColumnType::Boolean);
    }

    #[test]
    fn test_boolean_requires_low_cardinality() {
        // Three distinct literals: not a boolean column.
        assert_ne!(infer_default(&["yes", "no", "true", "no"]), ColumnType::Boolean);
    }

    #[test]
    fn test_datetime_formats() {
        assert_eq!(infer_default(&["2024-01-01", "2024-02-15"]), ColumnType::Datetime);
        assert_eq!(
            infer_default(&["2024-01-01 10:00:00", "2024-01-01T11:30:00.250"]),
            ColumnType::Datetime
        );
        assert_eq!(infer_default(&["2024-01-01T10:00:00Z"]), ColumnType::Datetime);
        assert_eq!(infer_default(&["01/31/2024", "12/01/2023"]), ColumnType::Datetime);
        assert_eq!(infer_default(&["Jan 05, 2024", "Feb 10, 2024"]), ColumnType::Datetime);
    }

    #[test]
    fn test_plain_integers_are_not_dates() {
        assert_eq!(infer_default(&["2024", "2025", "17"]), ColumnType::Numeric);
    }

    #[test]
    fn test_numeric() {
        assert_eq!(infer_default(&["1", "2.5", "-3e2", "+4"]), ColumnType::Numeric);
        assert_eq!(infer_default(&["nan", "inf"]), ColumnType::Text);
    }

    #[test]
    fn test_categorical_needs_repeats() {
        assert_eq!(infer_default(&["A", "B", "A"]), ColumnType::Categorical);
        assert_eq!(infer_default(&["alpha", "beta", "gamma"]), ColumnType::Text);
    }

    #[test]
    fn test_high_cardinality_is_text() {
        let owned: Vec<String> = (0..100).map(|i| format!("note {}", i % 40)).collect();
        let values: Vec<&str> = owned.iter().map(String::as_str).collect();
        // 40 distinct > max(20, 5% of 100)
        assert_eq!(infer_default(&values), ColumnType::Text);
    }

    #[test]
    fn test_all_missing_is_text() {
        assert_eq!(infer_default(&["", "", ""]), ColumnType::Text);
        assert_eq!(infer_default(&[]), ColumnType::Text);
    }

    #[test]
    fn test_zero_tolerance_rejects_single_bad_cell() {
        let config = InferenceConfig::default().with_tolerance(0.0);
        let col = column(&["1", "2", "3.5", "abc"]);
        assert_eq!(infer(&col, &config), ColumnType::Text);
    }

    #[test]
    fn test_tolerance_keeps_mostly_numeric_column() {
        let mut owned: Vec<String> = (0..999).map(|i| format!("{}.5", i)).collect();
        owned.insert(500, "oops".to_string());
        let values: Vec<&str> = owned.iter().map(String::as_str).collect();
        let col = column(&values);

        let kind = infer(&col, &InferenceConfig::default());
        assert_eq!(kind, ColumnType::Numeric);
        assert_eq!(parse_value(Some("oops"), kind), Value::Missing);
        assert_eq!(parse_value(Some("2.5"), kind), Value::Number(2.5));
    }

    #[test]
    fn test_infer_types_in_column_order() {
        let table = Table::new(vec![
            column(&["yes", "no", "yes"]),
            Column::new("when", column(&["2024-01-01", "2024-02-01", ""]).cells),
            Column::new("qty", column(&["1", "2", "3"]).cells),
        ])
        .unwrap();
        assert_eq!(
            infer_types(&table, &InferenceConfig::default()),
            vec![ColumnType::Boolean, ColumnType::Datetime, ColumnType::Numeric]
        );
    }

    #[test]
    fn test_rule_errors_describe_failure() {
        let err = check_rule(
            ColumnType::Numeric,
            &["1", "x"],
            2,
            &InferenceConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            InferenceError::TooManyInvalid {
                target: ColumnType::Numeric,
                failed: 1,
                total: 2,
                allowed: 0,
            }
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_inference_is_deterministic(cells in prop::collection::vec("[a-c0-9.]{0,4}", 0..40)) {
            let values: Vec<&str> = cells.iter().map(String::as_str).collect();
            let col = column(&values);
            let config = InferenceConfig::default();
            prop_assert_eq!(infer(&col, &config), infer(&col, &config));
        }
    }
}
