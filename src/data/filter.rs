use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigurationError;

use super::infer;
use super::model::{ColumnType, Dataset, TypedColumn, Value};

// ---------------------------------------------------------------------------
// Criteria
// ---------------------------------------------------------------------------

/// One declarative filtering rule bound to one column.
///
/// Ranges are inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterCriterion {
    TextSearch {
        query: String,
    },
    NumericRange {
        min: f64,
        max: f64,
    },
    DateRange {
        #[serde(deserialize_with = "datetime_or_date")]
        start: NaiveDateTime,
        #[serde(deserialize_with = "datetime_or_date")]
        end: NaiveDateTime,
    },
    CategoricalSelection {
        values: BTreeSet<String>,
        /// `true` lifts the restriction entirely.
        #[serde(default)]
        all: bool,
    },
}

impl FilterCriterion {
    pub fn name(&self) -> &'static str {
        match self {
            FilterCriterion::TextSearch { .. } => "TextSearch",
            FilterCriterion::NumericRange { .. } => "NumericRange",
            FilterCriterion::DateRange { .. } => "DateRange",
            FilterCriterion::CategoricalSelection { .. } => "CategoricalSelection",
        }
    }

    /// Whether this criterion kind applies to a column of type `kind`.
    pub fn accepts(&self, kind: ColumnType) -> bool {
        match self {
            FilterCriterion::TextSearch { .. } => kind.is_searchable(),
            FilterCriterion::NumericRange { .. } => kind == ColumnType::Numeric,
            FilterCriterion::DateRange { .. } => kind == ColumnType::Datetime,
            FilterCriterion::CategoricalSelection { .. } => {
                matches!(kind, ColumnType::Categorical | ColumnType::Boolean)
            }
        }
    }

    /// Human-readable form used in the UI and the exported report.
    pub fn describe(&self) -> String {
        match self {
            FilterCriterion::TextSearch { query } => format!("contains \"{query}\""),
            FilterCriterion::NumericRange { min, max } => format!("{min} to {max}"),
            FilterCriterion::DateRange { start, end } => format!(
                "{} to {}",
                Value::DateTime(*start),
                Value::DateTime(*end)
            ),
            FilterCriterion::CategoricalSelection { all: true, .. } => "all values".to_string(),
            FilterCriterion::CategoricalSelection { values, .. } if values.is_empty() => {
                "no values".to_string()
            }
            FilterCriterion::CategoricalSelection { values, .. } => values
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn check_bounds(&self, column: &str) -> Result<(), ConfigurationError> {
        let reason = match self {
            FilterCriterion::NumericRange { min, max } if min.is_nan() || max.is_nan() => {
                Some("bound is not a number".to_string())
            }
            FilterCriterion::NumericRange { min, max } if min > max => {
                Some(format!("min {min} is greater than max {max}"))
            }
            FilterCriterion::DateRange { start, end } if start > end => {
                Some(format!("start {start} is after end {end}"))
            }
            _ => None,
        };
        match reason {
            Some(reason) => Err(ConfigurationError::InvalidRange {
                column: column.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Compile into a per-row predicate over `column`.
    fn predicate<'a>(&'a self, column: &'a TypedColumn) -> Box<dyn Fn(usize) -> bool + 'a> {
        match self {
            FilterCriterion::TextSearch { query } if query.trim().is_empty() => Box::new(|_| true),
            FilterCriterion::TextSearch { query } => {
                let needle = query.to_lowercase();
                Box::new(move |row| contains_ci(column.raw_at(row), &needle))
            }
            FilterCriterion::NumericRange { min, max } => Box::new(move |row| {
                column.values[row]
                    .as_f64()
                    .is_some_and(|v| *min <= v && v <= *max)
            }),
            FilterCriterion::DateRange { start, end } => Box::new(move |row| {
                column.values[row]
                    .as_datetime()
                    .is_some_and(|d| *start <= d && d <= *end)
            }),
            FilterCriterion::CategoricalSelection { all: true, .. } => Box::new(|_| true),
            FilterCriterion::CategoricalSelection { values, .. } => {
                Box::new(move |row| column.raw_at(row).is_some_and(|v| values.contains(v)))
            }
        }
    }
}

/// Accept every literal the datetime inference accepts, bare dates included.
fn datetime_or_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
    let text = String::deserialize(deserializer)?;
    infer::parse_datetime(&text)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date or datetime {text:?}")))
}

fn contains_ci(haystack: Option<&str>, needle_lower: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle_lower))
}

// ---------------------------------------------------------------------------
// FilterSet
// ---------------------------------------------------------------------------

/// At most one criterion per column plus an optional global text search.
/// All active parts are combined with logical AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default)]
    criteria: BTreeMap<String, FilterCriterion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    global_search: Option<String>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`FilterSet::set`].
    pub fn with(mut self, column: impl Into<String>, criterion: FilterCriterion) -> Self {
        self.set(column, criterion);
        self
    }

    /// Set the criterion for a column, returning the one it replaces.
    pub fn set(
        &mut self,
        column: impl Into<String>,
        criterion: FilterCriterion,
    ) -> Option<FilterCriterion> {
        self.criteria.insert(column.into(), criterion)
    }

    pub fn remove(&mut self, column: &str) -> Option<FilterCriterion> {
        self.criteria.remove(column)
    }

    pub fn get(&self, column: &str) -> Option<&FilterCriterion> {
        self.criteria.get(column)
    }

    pub fn criteria(&self) -> impl Iterator<Item = (&str, &FilterCriterion)> {
        self.criteria.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn set_global_search(&mut self, query: impl Into<String>) {
        let query = query.into();
        self.global_search = if query.trim().is_empty() {
            None
        } else {
            Some(query)
        };
    }

    /// The global search query, if one is active.
    pub fn global_search(&self) -> Option<&str> {
        self.global_search
            .as_deref()
            .filter(|q| !q.trim().is_empty())
    }

    /// Whether no criterion and no global search is set.
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty() && self.global_search().is_none()
    }

    pub fn clear(&mut self) {
        self.criteria.clear();
        self.global_search = None;
    }
}

// ---------------------------------------------------------------------------
// RowMask
// ---------------------------------------------------------------------------

/// One entry per row; `true` means the row survives filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMask(Vec<bool>);

impl RowMask {
    pub fn all(rows: usize) -> Self {
        Self(vec![true; rows])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of surviving rows.
    pub fn count(&self) -> usize {
        self.0.iter().filter(|b| **b).count()
    }

    pub fn get(&self, row: usize) -> bool {
        self.0.get(row).copied().unwrap_or(false)
    }

    /// Indices of surviving rows, ascending.
    pub fn selected(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, keep)| **keep)
            .map(|(i, _)| i)
    }

    /// AND the mask with a per-row predicate.
    fn retain(&mut self, keep: impl Fn(usize) -> bool) {
        for (row, slot) in self.0.iter_mut().enumerate() {
            if *slot && !keep(row) {
                *slot = false;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mask evaluation
// ---------------------------------------------------------------------------

/// The mask plus the criteria that had to be dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskOutcome {
    pub mask: RowMask,
    pub warnings: Vec<ConfigurationError>,
}

/// Check that a criterion can be applied to the named column.
pub fn validate_criterion<'a>(
    dataset: &'a Dataset,
    column: &str,
    criterion: &FilterCriterion,
) -> Result<&'a TypedColumn, ConfigurationError> {
    let col = dataset
        .column(column)
        .ok_or_else(|| ConfigurationError::UnknownColumn(column.to_string()))?;
    if !criterion.accepts(col.kind) {
        return Err(ConfigurationError::TypeMismatch {
            column: column.to_string(),
            criterion: criterion.name(),
            actual: col.kind,
        });
    }
    criterion.check_bounds(column)?;
    Ok(col)
}

/// Evaluate a filter set against a dataset.
///
/// Invalid criteria are dropped and reported; the rest still apply. The
/// result depends only on the inputs, so repeated calls agree.
pub fn build_mask(dataset: &Dataset, filters: &FilterSet) -> MaskOutcome {
    let mut mask = RowMask::all(dataset.len());
    let mut warnings = Vec::new();

    for (name, criterion) in filters.criteria() {
        match validate_criterion(dataset, name, criterion) {
            Ok(column) => mask.retain(criterion.predicate(column)),
            Err(e) => {
                log::warn!("Dropping filter: {e}");
                warnings.push(e);
            }
        }
    }

    if let Some(query) = filters.global_search() {
        let searchable: Vec<&TypedColumn> = dataset
            .columns()
            .iter()
            .filter(|c| c.kind.is_searchable())
            .collect();
        if searchable.is_empty() {
            log::debug!("Global search ignored: no text or categorical columns");
        } else {
            let needle = query.to_lowercase();
            mask.retain(|row| searchable.iter().any(|c| contains_ci(c.raw_at(row), &needle)));
        }
    }

    MaskOutcome { mask, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{dataset_from_rows, sales_dataset};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn selection(values: &[&str], all: bool) -> FilterCriterion {
        FilterCriterion::CategoricalSelection {
            values: values.iter().map(|s| s.to_string()).collect(),
            all,
        }
    }

    fn mixed_dataset() -> Dataset {
        dataset_from_rows(
            &["Date", "Category", "Amount", "Notes"],
            &[
                &["2024-01-01", "A", "10", "first order"],
                &["2024-01-02", "B", "", "Second order"],
                &["2024-01-03", "A", "30", "refund"],
                &["2024-01-04", "C", "15", "bulk purchase"],
                &["2024-01-05", "B", "20", "gift"],
                &["2024-01-06", "A", "5", "late delivery"],
                &["2024-01-07", "C", "50", ""],
                &["", "", "25", "ORDER again"],
            ],
        )
    }

    #[test]
    fn test_fixture_types() {
        assert_eq!(
            mixed_dataset().types(),
            vec![
                ColumnType::Datetime,
                ColumnType::Categorical,
                ColumnType::Numeric,
                ColumnType::Text
            ]
        );
    }

    #[test]
    fn test_empty_filter_set_is_all_true() {
        let ds = mixed_dataset();
        let outcome = build_mask(&ds, &FilterSet::new());
        assert_eq!(outcome.mask, RowMask::all(8));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_categorical_selection_scenario() {
        let ds = sales_dataset();
        let filters = FilterSet::new().with("Category", selection(&["A"], false));
        let outcome = build_mask(&ds, &filters);
        assert_eq!(outcome.mask.selected().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_empty_selection_matches_nothing_unless_all() {
        let ds = mixed_dataset();
        let none = FilterSet::new().with("Category", selection(&[], false));
        assert_eq!(build_mask(&ds, &none).mask.count(), 0);

        let all = FilterSet::new()
            .with("Category", selection(&[], true))
            .with("Amount", FilterCriterion::NumericRange { min: 10.0, max: 30.0 });
        let only_amount =
            FilterSet::new().with("Amount", FilterCriterion::NumericRange { min: 10.0, max: 30.0 });
        assert_eq!(build_mask(&ds, &all).mask, build_mask(&ds, &only_amount).mask);
    }

    #[test]
    fn test_numeric_range_excludes_missing() {
        let ds = mixed_dataset();
        let filters =
            FilterSet::new().with("Amount", FilterCriterion::NumericRange { min: 10.0, max: 20.0 });
        let mask = build_mask(&ds, &filters).mask;
        // Row 1 has no amount and must not survive.
        assert_eq!(mask.selected().collect::<Vec<_>>(), vec![0, 3, 4]);
        assert!(!mask.get(1));
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let ds = mixed_dataset();
        let filters = FilterSet::new().with(
            "Date",
            FilterCriterion::DateRange {
                start: date(2024, 1, 2),
                end: date(2024, 1, 4),
            },
        );
        let mask = build_mask(&ds, &filters).mask;
        assert_eq!(mask.selected().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_global_search_is_case_insensitive_across_text_columns() {
        let ds = mixed_dataset();
        let mut filters = FilterSet::new();
        filters.set_global_search("order");
        let mask = build_mask(&ds, &filters).mask;
        assert_eq!(mask.selected().collect::<Vec<_>>(), vec![0, 1, 7]);

        // Categorical values are searched as well.
        filters.set_global_search("c");
        let mask = build_mask(&ds, &filters).mask;
        assert!(mask.get(3) && mask.get(6));
    }

    #[test]
    fn test_blank_global_search_is_inactive() {
        let mut filters = FilterSet::new();
        filters.set_global_search("   ");
        assert!(filters.is_empty());
        assert_eq!(build_mask(&mixed_dataset(), &filters).mask.count(), 8);
    }

    #[test]
    fn test_column_text_search() {
        let ds = mixed_dataset();
        let filters = FilterSet::new().with(
            "Notes",
            FilterCriterion::TextSearch {
                query: "ORDER".to_string(),
            },
        );
        assert_eq!(build_mask(&ds, &filters).mask.count(), 3);
    }

    #[test]
    fn test_unknown_column_is_dropped_with_warning() {
        let ds = mixed_dataset();
        let filters = FilterSet::new()
            .with("Nope", FilterCriterion::NumericRange { min: 0.0, max: 1.0 })
            .with("Category", selection(&["A"], false));
        let outcome = build_mask(&ds, &filters);
        assert_eq!(
            outcome.warnings,
            vec![ConfigurationError::UnknownColumn("Nope".to_string())]
        );
        assert_eq!(outcome.mask.count(), 3);
    }

    #[test]
    fn test_type_mismatch_is_dropped_with_warning() {
        let ds = mixed_dataset();
        let filters =
            FilterSet::new().with("Notes", FilterCriterion::NumericRange { min: 0.0, max: 1.0 });
        let outcome = build_mask(&ds, &filters);
        assert_eq!(outcome.mask.count(), 8);
        assert!(matches!(
            &outcome.warnings[..],
            [ConfigurationError::TypeMismatch { criterion: "NumericRange", actual: ColumnType::Text, .. }]
        ));
    }

    #[test]
    fn test_inverted_range_is_dropped_with_warning() {
        let ds = mixed_dataset();
        let filters =
            FilterSet::new().with("Amount", FilterCriterion::NumericRange { min: 5.0, max: 1.0 });
        let outcome = build_mask(&ds, &filters);
        assert_eq!(outcome.mask.count(), 8);
        assert!(matches!(
            &outcome.warnings[..],
            [ConfigurationError::InvalidRange { .. }]
        ));
    }

    #[test]
    fn test_filter_set_json_shape() {
        let mut filters = FilterSet::new().with("Category", selection(&["A", "B"], false));
        filters.set_global_search("gift");
        let json = serde_json::to_string(&filters).unwrap();
        assert!(json.contains(r#""kind":"categorical_selection""#));
        let back: FilterSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filters);

        let parsed: FilterSet = serde_json::from_str(
            r#"{"criteria": {"Amount": {"kind": "numeric_range", "min": 1, "max": 2}}}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.get("Amount"),
            Some(&FilterCriterion::NumericRange { min: 1.0, max: 2.0 })
        );
    }

    #[test]
    fn test_date_range_accepts_bare_dates_in_json() {
        let parsed: FilterSet = serde_json::from_str(
            r#"{"criteria": {"Date": {"kind": "date_range", "start": "2024-01-02", "end": "2024-01-03T12:00:00"}}}"#,
        )
        .unwrap();
        assert_eq!(
            parsed.get("Date"),
            Some(&FilterCriterion::DateRange {
                start: date(2024, 1, 2),
                end: date(2024, 1, 3) + chrono::Duration::hours(12),
            })
        );
        assert_eq!(build_mask(&mixed_dataset(), &parsed).mask.count(), 2);

        // Serialized ranges read back unchanged.
        let json = serde_json::to_string(&parsed).unwrap();
        assert_eq!(serde_json::from_str::<FilterSet>(&json).unwrap(), parsed);

        let bad = serde_json::from_str::<FilterSet>(
            r#"{"criteria": {"Date": {"kind": "date_range", "start": "soon", "end": "2024-01-03"}}}"#,
        );
        assert!(bad.is_err());
    }

    fn arb_criterion() -> impl Strategy<Value = (String, FilterCriterion)> {
        prop_oneof![
            (-10.0f64..60.0, 0.0f64..50.0).prop_map(|(min, width)| {
                (
                    "Amount".to_string(),
                    FilterCriterion::NumericRange {
                        min,
                        max: min + width,
                    },
                )
            }),
            (
                prop::collection::btree_set(prop::sample::select(vec!["A", "B", "C", "Z"]), 0..4),
                any::<bool>()
            )
                .prop_map(|(values, all)| {
                    (
                        "Category".to_string(),
                        FilterCriterion::CategoricalSelection {
                            values: values.into_iter().map(String::from).collect(),
                            all,
                        },
                    )
                }),
            "[a-e ]{0,3}".prop_map(|query| {
                ("Notes".to_string(), FilterCriterion::TextSearch { query })
            }),
            (1u32..8, 0u32..8).prop_map(|(start, len)| {
                (
                    "Date".to_string(),
                    FilterCriterion::DateRange {
                        start: date(2024, 1, start),
                        end: date(2024, 1, start) + chrono::Duration::days(i64::from(len)),
                    },
                )
            }),
            Just((
                "Missing".to_string(),
                FilterCriterion::NumericRange { min: 0.0, max: 1.0 }
            )),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_mask_is_sized_idempotent_and_monotonic(
            base in prop::collection::vec(arb_criterion(), 0..4),
            extra in arb_criterion(),
            search in prop::option::of("[a-e]{1,2}"),
        ) {
            let ds = mixed_dataset();
            let mut filters = FilterSet::new();
            for (column, criterion) in base {
                filters.set(column, criterion);
            }
            if let Some(q) = search {
                filters.set_global_search(q);
            }

            let before = build_mask(&ds, &filters).mask;
            prop_assert_eq!(before.len(), ds.len());
            prop_assert_eq!(&build_mask(&ds, &filters).mask, &before);

            if filters.get(&extra.0).is_none() {
                let mut narrowed = filters.clone();
                narrowed.set(extra.0, extra.1);
                let after = build_mask(&ds, &narrowed).mask;
                prop_assert!(after.count() <= before.count());
                prop_assert!(after.selected().all(|row| before.get(row)));
            }
        }
    }
}
