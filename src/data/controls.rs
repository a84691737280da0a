//! Declarative descriptions of the filter control each column gets.
//!
//! The UI renders these; nothing here depends on a toolkit.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;

use crate::config::ControlConfig;

use super::filter::FilterCriterion;
use super::model::{ColumnType, Dataset, TypedColumn};

#[derive(Debug, Clone, PartialEq)]
pub enum FilterControl {
    /// Slider pair over the observed numeric range.
    Range { min: f64, max: f64 },
    /// Start/end pickers over the observed dates.
    DateRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// Checklist of raw values.
    MultiSelect(Checklist),
    /// Free-text substring box.
    Search,
}

impl FilterControl {
    /// The criterion a control produces when left at its initial position.
    /// Applying it never removes a row with a value.
    pub fn initial_criterion(&self) -> Option<FilterCriterion> {
        match self {
            FilterControl::Range { min, max } => Some(FilterCriterion::NumericRange {
                min: *min,
                max: *max,
            }),
            FilterControl::DateRange { start, end } => Some(FilterCriterion::DateRange {
                start: *start,
                end: *end,
            }),
            FilterControl::MultiSelect(_) => Some(FilterCriterion::CategoricalSelection {
                values: Default::default(),
                all: true,
            }),
            FilterControl::Search => None,
        }
    }
}

/// Checkboxes for the most frequent values of a column.
///
/// High-cardinality columns list only some of their values. The selection is
/// always tracked over every distinct value, so an unlisted value stays
/// allowed until the None button clears it.
#[derive(Debug, Clone, PartialEq)]
pub struct Checklist {
    /// Values offered as checkboxes.
    pub choices: Vec<String>,
    /// Every distinct raw value of the column.
    pub values: BTreeSet<String>,
}

impl Checklist {
    /// Values allowed by the column's current criterion.
    pub fn selected(&self, current: Option<&FilterCriterion>) -> BTreeSet<String> {
        match current {
            Some(FilterCriterion::CategoricalSelection { values, all: false }) => values.clone(),
            _ => self.values.clone(),
        }
    }

    /// The criterion after ticking or unticking one checkbox. `None` once
    /// every value is allowed again.
    pub fn toggle(
        &self,
        current: Option<&FilterCriterion>,
        choice: &str,
        checked: bool,
    ) -> Option<FilterCriterion> {
        let mut selected = self.selected(current);
        if checked {
            selected.insert(choice.to_string());
        } else {
            selected.remove(choice);
        }
        (!self.values.is_subset(&selected)).then_some(FilterCriterion::CategoricalSelection {
            values: selected,
            all: false,
        })
    }

    /// Distinct values without a checkbox.
    pub fn unlisted(&self) -> usize {
        self.values.len().saturating_sub(self.choices.len())
    }
}

/// Describe the control for a column, dispatching on its type.
///
/// Returns `None` when the column has no usable values.
pub fn filter_control(column: &TypedColumn, config: &ControlConfig) -> Option<FilterControl> {
    match column.kind {
        ColumnType::Numeric => {
            let mut values = column.values.iter().filter_map(|v| v.as_f64());
            let first = values.next()?;
            let (min, max) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
            Some(FilterControl::Range { min, max })
        }
        ColumnType::Datetime => {
            let stamps = column.values.iter().filter_map(|v| v.as_datetime());
            let (start, end) = stamps.fold(None, |acc: Option<(NaiveDateTime, NaiveDateTime)>, d| {
                Some(match acc {
                    Some((lo, hi)) => (lo.min(d), hi.max(d)),
                    None => (d, d),
                })
            })?;
            Some(FilterControl::DateRange { start, end })
        }
        ColumnType::Categorical | ColumnType::Boolean => {
            let checklist = checklist(column, config.max_choices);
            (!checklist.values.is_empty()).then_some(FilterControl::MultiSelect(checklist))
        }
        ColumnType::Text => Some(FilterControl::Search),
    }
}

/// Controls for every column, paired with the column name.
pub fn filter_controls(dataset: &Dataset, config: &ControlConfig) -> Vec<(String, FilterControl)> {
    dataset
        .columns()
        .iter()
        .filter_map(|c| filter_control(c, config).map(|ctrl| (c.name.clone(), ctrl)))
        .collect()
}

/// All distinct raw values sorted when there are few enough, otherwise the
/// most frequent ones.
fn checklist(column: &TypedColumn, max_choices: usize) -> Checklist {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for raw in column.raw.iter().flatten() {
        *counts.entry(raw.as_str()).or_insert(0) += 1;
    }
    let values: BTreeSet<String> = counts.keys().map(|v| v.to_string()).collect();
    if counts.len() <= max_choices {
        let choices = values.iter().cloned().collect();
        return Checklist { choices, values };
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    let choices = ranked
        .into_iter()
        .take(max_choices)
        .map(|(v, _)| v.to_string())
        .collect();
    Checklist { choices, values }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::{build_mask, FilterSet};
    use crate::test_utils::{dataset_from_rows, sales_dataset};

    #[test]
    fn test_controls_follow_column_type() {
        let ds = sales_dataset();
        let controls = filter_controls(&ds, &ControlConfig::default());
        assert_eq!(controls.len(), 3);
        assert!(matches!(controls[0].1, FilterControl::DateRange { .. }));
        let FilterControl::MultiSelect(checklist) = &controls[1].1 else {
            panic!("expected multi-select");
        };
        assert_eq!(checklist.choices, vec!["A", "B"]);
        assert_eq!(checklist.unlisted(), 0);
        assert_eq!(controls[2].1, FilterControl::Range { min: 10.0, max: 30.0 });
    }

    #[test]
    fn test_text_column_gets_search_box() {
        let ds = dataset_from_rows(&["notes"], &[&["alpha"], &["beta"]]);
        assert_eq!(
            filter_control(&ds.columns()[0], &ControlConfig::default()),
            Some(FilterControl::Search)
        );
    }

    #[test]
    fn test_many_categories_keep_most_frequent() {
        let owned: Vec<String> = (0..15)
            .flat_map(|i| std::iter::repeat(format!("v{i:02}")).take(if i < 3 { 10 } else { 2 }))
            .collect();
        let rows: Vec<[&str; 1]> = owned.iter().map(|s| [s.as_str()]).collect();
        let row_refs: Vec<&[&str]> = rows.iter().map(|r| &r[..]).collect();
        let ds = dataset_from_rows(&["cat"], &row_refs);
        assert_eq!(ds.columns()[0].kind, ColumnType::Categorical);

        let Some(FilterControl::MultiSelect(checklist)) =
            filter_control(&ds.columns()[0], &ControlConfig { max_choices: 5 })
        else {
            panic!("expected multi-select");
        };
        assert_eq!(checklist.choices.len(), 5);
        assert_eq!(&checklist.choices[..3], &["v00", "v01", "v02"]);
        assert_eq!(checklist.values.len(), 15);
        assert_eq!(checklist.unlisted(), 10);
    }

    #[test]
    fn test_unticking_a_choice_keeps_unlisted_values() {
        // 30 categories; c00 is the most frequent, c20..c29 are not listed.
        let owned: Vec<String> = (0..30)
            .flat_map(|i| std::iter::repeat(format!("c{i:02}")).take(40 - i))
            .collect();
        let rows: Vec<[&str; 1]> = owned.iter().map(|s| [s.as_str()]).collect();
        let row_refs: Vec<&[&str]> = rows.iter().map(|r| &r[..]).collect();
        let ds = dataset_from_rows(&["cat"], &row_refs);
        assert_eq!(ds.columns()[0].kind, ColumnType::Categorical);

        let Some(FilterControl::MultiSelect(checklist)) =
            filter_control(&ds.columns()[0], &ControlConfig::default())
        else {
            panic!("expected multi-select");
        };
        assert_eq!(checklist.choices.len(), 20);
        assert!(!checklist.choices.contains(&"c25".to_string()));

        let criterion = checklist.toggle(None, "c00", false).unwrap();
        let filters = FilterSet::new().with("cat", criterion.clone());
        let kept = build_mask(&ds, &filters).mask.count();
        assert_eq!(kept, ds.len() - 40);

        // Ticking it again lifts the restriction.
        assert_eq!(checklist.toggle(Some(&criterion), "c00", true), None);
    }

    #[test]
    fn test_initial_criteria_keep_every_row() {
        let ds = sales_dataset();
        let mut filters = FilterSet::new();
        for (name, control) in filter_controls(&ds, &ControlConfig::default()) {
            if let Some(criterion) = control.initial_criterion() {
                filters.set(name, criterion);
            }
        }
        let outcome = build_mask(&ds, &filters);
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.mask.count(), 3);
    }
}
