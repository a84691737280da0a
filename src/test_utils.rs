//! Fixtures shared by unit tests.

use crate::config::InferenceConfig;
use crate::data::model::{Column, Dataset, Table};

/// Build a table from string rows; empty strings become missing cells.
pub fn table_from_rows(headers: &[&str], rows: &[&[&str]]) -> Table {
    let columns = headers
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let cells = rows
                .iter()
                .map(|row| match row[i] {
                    "" => None,
                    s => Some(s.to_string()),
                })
                .collect();
            Column::new(*name, cells)
        })
        .collect();
    Table::new(columns).unwrap()
}

/// Build and infer a dataset with default thresholds.
pub fn dataset_from_rows(headers: &[&str], rows: &[&[&str]]) -> Dataset {
    Dataset::from_table(table_from_rows(headers, rows), &InferenceConfig::default())
}

/// The three-row sales table used across filter and summary tests.
pub fn sales_dataset() -> Dataset {
    dataset_from_rows(
        &["Date", "Category", "Amount"],
        &[
            &["2024-01-01", "A", "10"],
            &["2024-01-02", "B", "20"],
            &["2024-01-03", "A", "30"],
        ],
    )
}
