use std::path::PathBuf;

use thiserror::Error;

use crate::data::model::ColumnType;

/// Failure to produce a [`Table`](crate::data::model::Table) from a source.
///
/// This is the only error that aborts an operation: without a table there is
/// nothing to infer, filter or summarise.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported file format: {0}")]
    Unsupported(String),

    #[error("Malformed input at line {line}: {message}")]
    Malformed { line: u64, message: String },

    #[error("No data: the source has no header or no rows")]
    Empty,

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Column '{column}' has {actual} cells, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Parquet error: {0}")]
    Parquet(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for LoadError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(io) => LoadError::Io(io),
            csv::ErrorKind::UnequalLengths {
                expected_len, len, ..
            } => LoadError::Malformed {
                line,
                message: format!("expected {expected_len} fields, found {len}"),
            },
            csv::ErrorKind::Utf8 { err, .. } => LoadError::Malformed {
                line,
                message: format!("invalid UTF-8: {err}"),
            },
            other => LoadError::Malformed {
                line,
                message: format!("{other:?}"),
            },
        }
    }
}

/// A classification rule that did not hold for a column.
///
/// Never shown to the user: the inferencer falls through to the next rule and
/// ultimately to Text.
#[derive(Debug, Error, PartialEq)]
pub enum InferenceError {
    #[error("column has no non-missing values")]
    NoValues,

    #[error("{failed} of {total} values do not parse as {target:?} (tolerance {allowed})")]
    TooManyInvalid {
        target: ColumnType,
        failed: usize,
        total: usize,
        allowed: usize,
    },

    #[error("{distinct} distinct values exceed the limit of {limit} for {target:?}")]
    TooManyDistinct {
        target: ColumnType,
        distinct: usize,
        limit: usize,
    },
}

/// A filter criterion that cannot be applied.
///
/// Recovered by dropping the criterion; surfaced to the caller as a warning.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigurationError {
    #[error("Filter references unknown column '{0}'")]
    UnknownColumn(String),

    #[error("{criterion} filter cannot be applied to {actual:?} column '{column}'")]
    TypeMismatch {
        column: String,
        criterion: &'static str,
        actual: ColumnType,
    },

    #[error("Invalid range for column '{column}': {reason}")]
    InvalidRange { column: String, reason: String },
}
