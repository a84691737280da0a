use std::collections::BTreeSet;
use std::fmt;

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::config::InferenceConfig;
use crate::error::LoadError;

use super::infer;

// ---------------------------------------------------------------------------
// ColumnType – the semantic classification of a column
// ---------------------------------------------------------------------------

/// Semantic type inferred once per load for every column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Numeric,
    Categorical,
    Datetime,
    Boolean,
    Text,
}

impl ColumnType {
    pub const ALL: [ColumnType; 5] = [
        ColumnType::Numeric,
        ColumnType::Categorical,
        ColumnType::Datetime,
        ColumnType::Boolean,
        ColumnType::Text,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Categorical => "categorical",
            ColumnType::Datetime => "datetime",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
        }
    }

    /// Whether the global text search looks at columns of this type.
    pub fn is_searchable(&self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::Categorical)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Value – a single cell parsed under its column's type
// ---------------------------------------------------------------------------

/// A parsed cell. Cells that fail to parse under the column type are `Missing`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Text(String),
    Missing,
}

// -- Manual Eq/Ord so Value can sit in a BTreeSet --

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Missing => 0,
                Bool(_) => 1,
                Number(_) => 2,
                DateTime(_) => 3,
                Text(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Bool(a), Bool(b)) => a.cmp(b),
            (Number(a), Number(b)) => a.total_cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{}", format_number(*v)),
            Value::Bool(b) => write!(f, "{b}"),
            Value::DateTime(d) if d.time() == NaiveTime::MIN => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S")),
            Value::Text(s) => write!(f, "{s}"),
            Value::Missing => write!(f, "<missing>"),
        }
    }
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(d) => Some(*d),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

/// Render a float compactly: integral values without a fraction, others with
/// up to four decimals.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        let s = format!("{v:.4}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

// ---------------------------------------------------------------------------
// Table – raw cells as loaded
// ---------------------------------------------------------------------------

/// One named column of raw cells; `None` is a missing cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Option<String>>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Non-missing raw values in row order.
    pub fn non_missing(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().filter_map(|c| c.as_deref())
    }
}

/// The loaded dataset before inference. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Build a table, enforcing equal column lengths and unique names.
    pub fn new(columns: Vec<Column>) -> Result<Self, LoadError> {
        let rows = columns.first().map(Column::len).unwrap_or(0);
        let mut seen = BTreeSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(LoadError::DuplicateColumn(col.name.clone()));
            }
            if col.len() != rows {
                return Err(LoadError::RaggedColumn {
                    column: col.name.clone(),
                    expected: rows,
                    actual: col.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

// ---------------------------------------------------------------------------
// Dataset – the table with inferred types and parsed values
// ---------------------------------------------------------------------------

/// A column after inference: raw cells, type, and parsed values.
#[derive(Debug, Clone)]
pub struct TypedColumn {
    pub name: String,
    pub kind: ColumnType,
    pub raw: Vec<Option<String>>,
    pub values: Vec<Value>,
}

impl TypedColumn {
    /// Parse every cell of `column` under `kind`.
    pub fn from_column(column: Column, kind: ColumnType) -> Self {
        let values: Vec<Value> = column
            .cells
            .iter()
            .map(|cell| infer::parse_value(cell.as_deref(), kind))
            .collect();
        let unparsed = column
            .cells
            .iter()
            .zip(&values)
            .filter(|(raw, value)| raw.is_some() && value.is_missing())
            .count();
        if unparsed > 0 {
            log::warn!(
                "Column '{}': {unparsed} value(s) do not parse as {kind} and are treated as missing",
                column.name
            );
        }
        Self {
            name: column.name,
            kind,
            raw: column.cells,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn raw_at(&self, row: usize) -> Option<&str> {
        self.raw.get(row).and_then(|c| c.as_deref())
    }
}

/// The full parsed dataset.
#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<TypedColumn>,
    rows: usize,
}

impl Dataset {
    /// Infer every column's type and parse its cells.
    pub fn from_table(table: Table, config: &InferenceConfig) -> Self {
        let rows = table.row_count();
        let kinds = infer::infer_types(&table, config);
        let columns = table
            .into_columns()
            .into_iter()
            .zip(kinds)
            .map(|(col, kind)| {
                log::debug!("Column '{}' inferred as {kind}", col.name);
                TypedColumn::from_column(col, kind)
            })
            .collect();
        Self { columns, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Whether the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn columns(&self) -> &[TypedColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&TypedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn types(&self) -> Vec<ColumnType> {
        self.columns.iter().map(|c| c.kind).collect()
    }

    pub fn count_of(&self, kind: ColumnType) -> usize {
        self.columns.iter().filter(|c| c.kind == kind).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::table_from_rows;

    #[test]
    fn test_table_rejects_ragged_columns() {
        let err = Table::new(vec![
            Column::new("a", vec![Some("1".into()), Some("2".into())]),
            Column::new("b", vec![Some("x".into())]),
        ])
        .unwrap_err();
        assert!(matches!(err, LoadError::RaggedColumn { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_table_rejects_duplicate_names() {
        let err = Table::new(vec![Column::new("a", vec![]), Column::new("a", vec![])]).unwrap_err();
        assert!(matches!(err, LoadError::DuplicateColumn(name) if name == "a"));
    }

    #[test]
    fn test_dataset_parses_values_under_inferred_type() {
        let table = table_from_rows(
            &["Date", "Category", "Amount"],
            &[
                &["2024-01-01", "A", "10"],
                &["2024-01-02", "B", "20"],
                &["2024-01-03", "A", "30"],
                &["2024-01-04", "A", "40"],
                &["2024-01-05", "B", "50"],
            ],
        );
        let ds = Dataset::from_table(table, &InferenceConfig::default());

        assert_eq!(ds.len(), 5);
        assert_eq!(
            ds.types(),
            vec![ColumnType::Datetime, ColumnType::Categorical, ColumnType::Numeric]
        );
        let amount = ds.column("Amount").unwrap();
        assert_eq!(amount.values[1], Value::Number(20.0));
        assert_eq!(ds.count_of(ColumnType::Categorical), 1);
    }

    #[test]
    fn test_unparseable_cells_become_missing() {
        let table = table_from_rows(
            &["score"],
            &[&["1"], &["2"], &["3"], &["n/a"], &["5"], &["6"], &["7"], &["8"], &["9"], &["10"]],
        );
        let ds = Dataset::from_table(table, &InferenceConfig::default().with_tolerance(0.2));

        let score = ds.column("score").unwrap();
        assert_eq!(score.kind, ColumnType::Numeric);
        assert_eq!(score.raw_at(3), Some("n/a"));
        assert_eq!(score.values[3], Value::Missing);
        assert_eq!(score.values[4], Value::Number(5.0));
    }

    #[test]
    fn test_value_ordering_and_display() {
        let mut set = BTreeSet::new();
        set.insert(Value::Text("b".into()));
        set.insert(Value::Missing);
        set.insert(Value::Number(2.5));
        set.insert(Value::Number(-1.0));
        let ordered: Vec<String> = set.iter().map(|v| v.to_string()).collect();
        assert_eq!(ordered, vec!["<missing>", "-1", "2.5", "b"]);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(3.14159), "3.1416");
        assert_eq!(format_number(0.5), "0.5");
    }
}
