use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use arrow::array::{Array, AsArray, BooleanArray};
use arrow::datatypes::DataType;
use arrow::util::display::array_value_to_string;
use calamine::{open_workbook_auto, Data, Range, Reader};
use flate2::read::GzDecoder;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use crate::error::LoadError;

use super::model::{format_number, Column, Table};

const SNIFF_BYTES: usize = 4096;
const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Which worksheet of a workbook to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSelector {
    Index(usize),
    Name(String),
}

impl FromStr for SheetSelector {
    type Err = std::convert::Infallible;

    /// A bare number selects by 0-based position, anything else by name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<usize>() {
            Ok(i) => SheetSelector::Index(i),
            Err(_) => SheetSelector::Name(s.to_string()),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub sheet: Option<SheetSelector>,
    /// Cell contents (after trimming) read as missing.
    pub missing_tokens: BTreeSet<String>,
}

impl LoadOptions {
    pub fn new(sheet: Option<SheetSelector>, missing_tokens: &[String]) -> Self {
        Self {
            sheet,
            missing_tokens: missing_tokens.iter().cloned().collect(),
        }
    }

    /// Trim a raw cell; blanks and missing tokens become `None`.
    fn cell(&self, raw: &str) -> Option<String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || self.missing_tokens.contains(trimmed) {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Source layouts the loader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited,
    CompressedDelimited,
    Spreadsheet,
    Parquet,
}

impl SourceFormat {
    /// Pick the format from the file name.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let ext = name.rsplit_once('.').map(|(_, e)| e).unwrap_or("");

        match ext {
            "csv" | "tsv" | "txt" => Ok(SourceFormat::Delimited),
            "gz" => Ok(SourceFormat::CompressedDelimited),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Ok(SourceFormat::Spreadsheet),
            "parquet" | "pq" => Ok(SourceFormat::Parquet),
            "" => Err(LoadError::Unsupported(name)),
            other => Err(LoadError::Unsupported(format!(".{other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a table from a file. Dispatch by extension.
///
/// Supported formats:
/// * `.csv` / `.tsv` / `.txt` – delimited text, delimiter sniffed
/// * `.gz`                    – gzip-compressed delimited text
/// * `.xlsx` / `.xls` / `.ods` … – one worksheet of a workbook
/// * `.parquet`               – every top-level column
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<Table, LoadError> {
    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    let format = SourceFormat::from_path(path)?;
    log::debug!("Loading {} as {format:?}", path.display());

    match format {
        SourceFormat::Delimited => load_delimited(File::open(path)?, options),
        SourceFormat::CompressedDelimited => load_delimited(GzDecoder::new(File::open(path)?), options),
        SourceFormat::Spreadsheet => load_spreadsheet(path, options),
        SourceFormat::Parquet => load_parquet(path, options),
    }
}

// ---------------------------------------------------------------------------
// Delimited text
// ---------------------------------------------------------------------------

/// Read delimited text from any byte stream.
///
/// The first row is the header. Every data row must have as many fields as
/// the header.
pub fn load_delimited<R: Read>(mut reader: R, options: &LoadOptions) -> Result<Table, LoadError> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(LoadError::Empty);
    }

    let delimiter = sniff_delimiter(&bytes[..bytes.len().min(SNIFF_BYTES)]);
    log::debug!("Using delimiter {:?}", delimiter as char);

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes.as_slice());

    let headers: Vec<String> = csv_reader.headers()?.iter().map(str::to_string).collect();
    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];

    for result in csv_reader.records() {
        let record = result?;
        for (col, value) in cells.iter_mut().zip(record.iter()) {
            col.push(options.cell(value));
        }
    }

    build_table(headers, cells)
}

/// Choose the candidate delimiter under which the sampled records have the
/// most consistent, widest shape. Falls back to `,`.
///
/// The sample is parsed by the csv reader itself, so quoted fields that span
/// lines count as one record.
fn sniff_delimiter(sample: &[u8]) -> u8 {
    let mut best = (b',', 0usize, 0usize);
    for &delim in &CANDIDATE_DELIMITERS {
        let mut widths: Vec<usize> = csv::ReaderBuilder::new()
            .delimiter(delim)
            .has_headers(false)
            .flexible(true)
            .from_reader(sample)
            .records()
            .map_while(Result::ok)
            .map(|record| record.len())
            .collect();
        // The last record of a truncated sample may be partial.
        if sample.len() == SNIFF_BYTES && widths.len() > 1 {
            widths.pop();
        }
        let Some(&first) = widths.first() else {
            continue;
        };
        if first < 2 {
            continue;
        }
        let consistent = widths.iter().filter(|&&w| w == first).count();
        if (consistent, first) > (best.1, best.2) {
            best = (delim, consistent, first);
        }
    }
    best.0
}

// ---------------------------------------------------------------------------
// Spreadsheets
// ---------------------------------------------------------------------------

/// Read one worksheet; its first row is the header.
fn load_spreadsheet(path: &Path, options: &LoadOptions) -> Result<Table, LoadError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| LoadError::Spreadsheet(e.to_string()))?;
    let range: Range<Data> = match &options.sheet {
        Some(SheetSelector::Name(name)) => {
            if !workbook.sheet_names().iter().any(|n| n == name) {
                return Err(LoadError::SheetNotFound(name.clone()));
            }
            workbook
                .worksheet_range(name)
                .map_err(|e| LoadError::Spreadsheet(e.to_string()))?
        }
        other => {
            let index = match other {
                Some(SheetSelector::Index(i)) => *i,
                _ => 0,
            };
            workbook
                .worksheet_range_at(index)
                .ok_or_else(|| LoadError::SheetNotFound(index.to_string()))?
                .map_err(|e| LoadError::Spreadsheet(e.to_string()))?
        }
    };

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or(LoadError::Empty)?
        .iter()
        .map(|c| spreadsheet_cell(c, options).unwrap_or_default())
        .collect();
    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];

    for row in rows {
        for (col, value) in cells.iter_mut().zip(row.iter()) {
            col.push(spreadsheet_cell(value, options));
        }
    }

    build_table(headers, cells)
}

fn spreadsheet_cell(cell: &Data, options: &LoadOptions) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => options.cell(s),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(format_number(*f)),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
            .or_else(|| Some(dt.as_f64().to_string())),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load every top-level column of a Parquet file as raw text.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path, options: &LoadOptions) -> Result<Table, LoadError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| LoadError::Parquet(format!("reading parquet metadata: {e}")))?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder
        .build()
        .map_err(|e| LoadError::Parquet(format!("building parquet reader: {e}")))?;

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];

    for batch_result in reader {
        let batch =
            batch_result.map_err(|e| LoadError::Parquet(format!("reading record batch: {e}")))?;
        for (col_idx, column) in batch.columns().iter().enumerate() {
            let target = &mut cells[col_idx];
            for row in 0..batch.num_rows() {
                target.push(extract_cell(column.as_ref(), row, options)?);
            }
        }
    }

    build_table(headers, cells)
}

/// Render a single Arrow cell as raw text; nulls are missing.
fn extract_cell(col: &dyn Array, row: usize, options: &LoadOptions) -> Result<Option<String>, LoadError> {
    if col.is_null(row) {
        return Ok(None);
    }
    let text = match col.data_type() {
        DataType::Utf8 => col.as_string::<i32>().value(row).to_string(),
        DataType::LargeUtf8 => col.as_string::<i64>().value(row).to_string(),
        DataType::Boolean => match col.as_any().downcast_ref::<BooleanArray>() {
            Some(arr) => arr.value(row).to_string(),
            None => return Err(LoadError::Parquet("expected BooleanArray".to_string())),
        },
        _ => array_value_to_string(col, row).map_err(|e| LoadError::Parquet(e.to_string()))?,
    };
    Ok(options.cell(&text))
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

/// Name blank headers, de-duplicate repeats and assemble the table.
fn build_table(headers: Vec<String>, cells: Vec<Vec<Option<String>>>) -> Result<Table, LoadError> {
    if headers.is_empty() || cells.first().map_or(true, Vec::is_empty) {
        return Err(LoadError::Empty);
    }

    let mut seen: BTreeSet<String> = BTreeSet::new();
    let columns = headers
        .into_iter()
        .zip(cells)
        .enumerate()
        .map(|(i, (header, cells))| {
            let base = match header.trim() {
                "" => format!("column_{}", i + 1),
                name => name.to_string(),
            };
            let mut name = base.clone();
            let mut suffix = 1;
            while seen.contains(&name) {
                name = format!("{base}.{suffix}");
                suffix += 1;
            }
            if name != base {
                log::warn!("Duplicate column '{base}' renamed to '{name}'");
            }
            seen.insert(name.clone());
            Column::new(name, cells)
        })
        .collect();

    let table = Table::new(columns)?;
    log::info!(
        "Loaded {} rows × {} columns",
        table.row_count(),
        table.column_count()
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn options() -> LoadOptions {
        LoadOptions::new(None, &crate::config::DashboardConfig::default().missing_tokens)
    }

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    #[test]
    fn test_load_csv_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "sales.csv",
            b"Date,Category,Amount\n2024-01-01,A,10\n2024-01-02,B,NA\n",
        );
        let table = load_file(&path, &options()).unwrap();

        assert_eq!(table.column_names(), vec!["Date", "Category", "Amount"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("Amount").unwrap().cells, vec![Some("10".to_string()), None]);
    }

    #[test]
    fn test_sniffs_semicolon_and_tab() {
        let semi = load_delimited("a;b\n1;2\n3;4\n".as_bytes(), &options()).unwrap();
        assert_eq!(semi.column_names(), vec!["a", "b"]);

        let tab = load_delimited("a\tb\tc\n1\t2\t3\n".as_bytes(), &options()).unwrap();
        assert_eq!(tab.column_count(), 3);
    }

    #[test]
    fn test_quoted_delimiters_do_not_confuse_sniffer() {
        let table = load_delimited(
            "name,note\n\"Smith; John\",x\n\"Doe; Jane\",y\n".as_bytes(),
            &options(),
        )
        .unwrap();
        assert_eq!(table.column_count(), 2);
        assert_eq!(
            table.column("name").unwrap().cells[0].as_deref(),
            Some("Smith; John")
        );
    }

    #[test]
    fn test_sniffer_reads_quoted_fields_across_lines() {
        let table = load_delimited(
            "id;note\n1;\"a,b,c\nd,e,f\ng,h,i\"\n2;x\n".as_bytes(),
            &options(),
        )
        .unwrap();
        assert_eq!(table.column_names(), vec!["id", "note"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(
            table.column("note").unwrap().cells[0].as_deref(),
            Some("a,b,c\nd,e,f\ng,h,i")
        );
    }

    #[test]
    fn test_cells_are_trimmed() {
        let table = load_delimited("Amount, Category\n10, A\n20 ,  B \n".as_bytes(), &options())
            .unwrap();
        assert_eq!(table.column_names(), vec!["Amount", "Category"]);
        assert_eq!(
            table.column("Category").unwrap().cells,
            vec![Some("A".to_string()), Some("B".to_string())]
        );
        assert_eq!(table.column("Amount").unwrap().cells[1].as_deref(), Some("20"));
    }

    #[test]
    fn test_load_gzip_csv() {
        let dir = TempDir::new().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"x,y\n1,2\n3,4\n").unwrap();
        let path = write_file(&dir, "data.csv.gz", &encoder.finish().unwrap());

        let table = load_file(&path, &options()).unwrap();
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_names(), vec!["x", "y"]);
    }

    #[test]
    fn test_ragged_row_is_malformed() {
        let err = load_delimited("a,b\n1,2\n3\n".as_bytes(), &options()).unwrap_err();
        assert!(matches!(err, LoadError::Malformed { line: 3, .. }), "{err:?}");
    }

    #[test]
    fn test_empty_sources() {
        assert!(matches!(
            load_delimited("".as_bytes(), &options()),
            Err(LoadError::Empty)
        ));
        assert!(matches!(
            load_delimited("a,b\n".as_bytes(), &options()),
            Err(LoadError::Empty)
        ));
    }

    #[test]
    fn test_duplicate_and_blank_headers() {
        let table = load_delimited("a,a,\n1,2,3\n".as_bytes(), &options()).unwrap();
        assert_eq!(table.column_names(), vec!["a", "a.1", "column_3"]);
    }

    #[test]
    fn test_missing_file_and_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_file(&dir.path().join("nope.csv"), &options()),
            Err(LoadError::NotFound(_))
        ));

        let path = write_file(&dir, "data.json", b"[]");
        assert!(matches!(
            load_file(&path, &options()),
            Err(LoadError::Unsupported(ext)) if ext == ".json"
        ));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(
            SourceFormat::from_path(Path::new("a/b/Report.CSV.GZ")).unwrap(),
            SourceFormat::CompressedDelimited
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("book.xlsx")).unwrap(),
            SourceFormat::Spreadsheet
        );
        assert_eq!(
            SourceFormat::from_path(Path::new("t.parquet")).unwrap(),
            SourceFormat::Parquet
        );
    }

    #[test]
    fn test_sheet_selector_parsing() {
        assert_eq!("2".parse::<SheetSelector>().unwrap(), SheetSelector::Index(2));
        assert_eq!(
            "Sales 2024".parse::<SheetSelector>().unwrap(),
            SheetSelector::Name("Sales 2024".to_string())
        );
    }

    fn workbook() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/orders.xlsx")
    }

    fn sheet_options(sheet: &str) -> LoadOptions {
        LoadOptions {
            sheet: Some(sheet.parse().unwrap()),
            ..options()
        }
    }

    #[test]
    fn test_load_first_sheet_by_default() {
        let table = load_file(&workbook(), &options()).unwrap();
        assert_eq!(
            table.column_names(),
            vec!["id", "amount", "ordered", "returned", "note"]
        );
        assert_eq!(table.row_count(), 3);

        let cells = |name: &str| table.column(name).unwrap().cells.clone();
        let text = |v: &[&str]| v.iter().map(|s| Some(s.to_string())).collect::<Vec<_>>();
        assert_eq!(cells("id"), text(&["1", "2", "3"]));
        assert_eq!(
            cells("amount"),
            vec![Some("10".to_string()), Some("12.5".to_string()), None]
        );
        assert_eq!(
            cells("ordered"),
            text(&["2024-01-01 00:00:00", "2024-01-02 00:00:00", "2024-01-03 00:00:00"])
        );
        assert_eq!(cells("returned"), text(&["true", "false", "false"]));
        // Error cells and missing tokens are both missing.
        assert_eq!(cells("note"), vec![Some("first".to_string()), None, None]);
    }

    #[test]
    fn test_select_sheet_by_name_and_index() {
        let by_name = load_file(&workbook(), &sheet_options("Regions")).unwrap();
        assert_eq!(by_name.column_names(), vec!["region"]);
        assert_eq!(
            by_name.column("region").unwrap().cells,
            vec![Some("North".to_string()), Some("South".to_string())]
        );

        let by_index = load_file(&workbook(), &sheet_options("1")).unwrap();
        assert_eq!(by_index, by_name);
    }

    #[test]
    fn test_unknown_sheet_is_not_found() {
        let err = load_file(&workbook(), &sheet_options("Archive")).unwrap_err();
        assert!(matches!(err, LoadError::SheetNotFound(ref s) if s == "Archive"), "{err:?}");

        let err = load_file(&workbook(), &sheet_options("5")).unwrap_err();
        assert!(matches!(err, LoadError::SheetNotFound(ref s) if s == "5"), "{err:?}");
    }

    #[test]
    fn test_load_parquet_file() {
        use arrow::array::{Float64Array, StringArray};
        use arrow::datatypes::{Field, Schema};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;
        use std::sync::Arc;

        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, true),
            Field::new("score", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![Some("a"), None, Some("c")])),
                Arc::new(Float64Array::from(vec![Some(1.5), Some(2.0), None])),
            ],
        )
        .unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scores.parquet");
        let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_file(&path, &options()).unwrap();
        assert_eq!(table.column_names(), vec!["name", "score"]);
        assert_eq!(table.column("name").unwrap().cells[1], None);
        assert_eq!(table.column("score").unwrap().cells[0].as_deref(), Some("1.5"));
        assert_eq!(table.column("score").unwrap().cells[2], None);
    }
}
