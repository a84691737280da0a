/// Data layer: loading, type inference, filtering and summaries.
///
/// Architecture:
/// ```text
///  .csv / .tsv / .gz / .xlsx / .ods / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → Table (raw cells)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  infer    │  classify columns → Dataset (typed values)
///   └──────────┘
///        │
///        ├───────────────┐
///        ▼               ▼
///   ┌──────────┐   ┌──────────┐
///   │  filter   │   │ controls  │  FilterSet → RowMask / widget descriptions
///   └──────────┘   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  summary  │  per-column stats and chart data over the mask
///   └──────────┘
/// ```

pub mod controls;
pub mod filter;
pub mod infer;
pub mod loader;
pub mod model;
pub mod summary;
