/// Data layer: core types, loading, filtering and the permit query engine.
///
/// Architecture:
/// ```text
///  .csv (';', Latin-1) / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → PermitTable, held by DatasetCache (load once)
///   └──────────┘
///        │
///        ▼
///   ┌─────────────┐
///   │ PermitTable  │  column-oriented, upper-case column names, numeric TOTAL
///   └─────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  substring / integer criteria → selected row indices
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  query    │  grand total, optional ranking → summary text
///   └──────────┘
/// ```

pub mod error;
pub mod filter;
pub mod loader;
pub mod model;
pub mod query;
