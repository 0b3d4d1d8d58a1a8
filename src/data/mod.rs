/// Data layer: core types, loading, and cleaning.
///
/// Architecture:
/// ```text
///  readings .csv / .parquet        distances .csv
///        │                              │
///        ▼                              ▼
///   ┌──────────┐                  ┌──────────┐
///   │  loader   │  parse rows      │  loader   │  pivot pairs → DistanceMatrix
///   └──────────┘                  └──────────┘
///        │                              │
///        ▼                              │
///   ┌──────────┐                        │
///   │ resample  │  fixed grid, gaps kept │
///   └──────────┘                        │
///        │                              │
///        ▼                              │
///   ┌──────────┐                        │
///   │  impute   │  (values, mask)        │
///   └──────────┘                        │
///        └──────────────┬───────────────┘
///                       ▼
///           ┌──────────────────────┐
///           │ SpatioTemporalDataset │
///           └──────────────────────┘
/// ```

pub mod impute;
pub mod loader;
pub mod model;
pub mod resample;
