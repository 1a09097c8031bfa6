/// Data layer: payload types, built-in loaders, and splitting.
///
/// Architecture:
/// ```text
///  .csv / .npy / .npz / .pkl / .parquet / .json / image dir
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  read source → Output (eager) or Stream (lazy)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  output   │  Single / Sequence / Map of Values (Array, Frame, ..)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  split    │  columns → X / Y / misc, rows → train / test
///   └──────────┘
/// ```

pub mod loader;
pub mod model;
pub mod output;
pub mod split;
pub mod stream;
