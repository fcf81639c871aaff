//! Tabular dataset loading for the benchmark harness.
//!
//! A dataset is an ordered sequence of rows keyed by a millisecond timestamp. Sources are
//! flat CSV files whose first column carries either a `YYYY-MM-DD` date or an already
//! resolved integer timestamp (as produced by the store's CSV dump).

pub mod dataset;
pub mod timestamp;

pub use dataset::{derive_limited_copy, Dataset, KeyFormat, LoadError, Record, Value};
pub use timestamp::{timestamp_millis, Key};
