//! Measurement aggregation, trend fitting and figure rendering for comparative runs.

pub mod metrics;
pub mod report;
pub mod trend;

pub use metrics::{BackendId, ChunkAggregator, MetricSample, MetricSeries, Results, RunMeta, SeriesId};
pub use report::{render_comparison, render_file_sizes, ReportError, Representation, SizeTable};
pub use trend::{fit, fit_all, DegenerateFitError, TrendLine, TrendSet};
