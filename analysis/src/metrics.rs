use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, time::Duration};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SeriesId {
    Insert,
    QueryOne,
    QueryRange,
    Delete,
}

impl SeriesId {
    pub const ALL: [SeriesId; 4] = [
        SeriesId::Insert,
        SeriesId::QueryOne,
        SeriesId::QueryRange,
        SeriesId::Delete,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Self::Insert => "Insert in Random Order",
            Self::QueryOne => "Randomized Singular Select",
            Self::QueryRange => "Randomized Range Queries",
            Self::Delete => "Delete in Random Order",
        }
    }

    pub fn x_label(&self) -> &'static str {
        match self {
            Self::Insert | Self::Delete => "Database Size",
            Self::QueryOne => "Row's Key Value (Database Timestamp; ms)",
            Self::QueryRange => "Range Width (Database Timestamp; ms)",
        }
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Insert => "insert",
            Self::QueryOne => "query_one",
            Self::QueryRange => "query_range",
            Self::Delete => "delete",
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    Store,
    Sqlite,
}

impl BackendId {
    pub const ALL: [BackendId; 2] = [BackendId::Store, BackendId::Sqlite];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Store => "Store",
            Self::Sqlite => "SQLite",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Store => "store",
            Self::Sqlite => "sqlite",
        })
    }
}

/// One aggregated timing: the summed duration of a whole chunk, not a per-operation mean.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MetricSample {
    pub series: SeriesId,
    pub x: f64,
    pub backend: BackendId,
    pub duration_ms: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MetricSeries {
    pub id: SeriesId,
    samples: Vec<MetricSample>,
}

impl MetricSeries {
    pub fn new(id: SeriesId) -> Self {
        Self {
            id,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, sample: MetricSample) {
        debug_assert_eq!(sample.series, self.id);

        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    pub fn for_backend(&self, backend: BackendId) -> impl Iterator<Item = &MetricSample> + '_ {
        self.samples
            .iter()
            .filter(move |sample| sample.backend == backend)
    }

    /// `(x, duration_ms)` pairs for one backend in emission order
    pub fn points(&self, backend: BackendId) -> Vec<(f64, f64)> {
        self.for_backend(backend)
            .map(|sample| (sample.x, sample.duration_ms))
            .collect_vec()
    }

    pub fn len(&self, backend: BackendId) -> usize {
        self.for_backend(backend).count()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Both backends have the same number of samples with pairwise equal x values
    pub fn is_aligned(&self) -> bool {
        let store = self.for_backend(BackendId::Store).map(|s| s.x).collect_vec();
        let sqlite = self.for_backend(BackendId::Sqlite).map(|s| s.x).collect_vec();

        store == sqlite
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunMeta {
    pub scale: usize,
    pub chunk_size: usize,
}

/// Everything measured during one benchmark run
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Results {
    pub meta: RunMeta,
    series: BTreeMap<SeriesId, MetricSeries>,
    anomalies: BTreeMap<SeriesId, BTreeMap<BackendId, u64>>,
}

impl Results {
    pub fn new(meta: RunMeta) -> Self {
        Self {
            meta,
            series: SeriesId::ALL
                .into_iter()
                .map(|id| (id, MetricSeries::new(id)))
                .collect(),
            anomalies: BTreeMap::new(),
        }
    }

    pub fn extend<I: IntoIterator<Item = MetricSample>>(&mut self, samples: I) {
        for sample in samples {
            self.series
                .entry(sample.series)
                .or_insert_with(|| MetricSeries::new(sample.series))
                .push(sample);
        }
    }

    pub fn series(&self, id: SeriesId) -> Option<&MetricSeries> {
        self.series.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSeries> + '_ {
        self.series.values()
    }

    pub fn record_anomaly(&mut self, series: SeriesId, backend: BackendId) {
        *self
            .anomalies
            .entry(series)
            .or_default()
            .entry(backend)
            .or_default() += 1;
    }

    pub fn anomalies(&self, series: SeriesId, backend: BackendId) -> u64 {
        self.anomalies
            .get(&series)
            .and_then(|backends| backends.get(&backend))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_anomalies(&self) -> u64 {
        self.anomalies.values().flat_map(|b| b.values()).sum()
    }
}

/// Sums per-call durations into fixed-size chunks.
///
/// Every chunk emits one sample for each configured backend, including the trailing chunk
/// that may hold fewer than `chunk_size` operations.
#[derive(Debug, Clone)]
pub struct ChunkAggregator {
    series: SeriesId,
    chunk_size: usize,
    backends: Vec<BackendId>,
    pending: usize,
    totals: BTreeMap<BackendId, Duration>,
    last_x: f64,
}

impl ChunkAggregator {
    pub fn new(series: SeriesId, chunk_size: usize, backends: &[BackendId]) -> Self {
        Self {
            series,
            chunk_size: chunk_size.max(1),
            backends: backends.to_vec(),
            pending: 0,
            totals: BTreeMap::new(),
            last_x: 0.0,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Operations counted into the chunk that is currently open
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn record(&mut self, backend: BackendId, elapsed: Duration) {
        *self.totals.entry(backend).or_default() += elapsed;
    }

    /// Close one logical operation, `x` being its x value. Returns samples on a chunk boundary.
    pub fn complete(&mut self, x: f64) -> Option<Vec<MetricSample>> {
        self.pending += 1;
        self.last_x = x;

        if self.pending == self.chunk_size {
            Some(self.emit())
        } else {
            None
        }
    }

    /// Flush a partially filled trailing chunk
    pub fn finish(mut self) -> Option<Vec<MetricSample>> {
        if self.pending > 0 {
            Some(self.emit())
        } else {
            None
        }
    }

    fn emit(&mut self) -> Vec<MetricSample> {
        let samples = self
            .backends
            .iter()
            .map(|backend| MetricSample {
                series: self.series,
                x: self.last_x,
                backend: *backend,
                duration_ms: self
                    .totals
                    .get(backend)
                    .map_or(0.0, |total| total.as_secs_f64() * 1000.0),
            })
            .collect_vec();

        self.pending = 0;
        self.totals.clear();

        samples
    }
}
