use crate::{
    backend::{timed, Backend, BackendCallError, Operation, Outcome, SqliteBackend, StoreBackend},
    resync::{reconcile, Reconciled},
};
use duel_analysis::{BackendId, ChunkAggregator, MetricSample, Results, RunMeta, SeriesId};
use duel_ingest::{Dataset, LoadError};
use itertools::Itertools;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to load dataset: {0}")]
    Load(#[from] LoadError),
    #[error("Failed to set up backend: {0}")]
    Backend(#[from] BackendCallError),
}

/// Sizing of a single benchmark run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunPlan {
    pub scale: usize,
    pub chunk_size: usize,
    pub range_tests: usize,
}

impl RunPlan {
    pub fn for_scale(scale: usize) -> Self {
        Self {
            scale,
            chunk_size: crate::config::chunk_size(scale),
            range_tests: crate::config::range_tests(scale),
        }
    }

    pub fn meta(&self) -> RunMeta {
        RunMeta {
            scale: self.scale,
            chunk_size: self.chunk_size,
        }
    }
}

/// Both backends of a run and everything measured against them so far
#[derive(Debug)]
pub struct RunContext {
    pub store: StoreBackend,
    pub sqlite: SqliteBackend,
    pub results: Results,
}

fn log_chunk(samples: &[MetricSample], done: usize, total: usize) {
    if let Some(first) = samples.first() {
        info!(
            series = %first.series,
            x = first.x,
            durations_ms = ?samples.iter().map(|s| (s.backend, s.duration_ms)).collect_vec(),
            "Finished {done}/{total} operations"
        );
    }
}

/// Issue one operation, folding its time into `aggregator` on success and counting an anomaly
/// otherwise. Returns what the backend reported for a successful call.
pub fn measure<B: Backend>(
    backend: &mut B,
    operation: Operation<'_>,
    aggregator: &mut ChunkAggregator,
    results: &mut Results,
) -> Option<Outcome> {
    let (elapsed, outcome) = timed(backend, operation);

    match outcome {
        Ok(outcome) => {
            debug!(
                backend = %backend.id(),
                series = %operation.series(),
                outcome = ?outcome,
                "Operation succeeded"
            );
            aggregator.record(backend.id(), elapsed);
            Some(outcome)
        }
        Err(error) => {
            warn!(
                backend = %backend.id(),
                series = %operation.series(),
                error = ?error,
                "Operation failed, continuing: {error}"
            );
            results.record_anomaly(operation.series(), backend.id());
            None
        }
    }
}

fn flush(aggregator: ChunkAggregator, done: usize, total: usize, results: &mut Results) {
    if let Some(samples) = aggregator.finish() {
        log_chunk(&samples, done, total);
        results.extend(samples);
    }
}

/// Insert every record in dataset order. The sample x value is the number of rows inserted so far.
pub fn insert_phase<B: Backend>(
    backend: &mut B,
    dataset: &Dataset,
    chunk_size: usize,
    results: &mut Results,
) {
    let total = dataset.len();
    let mut aggregator = ChunkAggregator::new(SeriesId::Insert, chunk_size, &[backend.id()]);

    info!(backend = %backend.id(), rows = total, "Starting inserts");

    for (index, record) in dataset.iter().enumerate() {
        measure(backend, Operation::Insert(record), &mut aggregator, results);

        if let Some(samples) = aggregator.complete((index + 1) as f64) {
            log_chunk(&samples, index + 1, total);
            results.extend(samples);
        }
    }

    flush(aggregator, total, total, results);
}

/// Query every key once against both backends. The sample x value is the key itself.
pub fn point_query_phase<A: Backend, B: Backend>(
    first: &mut A,
    second: &mut B,
    dataset: &Dataset,
    chunk_size: usize,
    results: &mut Results,
) {
    let total = dataset.len();
    let mut aggregator =
        ChunkAggregator::new(SeriesId::QueryOne, chunk_size, &[first.id(), second.id()]);

    info!(rows = total, "Starting point queries");

    for (index, record) in dataset.iter().enumerate() {
        measure(first, Operation::PointQuery(record.key), &mut aggregator, results);
        measure(second, Operation::PointQuery(record.key), &mut aggregator, results);

        if let Some(samples) = aggregator.complete(record.key as f64) {
            log_chunk(&samples, index + 1, total);
            results.extend(samples);
        }
    }

    flush(aggregator, total, total, results);
}

/// Issue `tests` range queries between two distinct random records. Every query is its own
/// sample, the x value being the width of the range.
pub fn range_query_phase<A: Backend, B: Backend, R: Rng + ?Sized>(
    first: &mut A,
    second: &mut B,
    dataset: &Dataset,
    tests: usize,
    rng: &mut R,
    results: &mut Results,
) {
    let mut aggregator = ChunkAggregator::new(SeriesId::QueryRange, 1, &[first.id(), second.id()]);

    info!(tests = tests, "Starting range queries");

    for done in 1..=tests {
        let Some((a, b)) = dataset.sample_pair(rng) else {
            warn!(rows = dataset.len(), "Range queries need at least two rows, skipping");
            break;
        };
        let (low, high) = if a.key <= b.key {
            (a.key, b.key)
        } else {
            (b.key, a.key)
        };
        let operation = Operation::RangeQuery { low, high };

        measure(first, operation, &mut aggregator, results);
        measure(second, operation, &mut aggregator, results);

        if let Some(samples) = aggregator.complete((high - low) as f64) {
            if done % 100 == 0 || done == tests {
                log_chunk(&samples, done, tests);
            }
            results.extend(samples);
        }
    }
}

/// Delete every key once against both backends. The sample x value is the number of rows left.
pub fn delete_phase<A: Backend, B: Backend>(
    first: &mut A,
    second: &mut B,
    dataset: &Dataset,
    chunk_size: usize,
    results: &mut Results,
) {
    let total = dataset.len();
    let mut aggregator =
        ChunkAggregator::new(SeriesId::Delete, chunk_size, &[first.id(), second.id()]);

    info!(rows = total, "Starting deletes");

    for (index, record) in dataset.iter().enumerate() {
        measure(first, Operation::Delete(record.key), &mut aggregator, results);
        measure(second, Operation::Delete(record.key), &mut aggregator, results);

        if let Some(samples) = aggregator.complete((total - index - 1) as f64) {
            log_chunk(&samples, index + 1, total);
            results.extend(samples);
        }
    }

    flush(aggregator, total, total, results);
}

impl RunContext {
    pub fn new(store: StoreBackend, sqlite: SqliteBackend, plan: &RunPlan) -> Self {
        Self {
            store,
            sqlite,
            results: Results::new(plan.meta()),
        }
    }

    /// Run every phase in order and hand back what was measured.
    ///
    /// The store is filled from `dataset` first. Its dump then becomes the source for SQLite,
    /// so both backends hold identical keys even where the store renumbered colliding ones.
    /// Without a usable dump or SQLite table nothing but the store inserts is measured, the
    /// partial results are still returned.
    pub fn run<R: Rng + ?Sized>(
        mut self,
        dataset: &Dataset,
        plan: &RunPlan,
        rng: &mut R,
    ) -> Results {
        if let Err(error) = self.store.reset(dataset.columns()) {
            warn!(error = ?error, "Failed to clear the store, results may be skewed: {error}");
        }

        insert_phase(&mut self.store, dataset, plan.chunk_size, &mut self.results);

        match reconcile(&self.store, plan.scale) {
            Ok(reconciled) => {
                if let Err(error) = self.mirror(&reconciled, plan, rng) {
                    error!(error = ?error, "Failed to prepare SQLite, ending the run early: {error}");
                }
            }
            Err(error) => {
                error!(error = ?error, "Failed to reconcile store contents, ending the run early: {error}");
            }
        }

        self.report();

        if let Err(error) = self.sqlite.close() {
            warn!(error = ?error, "SQLite connection was not closed cleanly: {error}");
        }

        self.results
    }

    /// Load the reconciled rows into SQLite, then run the comparing phases on both backends
    fn mirror<R: Rng + ?Sized>(
        &mut self,
        reconciled: &Reconciled,
        plan: &RunPlan,
        rng: &mut R,
    ) -> Result<(), BackendCallError> {
        // the dump header decides the column order SQLite receives values in
        self.sqlite.reset(reconciled.columns())?;
        insert_phase(&mut self.sqlite, reconciled, plan.chunk_size, &mut self.results);

        let shuffled = reconciled.shuffled(rng);
        self.compare(&shuffled, plan, rng);

        // deletes run in a fresh random order
        let shuffled = reconciled.shuffled(rng);
        delete_phase(
            &mut self.store,
            &mut self.sqlite,
            &shuffled,
            plan.chunk_size,
            &mut self.results,
        );

        Ok(())
    }

    fn compare<R: Rng + ?Sized>(&mut self, dataset: &Dataset, plan: &RunPlan, rng: &mut R) {
        point_query_phase(
            &mut self.store,
            &mut self.sqlite,
            dataset,
            plan.chunk_size,
            &mut self.results,
        );
        range_query_phase(
            &mut self.store,
            &mut self.sqlite,
            dataset,
            plan.range_tests,
            rng,
            &mut self.results,
        );
    }

    fn report(&self) {
        for series in self.results.iter() {
            for backend in BackendId::ALL {
                let anomalies = self.results.anomalies(series.id, backend);
                if anomalies > 0 {
                    warn!(
                        series = %series.id,
                        backend = %backend,
                        anomalies = anomalies,
                        "Operations failed during the run"
                    );
                }
            }

            if !series.is_aligned() {
                warn!(series = %series.id, "Backends produced differing sample positions");
            }
        }

        info!(
            scale = self.results.meta.scale,
            anomalies = self.results.total_anomalies(),
            "Run finished"
        );
    }
}
