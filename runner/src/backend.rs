use duel_analysis::{BackendId, SeriesId};
use duel_ingest::{Key, Record};
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteBackend;
pub use store::StoreBackend;

#[derive(Debug, Error)]
pub enum BackendCallError {
    #[error("Store answered with status {0}")]
    Status(u16),
    #[error("Store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("SQLite statement failed: {0}")]
    Statement(#[from] rusqlite::Error),
}

/// One measured operation, issued the same way against every backend
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    Insert(&'a Record),
    PointQuery(Key),
    RangeQuery { low: Key, high: Key },
    Delete(Key),
}

impl Operation<'_> {
    pub fn series(&self) -> SeriesId {
        match self {
            Self::Insert(_) => SeriesId::Insert,
            Self::PointQuery(_) => SeriesId::QueryOne,
            Self::RangeQuery { .. } => SeriesId::QueryRange,
            Self::Delete(_) => SeriesId::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// the store only reports success, its key assignment shows up in the dump
    Acknowledged,
    /// rows a statement touched or a query returned
    Rows(usize),
}

/// A storage system under test.
///
/// Everything needed to issue an operation is built in `prepare`, so that `execute` covers
/// only the call itself.
pub trait Backend {
    type Prepared;

    fn id(&self) -> BackendId;

    /// Bring the backend to an empty state holding `columns`
    fn reset(&mut self, columns: &[String]) -> Result<(), BackendCallError>;

    fn prepare(&self, operation: Operation<'_>) -> Self::Prepared;

    fn execute(&mut self, prepared: &Self::Prepared) -> Result<Outcome, BackendCallError>;
}

/// Run a single operation, timing nothing but `Backend::execute`
pub fn timed<B: Backend>(
    backend: &mut B,
    operation: Operation<'_>,
) -> (Duration, Result<Outcome, BackendCallError>) {
    let prepared = backend.prepare(operation);

    let start = Instant::now();
    let outcome = backend.execute(&prepared);

    (start.elapsed(), outcome)
}
