use crate::backend::{BackendCallError, StoreBackend};
use duel_ingest::{Dataset, KeyFormat, LoadError};
use std::{ops::Deref, path::Path};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ResyncError {
    #[error("Store refused to dump its contents: {0}")]
    Dump(#[from] BackendCallError),
    #[error("Failed to read the store dump: {0}")]
    Reload(#[from] LoadError),
}

/// Rows exactly as the store holds them, keys included, after its collision handling.
///
/// Only a store dump produces this, which keeps the relational side from being fed the
/// unreconciled source by accident.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled(Dataset);

impl Reconciled {
    /// Parse a dump file, keeping at most `limit` rows
    pub fn from_dump(path: impl AsRef<Path>, limit: usize) -> Result<Self, LoadError> {
        Dataset::load(path, KeyFormat::Millis, Some(limit)).map(Self)
    }
}

impl Deref for Reconciled {
    type Target = Dataset;

    fn deref(&self) -> &Dataset {
        &self.0
    }
}

/// Dump the store, keep a snapshot of it for the file size comparison and reload the dump.
pub fn reconcile(store: &StoreBackend, scale: usize) -> Result<Reconciled, ResyncError> {
    let dump = store.dump()?;

    // the comparison can still run without this snapshot, it is checked for there
    if let Err(error) = store.snapshot(scale) {
        warn!(error = ?error, scale = scale, "Failed to snapshot the store: {error}");
    }

    let reconciled = Reconciled::from_dump(&dump, scale)?;

    if reconciled.len() != scale {
        warn!(
            expected = scale,
            found = reconciled.len(),
            "Store dump holds a different number of rows than were inserted"
        );
    }

    info!(rows = reconciled.len(), path = %dump.display(), "Reconciled store contents");

    Ok(reconciled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn dump_keys_are_taken_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.csv");
        fs::write(
            &dump,
            "timestamp,store,item,sales\n1356998400000,1,1,13\n1356998400001,1,2,11\n1357084800000,2,1,9\n",
        )
        .unwrap();

        let reconciled = Reconciled::from_dump(&dump, 2).unwrap();

        assert_eq!(reconciled.len(), 2);
        assert_eq!(reconciled.columns(), ["store", "item", "sales"]);
        let keys = reconciled.iter().map(|r| r.key).collect::<Vec<_>>();
        assert_eq!(keys, [1_356_998_400_000, 1_356_998_400_001]);
    }

    #[test]
    fn dates_are_not_accepted_as_keys() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.csv");
        fs::write(&dump, "date,a\n2013-01-01,1\n").unwrap();

        assert!(matches!(
            Reconciled::from_dump(&dump, 10),
            Err(LoadError::InvalidKey(_))
        ));
    }
}
