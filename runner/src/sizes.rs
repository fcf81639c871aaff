use crate::config::BenchConfig;
use duel_analysis::{Representation, SizeTable};
use duel_ingest::{derive_limited_copy, LoadError};
use std::{fs, io, path::Path, path::PathBuf};
use thiserror::Error;
use tracing::info;

/// An artifact an earlier benchmark run should have left behind
#[derive(Debug, Error)]
#[error("Missing artifact for scale {scale}: {} (run the benchmark at this scale first)", .path.display())]
pub struct MissingArtifactError {
    pub scale: usize,
    pub path: PathBuf,
}

#[derive(Debug, Error)]
pub enum SizeError {
    #[error(transparent)]
    MissingArtifact(#[from] MissingArtifactError),
    #[error("Failed to inspect {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("Failed to derive flat copy: {0}")]
    Derive(#[from] LoadError),
}

fn size_of(path: &Path, scale: usize) -> Result<u64, SizeError> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.len()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Err(MissingArtifactError {
            scale,
            path: path.to_owned(),
        }
        .into()),
        Err(source) => Err(SizeError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}

/// Measure the on-disk size of every representation produced for each configured scale.
///
/// The relational database and the store snapshot must already exist from earlier runs, the flat
/// copy is derived from the dataset source here.
pub fn compare_file_sizes(config: &BenchConfig) -> Result<SizeTable, SizeError> {
    let mut table = SizeTable::default();

    for &scale in config.sizes.scales.iter() {
        let sql = config.sqlite.path_for(scale);
        let snapshot = config.store.snapshot_path(scale);

        // check earlier artifacts before writing anything
        let sql_bytes = size_of(&sql, scale)?;
        let store_bytes = size_of(&snapshot, scale)?;

        let flat = config.sizes.flat_path(scale);
        let rows = derive_limited_copy(&config.dataset.path, &flat, scale)?;
        let csv_bytes = size_of(&flat, scale)?;

        info!(
            scale = scale,
            rows = rows,
            csv = csv_bytes,
            sql = sql_bytes,
            store = store_bytes,
            "Measured file sizes"
        );

        table.push(
            rows.to_string(),
            [
                (Representation::Csv, csv_bytes),
                (Representation::Sql, sql_bytes),
                (Representation::Store, store_bytes),
            ],
        );
    }

    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> BenchConfig {
        let dataset = dir.join("train.csv");
        fs::write(
            &dataset,
            "date,store,item,sales\n2013-01-01,1,1,13\n2013-01-02,1,1,11\n2013-01-03,1,1,14\n",
        )
        .unwrap();

        let mut config: BenchConfig =
            serde_yaml::from_str(&format!("dataset:\n  path: {}\n", dataset.display())).unwrap();
        config.store.data_dir = dir.join("data");
        config.sqlite.path = dir.join("sql_{scale}.db").to_string_lossy().into_owned();
        config.sizes.flat = dir.join("train_{scale}.csv").to_string_lossy().into_owned();
        config.sizes.scales = vec![2];
        config
    }

    #[test]
    fn measures_all_representations() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        fs::create_dir_all(&config.store.data_dir).unwrap();
        fs::File::create(config.sqlite.path_for(2))
            .unwrap()
            .set_len(2_500_000)
            .unwrap();
        fs::write(config.store.snapshot_path(2), vec![0u8; 1000]).unwrap();

        let table = compare_file_sizes(&config).unwrap();

        assert_eq!(table.labels, ["2"]);
        assert!(config.sizes.flat_path(2).is_file());
        assert_eq!(table.get(Representation::Sql), [2.5]);
        // a few hundred bytes round down to zero megabytes
        assert_eq!(table.get(Representation::Csv), [0.0]);
        assert_eq!(table.get(Representation::Store), [0.0]);
    }

    #[test]
    fn missing_snapshot_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        fs::write(config.sqlite.path_for(2), b"db").unwrap();

        match compare_file_sizes(&config) {
            Err(SizeError::MissingArtifact(MissingArtifactError { scale, path })) => {
                assert_eq!(scale, 2);
                assert_eq!(path, config.store.snapshot_path(2));
            }
            other => panic!("unexpected result {other:?}"),
        }
        assert!(!config.sizes.flat_path(2).exists());
    }
}
