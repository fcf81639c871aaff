use duel_ingest::KeyFormat;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Config file could not be read: {0}")]
    Read(#[from] std::io::Error),
    #[error("Config file is malformed: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    // flat text source every run is derived from
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default, alias = "db")]
    pub sqlite: SqliteConfig,
    // dataset sizes to benchmark, one run each
    #[serde(default = "default_scales")]
    pub scales: Vec<usize>,
    // fixed seed for reshuffles and range draws, entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub sizes: SizesConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub key_format: KeyFormat,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    // image loaded to clear the store before a run
    pub empty_image: String,
    // directory the store process writes dumps and snapshots into
    pub data_dir: PathBuf,
    pub dump_file: String,
    pub snapshot: String,
    pub snapshot_extension: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:6969".to_owned(),
            timeout_ms: 120_000,
            empty_image: "empty.r2d2".to_owned(),
            data_dir: PathBuf::from("../data"),
            dump_file: "dump.csv".to_owned(),
            snapshot: "test_{scale}".to_owned(),
            snapshot_extension: "r2d2".to_owned(),
        }
    }
}

impl StoreConfig {
    pub fn dump_path(&self) -> PathBuf {
        self.data_dir.join(&self.dump_file)
    }

    pub fn snapshot_name(&self, scale: usize) -> String {
        expand(&self.snapshot, scale)
    }

    pub fn snapshot_path(&self, scale: usize) -> PathBuf {
        self.data_dir.join(format!(
            "{}.{}",
            self.snapshot_name(scale),
            self.snapshot_extension
        ))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct SqliteConfig {
    pub path: String,
    pub table: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "sql_test_{scale}.db".to_owned(),
            table: "train".to_owned(),
        }
    }
}

impl SqliteConfig {
    pub fn path_for(&self, scale: usize) -> PathBuf {
        PathBuf::from(expand(&self.path, scale))
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl OutputConfig {
    pub fn results_path(&self, scale: usize) -> PathBuf {
        self.dir.join(format!("results_{scale}.yaml"))
    }

    pub fn figure_path(&self, scale: usize) -> PathBuf {
        self.dir.join(format!("metrics_{scale}.svg"))
    }

    pub fn sizes_figure_path(&self) -> PathBuf {
        self.dir.join("file_sizes.svg")
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default, deny_unknown_fields)]
pub struct SizesConfig {
    pub scales: Vec<usize>,
    // size limited copies of the dataset source
    pub flat: String,
}

impl Default for SizesConfig {
    fn default() -> Self {
        Self {
            scales: vec![10_000, 100_000, 1_000_000],
            flat: "train_{scale}.csv".to_owned(),
        }
    }
}

impl SizesConfig {
    pub fn flat_path(&self, scale: usize) -> PathBuf {
        PathBuf::from(expand(&self.flat, scale))
    }
}

/// Substitute `{scale}` in a naming template
pub fn expand(template: &str, scale: usize) -> String {
    template.replace("{scale}", &scale.to_string())
}

/// Operations summed into one sample
pub fn chunk_size(scale: usize) -> usize {
    if scale > 10_000 {
        1000
    } else {
        (scale / 100).max(1)
    }
}

/// Number of random range queries issued per run
pub fn range_tests(scale: usize) -> usize {
    if scale > 1000 {
        scale / 100
    } else {
        100
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();

    chars
        .next()
        .map_or(false, |first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl BenchConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigErrors> {
        let text = fs::read_to_string(path)?;

        Ok(serde_yaml::from_str(&text)?)
    }

    /// Replace the configured scales with ones given on the command line, if there are any
    pub fn override_scales(&mut self, scales: &[usize]) {
        if !scales.is_empty() {
            self.scales = scales.to_vec();
        }
    }

    /// Returns true if any error was found, every problem is logged
    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.scales.is_empty() {
            error!("No scales were defined, there is nothing to benchmark");
            contains_error = true;
        }

        for scale in self.scales.iter().chain(self.sizes.scales.iter()) {
            if *scale == 0 {
                error!("Scales must be positive, a run over 0 rows measures nothing");
                contains_error = true;
            }
        }

        if !self.dataset.path.is_file() {
            error!(
                "Failed to find dataset.path. Either not a file or not found at {}",
                self.dataset.path.to_string_lossy()
            );
            contains_error = true;
        }

        if self.store.timeout_ms == 0 {
            error!("store.timeout_ms cannot be 0, every call would time out");
            contains_error = true;
        }

        if !(self.store.base_url.starts_with("http://") || self.store.base_url.starts_with("https://")) {
            error!(
                "store.base_url ({}) must be an http(s) url",
                self.store.base_url
            );
            contains_error = true;
        }

        if !is_identifier(&self.sqlite.table) {
            error!(
                "sqlite.table ({}) must be a plain identifier",
                self.sqlite.table
            );
            contains_error = true;
        }

        if !self.sqlite.path.contains("{scale}") && self.scales.len() > 1 {
            warn!(
                "sqlite.path ({}) has no {{scale}} placeholder, runs will overwrite each other",
                self.sqlite.path
            );
        }

        if !self.store.snapshot.contains("{scale}") && self.scales.len() > 1 {
            warn!(
                "store.snapshot ({}) has no {{scale}} placeholder, the store will suffix duplicates",
                self.store.snapshot
            );
        }

        contains_error
    }
}

fn default_scales() -> Vec<usize> {
    vec![100, 1000, 10_000, 100_000, 1_000_000]
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}
