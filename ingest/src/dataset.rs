use crate::timestamp::{timestamp_millis, Key};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use rand::{seq::index, seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use std::{fmt, fs::File, io::Read, path::Path};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to access dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed dataset: {0}")]
    Csv(#[from] csv::Error),
    #[error("Dataset has no key column")]
    MissingKeyColumn,
    #[error("Invalid date index '{value}': {source}")]
    InvalidDate {
        value: String,
        source: chrono::ParseError,
    },
    #[error("Invalid timestamp key '{0}'")]
    InvalidKey(String),
    #[error("Key '{0}' lies before the unix epoch")]
    KeyBeforeEpoch(String),
    #[error("Row on line {line} has {found} fields, expected {expected}")]
    RowWidth {
        line: u64,
        expected: usize,
        found: usize,
    },
}

/// How the first column of a source is turned into a record key
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyFormat {
    /// `YYYY-MM-DD`, converted with `timestamp_millis`
    #[default]
    Date,
    /// already resolved milliseconds, e.g. a store dump
    Millis,
}

impl KeyFormat {
    pub fn parse_key(&self, raw: &str) -> Result<Key, LoadError> {
        match self {
            Self::Date => timestamp_millis(raw),
            Self::Millis => {
                let trimmed = raw.trim();
                match trimmed.parse::<Key>() {
                    Ok(key) if key >= 0 => Ok(key),
                    Ok(_) => Err(LoadError::KeyBeforeEpoch(trimmed.to_owned())),
                    Err(_) => Err(LoadError::InvalidKey(trimmed.to_owned())),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Interpret a raw cell, preferring integers over reals over text
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Ok(integer) = trimmed.parse::<i64>() {
            Self::Integer(integer)
        } else if let Ok(real) = trimmed.parse::<f64>() {
            Self::Real(real)
        } else {
            Self::Text(trimmed.to_owned())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(integer) => write!(f, "{integer}"),
            Self::Real(real) => write!(f, "{real}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// A single row. Values are positionally aligned with `Dataset::columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: Key,
    pub values: Vec<Value>,
}

impl Record {
    pub fn new(key: Key, values: Vec<Value>) -> Self {
        Self { key, values }
    }

    /// Pair every value with its column name, in column order
    pub fn fields<'a>(
        &'a self,
        columns: &'a [String],
    ) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        columns.iter().map(String::as_str).zip(self.values.iter())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, records: Vec<Record>) -> Self {
        Self { columns, records }
    }

    /// Load a CSV source, keeping at most `limit` rows when given
    pub fn load(
        path: impl AsRef<Path>,
        format: KeyFormat,
        limit: Option<usize>,
    ) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let dataset = Self::from_reader(File::open(path)?, format, limit)?;

        info!(
            path = %path.display(),
            rows = dataset.len(),
            columns = dataset.columns.len(),
            "Loaded dataset"
        );

        Ok(dataset)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        format: KeyFormat,
        limit: Option<usize>,
    ) -> Result<Self, LoadError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(LoadError::MissingKeyColumn);
        }

        // the first column is the key, whatever its header says
        let columns = headers
            .iter()
            .skip(1)
            .map(str::to_owned)
            .collect::<Vec<_>>();

        let mut records = Vec::new();
        let mut row = StringRecord::new();

        while limit.map_or(true, |limit| records.len() < limit) && reader.read_record(&mut row)? {
            if row.len() != headers.len() {
                return Err(LoadError::RowWidth {
                    line: row.position().map_or(0, |position| position.line()),
                    expected: headers.len(),
                    found: row.len(),
                });
            }

            let key = format.parse_key(&row[0])?;
            let values = row.iter().skip(1).map(Value::parse).collect();

            records.push(Record::new(key, values));
        }

        debug!(rows = records.len(), format = ?format, "Parsed dataset rows");

        Ok(Self { columns, records })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copy of the dataset with rows in random order
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let mut records = self.records.clone();
        records.shuffle(rng);

        Self {
            columns: self.columns.clone(),
            records,
        }
    }

    /// Draw two distinct rows, returned in draw order
    pub fn sample_pair<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(&Record, &Record)> {
        if self.records.len() < 2 {
            return None;
        }

        let picked = index::sample(rng, self.records.len(), 2);

        Some((&self.records[picked.index(0)], &self.records[picked.index(1)]))
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Write the header and the first `limit` rows of `source` to `destination` verbatim.
///
/// Returns the number of data rows written.
pub fn derive_limited_copy(
    source: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    limit: usize,
) -> Result<usize, LoadError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(source.as_ref())?;
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .from_path(destination.as_ref())?;

    writer.write_record(reader.headers()?)?;

    let mut written = 0;
    let mut row = StringRecord::new();

    while written < limit && reader.read_record(&mut row)? {
        writer.write_record(&row)?;
        written += 1;
    }

    writer.flush()?;

    debug!(
        source = %source.as_ref().display(),
        destination = %destination.as_ref().display(),
        rows = written,
        "Derived limited copy"
    );

    Ok(written)
}
