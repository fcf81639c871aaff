use crate::dataset::LoadError;
use chrono::{Datelike, NaiveDate};

/// Milliseconds since 1970-01-01T00:00:00Z
pub type Key = i64;

// 1970-01-01 counted from 0001-01-01 (proleptic gregorian, day one = 1)
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;
const MILLIS_PER_DAY: i64 = 86_400_000;

/// Convert a date-only index string (`YYYY-MM-DD`) into milliseconds since the unix epoch.
///
/// The mapping is deterministic and strictly increasing with the chronological order of the
/// dates. Dates before the epoch are rejected since keys are non-negative.
pub fn timestamp_millis(date: &str) -> Result<Key, LoadError> {
    let trimmed = date.trim();
    let parsed = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|source| {
        LoadError::InvalidDate {
            value: trimmed.to_owned(),
            source,
        }
    })?;

    let millis = (i64::from(parsed.num_days_from_ce()) - UNIX_EPOCH_DAYS_FROM_CE) * MILLIS_PER_DAY;

    if millis < 0 {
        Err(LoadError::KeyBeforeEpoch(trimmed.to_owned()))
    } else {
        Ok(millis)
    }
}
