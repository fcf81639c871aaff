use crate::metrics::{BackendId, Results, SeriesId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DegenerateFitError {
    #[error("A trend needs at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("All {0} points share a single x value")]
    NoSpread(usize),
}

/// `y = slope * x + intercept`
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
}

impl TrendLine {
    pub fn at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Legend annotation, e.g. `y=3.0000+2.00E0x`
    pub fn annotation(&self) -> String {
        format!("y={:.4}+{:.2E}x", self.intercept, self.slope)
    }
}

pub type TrendSet = BTreeMap<(SeriesId, BackendId), Result<TrendLine, DegenerateFitError>>;

/// Ordinary least squares over `(x, y)` pairs.
pub fn fit(points: &[(f64, f64)]) -> Result<TrendLine, DegenerateFitError> {
    let (first, _) = match points {
        [] | [_] => return Err(DegenerateFitError::TooFewPoints(points.len())),
        [first, ..] => *first,
    };

    if points.iter().all(|(x, _)| *x == first) {
        return Err(DegenerateFitError::NoSpread(points.len()));
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    // centered sums, keys are in the 1e12 range
    let (sxy, sxx) = points.iter().fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
        let dx = x - mean_x;
        (sxy + dx * (y - mean_y), sxx + dx * dx)
    });

    let slope = sxy / sxx;

    Ok(TrendLine {
        slope,
        intercept: mean_y - slope * mean_x,
    })
}

/// Fit every series of a run independently per backend.
pub fn fit_all(results: &Results) -> TrendSet {
    let mut trends = TrendSet::new();

    for series in results.iter() {
        for backend in BackendId::ALL {
            let fitted = fit(&series.points(backend));

            match &fitted {
                Ok(line) => debug!(
                    series = %series.id,
                    backend = %backend,
                    slope = line.slope,
                    intercept = line.intercept,
                    "Fitted trend"
                ),
                Err(error) => warn!(
                    series = %series.id,
                    backend = %backend,
                    "Skipping trend: {error}"
                ),
            }

            trends.insert((series.id, backend), fitted);
        }
    }

    trends
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MetricSample, RunMeta};

    #[test]
    fn recovers_exact_line() {
        let points = (0..5)
            .map(|x| (x as f64, 2.0 * x as f64 + 3.0))
            .collect::<Vec<_>>();
        let line = fit(&points).unwrap();

        assert!((line.slope - 2.0).abs() < 1e-9);
        assert!((line.intercept - 3.0).abs() < 1e-9);
        assert!((line.at(10.0) - 23.0).abs() < 1e-9);
    }

    #[test]
    fn large_keys_stay_stable() {
        let base = 1_356_998_400_000.0;
        let points = (0..10)
            .map(|i| {
                let x = base + i as f64 * 86_400_000.0;
                (x, 0.5e-9 * (x - base) + 7.0)
            })
            .collect::<Vec<_>>();
        let line = fit(&points).unwrap();

        assert!((line.slope - 0.5e-9).abs() < 1e-15);
        assert!((line.at(base) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(fit(&[]), Err(DegenerateFitError::TooFewPoints(0)));
        assert_eq!(fit(&[(1.0, 2.0)]), Err(DegenerateFitError::TooFewPoints(1)));
        assert_eq!(
            fit(&[(4.0, 1.0), (4.0, 9.0), (4.0, 3.0)]),
            Err(DegenerateFitError::NoSpread(3))
        );
    }

    #[test]
    fn annotation_format() {
        let line = TrendLine {
            slope: 0.000123,
            intercept: 1.5,
        };

        assert_eq!(line.annotation(), "y=1.5000+1.23E-4x");
    }

    #[test]
    fn fits_each_backend_separately() {
        let mut results = Results::new(RunMeta {
            scale: 3,
            chunk_size: 1,
        });
        results.extend((1..=3).flat_map(|x| {
            [
                MetricSample {
                    series: SeriesId::Insert,
                    x: x as f64,
                    backend: BackendId::Store,
                    duration_ms: x as f64,
                },
                MetricSample {
                    series: SeriesId::Insert,
                    x: x as f64,
                    backend: BackendId::Sqlite,
                    duration_ms: 5.0,
                },
            ]
        }));
        results.extend([MetricSample {
            series: SeriesId::QueryRange,
            x: 1.0,
            backend: BackendId::Store,
            duration_ms: 1.0,
        }]);

        let trends = fit_all(&results);

        let store = trends[&(SeriesId::Insert, BackendId::Store)].as_ref().unwrap();
        assert!((store.slope - 1.0).abs() < 1e-9);
        let sqlite = trends[&(SeriesId::Insert, BackendId::Sqlite)].as_ref().unwrap();
        assert!(sqlite.slope.abs() < 1e-9);
        assert_eq!(
            trends[&(SeriesId::QueryRange, BackendId::Store)],
            Err(DegenerateFitError::TooFewPoints(1))
        );
        assert_eq!(trends.len(), SeriesId::ALL.len() * BackendId::ALL.len());
    }
}
