use crate::{
    metrics::{BackendId, MetricSeries, Results, SeriesId},
    trend::TrendSet,
};
use itertools::Itertools;
use plotters::{
    coord::Shift,
    prelude::*,
    style::text_anchor::{HPos, Pos, VPos},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, ops::Range, path::Path};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to draw figure: {0}")]
    Draw(String),
    #[error("Nothing to draw for {0}")]
    Empty(&'static str),
}

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for ReportError {
    fn from(error: DrawingAreaErrorKind<E>) -> Self {
        ReportError::Draw(error.to_string())
    }
}

const FONT: &str = "sans-serif";

fn point_color(backend: BackendId) -> RGBColor {
    match backend {
        BackendId::Store => BLUE,
        BackendId::Sqlite => RED,
    }
}

fn trend_color(backend: BackendId) -> RGBColor {
    match backend {
        BackendId::Store => RGBColor(0, 0, 128),
        BackendId::Sqlite => RGBColor(128, 0, 0),
    }
}

/// Render one panel per operation class into a single SVG figure.
///
/// Backend samples are drawn as points, the fitted trend (when one exists) as a line. Series
/// whose trend could not be fitted are still drawn, just without the line.
pub fn render_comparison(path: &Path, results: &Results, trends: &TrendSet) -> Result<(), ReportError> {
    let root = SVGBackend::new(path, (1300, 1000)).into_drawing_area();
    root.fill(&WHITE)?;

    let title = format!(
        "Metrics for Sample Data Size {}, Operation Chunk Size {}",
        results.meta.scale, results.meta.chunk_size
    );
    let root = root.titled(&title, (FONT, 26))?;

    for (panel, id) in root.split_evenly((2, 2)).iter().zip(SeriesId::ALL) {
        draw_panel(panel, id, results.series(id), trends)?;
    }

    root.present()?;
    info!(path = %path.display(), "Rendered comparison figure");

    Ok(())
}

fn draw_panel<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    id: SeriesId,
    series: Option<&MetricSeries>,
    trends: &TrendSet,
) -> Result<(), ReportError> {
    let points = BackendId::ALL.map(|backend| {
        (
            backend,
            series.map(|series| series.points(backend)).unwrap_or_default(),
        )
    });

    let x_range = match padded(points.iter().flat_map(|(_, p)| p.iter().map(|(x, _)| *x))) {
        Some(range) => range,
        None => {
            area.draw(&Text::new(
                format!("{} (no samples)", id.title()),
                (20, 20),
                (FONT, 18.0),
            ))?;

            return Ok(());
        }
    };

    // keep fitted lines inside the plotting area
    let fitted_ends = BackendId::ALL
        .iter()
        .filter_map(|backend| trends.get(&(id, *backend)).and_then(|t| t.as_ref().ok()))
        .flat_map(|line| [line.at(x_range.start), line.at(x_range.end)])
        .collect_vec();
    let y_range = padded(
        points
            .iter()
            .flat_map(|(_, p)| p.iter().map(|(_, y)| *y))
            .chain(fitted_ends)
            .chain([0.0]),
    )
    .unwrap_or(0.0..1.0);

    let mut chart = ChartBuilder::on(area)
        .caption(id.title(), (FONT, 20))
        .margin(10)
        .x_label_area_size(45)
        .y_label_area_size(65)
        .build_cartesian_2d(x_range.clone(), y_range)?;

    chart
        .configure_mesh()
        .x_desc(id.x_label())
        .y_desc("Time (ms)")
        .x_label_formatter(&|x| compact(*x))
        .draw()?;

    for (backend, backend_points) in points.iter() {
        let color = point_color(*backend);
        let trend = trends
            .get(&(id, *backend))
            .and_then(|fitted| fitted.as_ref().ok());
        let label = match trend {
            Some(line) => format!("{} : {}", backend.label(), line.annotation()),
            None => backend.label().to_string(),
        };

        chart
            .draw_series(
                backend_points
                    .iter()
                    .map(|point| Circle::new(*point, 3, color.filled())),
            )?
            .label(label)
            .legend(move |(x, y)| Rectangle::new([(x - 5, y - 5), (x + 5, y + 5)], color.filled()));

        if let Some(line) = trend {
            chart.draw_series(LineSeries::new(
                [x_range.start, x_range.end].map(|x| (x, line.at(x))),
                trend_color(*backend).stroke_width(2),
            ))?;
        }
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    Ok(())
}

/// Range covering all values with a 5% margin, or `None` without values
fn padded<I: IntoIterator<Item = f64>>(values: I) -> Option<Range<f64>> {
    let (min, max) = values
        .into_iter()
        .filter(|value| value.is_finite())
        .minmax()
        .into_option()?;

    let margin = if max > min {
        (max - min) * 0.05
    } else {
        min.abs().max(1.0) * 0.05
    };

    Some((min - margin)..(max + margin))
}

fn compact(value: f64) -> String {
    if value.abs() >= 1e5 {
        format!("{value:.2e}")
    } else {
        format!("{value:.0}")
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    Csv,
    Sql,
    Store,
}

impl Representation {
    pub const ALL: [Representation; 3] = [
        Representation::Csv,
        Representation::Sql,
        Representation::Store,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Sql => "sql",
            Self::Store => "store",
        }
    }

    fn color(&self) -> RGBColor {
        match self {
            Self::Csv => RGBColor(31, 119, 180),
            Self::Sql => RGBColor(255, 127, 14),
            Self::Store => RGBColor(44, 160, 44),
        }
    }
}

/// On-disk sizes in megabytes, one group per dataset scale
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SizeTable {
    pub labels: Vec<String>,
    pub megabytes: BTreeMap<Representation, Vec<f64>>,
}

impl SizeTable {
    pub fn push(&mut self, label: impl Into<String>, sizes: [(Representation, u64); 3]) {
        self.labels.push(label.into());

        for (representation, bytes) in sizes {
            self.megabytes
                .entry(representation)
                .or_default()
                .push(to_megabytes(bytes));
        }
    }

    pub fn get(&self, representation: Representation) -> &[f64] {
        self.megabytes
            .get(&representation)
            .map_or(&[], Vec::as_slice)
    }
}

/// Bytes to megabytes, rounded to two decimals
pub fn to_megabytes(bytes: u64) -> f64 {
    (bytes as f64 / 10_000.0).round() / 100.0
}

const BAR_WIDTH: f64 = 0.25;

/// Grouped bar chart of on-disk size by representation and scale.
pub fn render_file_sizes(path: &Path, table: &SizeTable) -> Result<(), ReportError> {
    if table.labels.is_empty() {
        return Err(ReportError::Empty("file sizes"));
    }

    let groups = table.labels.len() as f64;
    let top = table
        .megabytes
        .values()
        .flatten()
        .fold(0.0_f64, |max, value| max.max(*value))
        .max(0.01)
        * 1.2;
    // room below zero for the group labels
    let bottom = -top * 0.08;

    let root = SVGBackend::new(path, (1000, 700)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("File Size by Data Storage Type", (FONT, 24))
        .margin(15)
        .x_label_area_size(30)
        .y_label_area_size(65)
        .build_cartesian_2d(-0.25..groups, bottom..top)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(0)
        .x_desc("Database Size (n)")
        .y_desc("File Size (megabytes)")
        .draw()?;

    let value_style = TextStyle::from((FONT, 13.0)).pos(Pos::new(HPos::Center, VPos::Bottom));
    let group_style = TextStyle::from((FONT, 15.0)).pos(Pos::new(HPos::Center, VPos::Top));

    for (offset, representation) in Representation::ALL.iter().enumerate() {
        let color = representation.color();
        let sizes = table.get(*representation);
        let left = |group: usize| group as f64 + BAR_WIDTH * offset as f64;

        chart
            .draw_series(sizes.iter().enumerate().map(|(group, size)| {
                Rectangle::new(
                    [(left(group), 0.0), (left(group) + BAR_WIDTH * 0.95, *size)],
                    color.filled(),
                )
            }))?
            .label(representation.label())
            .legend(move |(x, y)| Rectangle::new([(x - 5, y - 5), (x + 5, y + 5)], color.filled()));

        chart.draw_series(sizes.iter().enumerate().map(|(group, size)| {
            Text::new(
                format!("{size:.2}"),
                (left(group) + BAR_WIDTH / 2.0, *size),
                value_style.clone(),
            )
        }))?;
    }

    chart.draw_series(table.labels.iter().enumerate().map(|(group, label)| {
        Text::new(
            label.clone(),
            (group as f64 + BAR_WIDTH * 1.5, bottom * 0.2),
            group_style.clone(),
        )
    }))?;

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    info!(path = %path.display(), groups = table.labels.len(), "Rendered file size figure");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metrics::{MetricSample, RunMeta},
        trend::fit_all,
    };

    fn sample(series: SeriesId, backend: BackendId, x: f64, duration_ms: f64) -> MetricSample {
        MetricSample {
            series,
            x,
            backend,
            duration_ms,
        }
    }

    #[test]
    fn renders_all_panels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics_100.svg");

        let mut results = Results::new(RunMeta {
            scale: 100,
            chunk_size: 10,
        });
        for step in 1..=10 {
            let x = (step * 10) as f64;
            for backend in BackendId::ALL {
                results.extend([
                    sample(SeriesId::Insert, backend, x, x * 0.1),
                    sample(SeriesId::Delete, backend, 100.0 - x, 2.0),
                ]);
            }
        }
        // a single range query cannot be fitted, the panel is drawn anyway
        results.extend([sample(SeriesId::QueryRange, BackendId::Store, 5.0, 1.0)]);
        let before = results.clone();

        let trends = fit_all(&results);
        render_comparison(&path, &results, &trends).unwrap();

        assert_eq!(results, before);
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Metrics for Sample Data Size 100, Operation Chunk Size 10"));
        assert!(svg.contains("Insert in Random Order"));
        assert!(svg.contains("Randomized Singular Select (no samples)"));
    }

    #[test]
    fn renders_grouped_bars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file_sizes.svg");

        let mut table = SizeTable::default();
        table.push(
            "10000",
            [
                (Representation::Csv, 1_234_567),
                (Representation::Sql, 2_000_000),
                (Representation::Store, 900_000),
            ],
        );
        table.push(
            "100000",
            [
                (Representation::Csv, 12_345_678),
                (Representation::Sql, 20_000_000),
                (Representation::Store, 9_000_000),
            ],
        );

        assert_eq!(table.get(Representation::Csv), [1.23, 12.35]);
        render_file_sizes(&path, &table).unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("File Size by Data Storage Type"));
        assert!(svg.contains("100000"));
        assert!(svg.contains("12.35"));
    }

    #[test]
    fn empty_size_table_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = render_file_sizes(&dir.path().join("none.svg"), &SizeTable::default());

        assert!(matches!(result, Err(ReportError::Empty(_))));
    }

    #[test]
    fn megabyte_rounding() {
        assert_eq!(to_megabytes(0), 0.0);
        assert_eq!(to_megabytes(1_000_000), 1.0);
        assert_eq!(to_megabytes(1_234_567), 1.23);
        assert_eq!(to_megabytes(1_235_001), 1.24);
    }

    #[test]
    fn padded_ranges() {
        assert!(padded(Vec::<f64>::new()).is_none());
        assert_eq!(padded([0.0, 10.0]), Some(-0.5..10.5));
        let single = padded([4.0]).unwrap();
        assert!(single.start < 4.0 && single.end > 4.0);
    }
}
