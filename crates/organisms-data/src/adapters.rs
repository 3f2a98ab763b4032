//! Chart-ready reshaping of an aggregated telemetry series.
//!
//! Each adapter is a pure transform. Line and scatter produce named
//! coordinate lists, histogram groups by exact value, and pie summarises the
//! latest point of a population.

use std::collections::BTreeMap;

use organisms_core::error::{OrganismsError, Result};
use organisms_core::models::AggregatedTelemetryPoint;
use organisms_core::plots::{
    AxisValue, ChartType, PlotSelection, Population, TelemetryField, VariableClass,
};
use serde::Serialize;

// ── Output shapes ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Coordinate {
    pub x: AxisValue,
    pub y: AxisValue,
}

/// One named series of coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlotSeries {
    pub id: String,
    pub points: Vec<Coordinate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistogramBucket {
    pub bucket: u32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PieSlice {
    /// Same as `label`; slices are keyed by what they show.
    pub id: String,
    pub label: String,
    pub value: u32,
}

/// Data for any supported chart type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChartData {
    Series(Vec<PlotSeries>),
    Histogram(Vec<HistogramBucket>),
    Pie(Vec<PieSlice>),
}

// ── Adapters ──────────────────────────────────────────────────────────────────

/// Line chart: one series named `"{y} vs {x}"`, in series (time) order.
pub fn line_series(
    series: &[AggregatedTelemetryPoint],
    x: TelemetryField,
    y: TelemetryField,
) -> Vec<PlotSeries> {
    vec![PlotSeries {
        id: format!("{} vs {}", y.label(), x.label()),
        points: coordinates(series, x, y),
    }]
}

/// Scatter chart: one series named `"{x} vs {y}"`. Point order carries no meaning.
pub fn scatter_series(
    series: &[AggregatedTelemetryPoint],
    x: TelemetryField,
    y: TelemetryField,
) -> Vec<PlotSeries> {
    vec![PlotSeries {
        id: format!("{} vs {}", x.label(), y.label()),
        points: coordinates(series, x, y),
    }]
}

/// Histogram: one bucket per distinct value of `field`, ascending by value.
pub fn histogram(
    series: &[AggregatedTelemetryPoint],
    field: TelemetryField,
) -> Result<Vec<HistogramBucket>> {
    if field.class() == VariableClass::Temporal {
        return Err(OrganismsError::NonNumericField(field.id().to_string()));
    }

    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for value in series.iter().filter_map(|point| field.count_of(point)) {
        *counts.entry(value).or_default() += 1;
    }

    Ok(counts
        .into_iter()
        .map(|(bucket, count)| HistogramBucket { bucket, count })
        .collect())
}

/// Pie: healthy and infected slices of `population` at the latest point.
///
/// Zero-value slices are omitted; an empty series yields no slices.
pub fn pie(series: &[AggregatedTelemetryPoint], population: Population) -> Vec<PieSlice> {
    let Some(latest) = series.last() else {
        return Vec::new();
    };

    let (name, healthy, infected) = match population {
        Population::Cadets => ("Cadets", latest.healthy_cadets, latest.infected_cadets),
        Population::Sectors => ("Sectors", latest.healthy_sectors, latest.infected_sectors),
    };

    [("Healthy", healthy), ("Infected", infected)]
        .into_iter()
        .filter(|(_, value)| *value > 0)
        .map(|(state, value)| {
            let label = format!("{state} {name}");
            PieSlice {
                id: label.clone(),
                label,
                value,
            }
        })
        .collect()
}

/// Validate `selection` for `chart` and run the matching adapter.
pub fn chart_data(
    chart: ChartType,
    selection: &PlotSelection,
    series: &[AggregatedTelemetryPoint],
) -> Result<ChartData> {
    selection.validate(chart)?;

    let require = |field: Option<TelemetryField>, role: &str| {
        field.ok_or_else(|| {
            OrganismsError::InvalidPlotSelection(format!("{chart} plot needs a {role} variable"))
        })
    };

    Ok(match chart {
        ChartType::Line => ChartData::Series(line_series(
            series,
            require(selection.x, "x")?,
            require(selection.y, "y")?,
        )),
        ChartType::Scatter => ChartData::Series(scatter_series(
            series,
            require(selection.x, "x")?,
            require(selection.y, "y")?,
        )),
        ChartType::Histogram => {
            ChartData::Histogram(histogram(series, require(selection.value, "value")?)?)
        }
        ChartType::Pie => ChartData::Pie(pie(
            series,
            selection.population.ok_or_else(|| {
                OrganismsError::InvalidPlotSelection("pie plot needs a population".to_string())
            })?,
        )),
    })
}

fn coordinates(
    series: &[AggregatedTelemetryPoint],
    x: TelemetryField,
    y: TelemetryField,
) -> Vec<Coordinate> {
    series
        .iter()
        .map(|point| Coordinate {
            x: x.value_of(point),
            y: y.value_of(point),
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
