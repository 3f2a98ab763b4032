//! Declarative registry of plottable variables and chart types.
//!
//! Every variable maps to a field of [`AggregatedTelemetryPoint`] and carries
//! a semantic class. Every chart type lists, per role, the classes it accepts.
//! The plot builder filters its choices through [`valid_variables`] and
//! repairs selections with [`PlotSelection::corrected_for`] whenever the
//! chart type changes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OrganismsError, Result};
use crate::models::AggregatedTelemetryPoint;

// ── Variable classes ──────────────────────────────────────────────────────────

/// Semantic class of a variable, independent of how it is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableClass {
    Temporal,
    Ordinal,
    Quantitative,
}

// ── Telemetry fields ──────────────────────────────────────────────────────────

/// A plottable field of [`AggregatedTelemetryPoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TelemetryField {
    Time,
    CumulativeMeetings,
    InfectedCadets,
    HealthyCadets,
    TotalCadets,
    InfectedSectors,
    HealthySectors,
    TotalSectors,
}

/// Registry entry for one variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variable {
    pub field: TelemetryField,
    pub id: &'static str,
    pub label: &'static str,
    pub class: VariableClass,
}

/// All plottable variables, in the order the plot builder lists them.
pub const VARIABLES: [Variable; 8] = [
    Variable {
        field: TelemetryField::Time,
        id: "time",
        label: "Time",
        class: VariableClass::Temporal,
    },
    Variable {
        field: TelemetryField::CumulativeMeetings,
        id: "cumulativeMeetings",
        label: "Meetings Held",
        class: VariableClass::Ordinal,
    },
    Variable {
        field: TelemetryField::InfectedCadets,
        id: "infectedCadets",
        label: "Infected Cadets",
        class: VariableClass::Quantitative,
    },
    Variable {
        field: TelemetryField::HealthyCadets,
        id: "healthyCadets",
        label: "Healthy Cadets",
        class: VariableClass::Quantitative,
    },
    Variable {
        field: TelemetryField::TotalCadets,
        id: "totalCadets",
        label: "Total Cadets",
        class: VariableClass::Quantitative,
    },
    Variable {
        field: TelemetryField::InfectedSectors,
        id: "infectedSectors",
        label: "Infected Sectors",
        class: VariableClass::Quantitative,
    },
    Variable {
        field: TelemetryField::HealthySectors,
        id: "healthySectors",
        label: "Healthy Sectors",
        class: VariableClass::Quantitative,
    },
    Variable {
        field: TelemetryField::TotalSectors,
        id: "totalSectors",
        label: "Total Sectors",
        class: VariableClass::Quantitative,
    },
];

impl TelemetryField {
    fn entry(self) -> &'static Variable {
        // Every field has exactly one registry entry.
        VARIABLES
            .iter()
            .find(|v| v.field == self)
            .unwrap_or(&VARIABLES[0])
    }

    pub fn id(self) -> &'static str {
        self.entry().id
    }

    pub fn label(self) -> &'static str {
        self.entry().label
    }

    pub fn class(self) -> VariableClass {
        self.entry().class
    }

    /// The field's value in `point`.
    pub fn value_of(self, point: &AggregatedTelemetryPoint) -> AxisValue {
        match self {
            Self::Time => AxisValue::Time(point.time),
            other => AxisValue::Count(other.count_of(point).unwrap_or_default()),
        }
    }

    /// The field's numeric value in `point`; `None` for the temporal field.
    pub fn count_of(self, point: &AggregatedTelemetryPoint) -> Option<u32> {
        match self {
            Self::Time => None,
            Self::CumulativeMeetings => Some(point.cumulative_meetings),
            Self::InfectedCadets => Some(point.infected_cadets),
            Self::HealthyCadets => Some(point.healthy_cadets),
            Self::TotalCadets => Some(point.total_cadets),
            Self::InfectedSectors => Some(point.infected_sectors),
            Self::HealthySectors => Some(point.healthy_sectors),
            Self::TotalSectors => Some(point.total_sectors),
        }
    }
}

impl FromStr for TelemetryField {
    type Err = OrganismsError;

    /// Accepts registry ids, display labels, and the legacy `meetingsHeld` id.
    fn from_str(s: &str) -> Result<Self> {
        if s == "meetingsHeld" {
            return Ok(Self::CumulativeMeetings);
        }
        VARIABLES
            .iter()
            .find(|v| v.id == s || v.label.eq_ignore_ascii_case(s))
            .map(|v| v.field)
            .ok_or_else(|| OrganismsError::UnknownVariable(s.to_string()))
    }
}

impl fmt::Display for TelemetryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A coordinate value handed to the charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisValue {
    Time(DateTime<Utc>),
    Count(u32),
}

// ── Chart types ───────────────────────────────────────────────────────────────

/// A slot in a chart that a variable can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotRole {
    X,
    Y,
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Scatter,
    Histogram,
    Pie,
}

/// Registry entry for one chart type.
#[derive(Debug, Clone, Copy)]
pub struct PlotTypeDef {
    pub chart: ChartType,
    pub id: &'static str,
    pub label: &'static str,
    pub roles: &'static [(PlotRole, &'static [VariableClass])],
}

pub const PLOT_TYPES: [PlotTypeDef; 4] = [
    PlotTypeDef {
        chart: ChartType::Line,
        id: "line",
        label: "Line Plot",
        roles: &[
            (
                PlotRole::X,
                &[VariableClass::Temporal, VariableClass::Ordinal],
            ),
            (PlotRole::Y, &[VariableClass::Quantitative]),
        ],
    },
    PlotTypeDef {
        chart: ChartType::Scatter,
        id: "scatter",
        label: "Scatter Plot",
        roles: &[
            (PlotRole::X, &[VariableClass::Quantitative]),
            (PlotRole::Y, &[VariableClass::Quantitative]),
        ],
    },
    PlotTypeDef {
        chart: ChartType::Histogram,
        id: "histogram",
        label: "Histogram",
        roles: &[(
            PlotRole::Value,
            &[VariableClass::Quantitative, VariableClass::Ordinal],
        )],
    },
    // Pie charts take a population instead of variables.
    PlotTypeDef {
        chart: ChartType::Pie,
        id: "pie",
        label: "Pie Chart",
        roles: &[],
    },
];

impl ChartType {
    pub fn definition(self) -> &'static PlotTypeDef {
        PLOT_TYPES
            .iter()
            .find(|p| p.chart == self)
            .unwrap_or(&PLOT_TYPES[0])
    }

    pub fn id(self) -> &'static str {
        self.definition().id
    }

    pub fn label(self) -> &'static str {
        self.definition().label
    }

    /// Roles this chart type requires, in declaration order.
    pub fn roles(self) -> impl Iterator<Item = PlotRole> {
        self.definition().roles.iter().map(|(role, _)| *role)
    }

    /// Classes accepted for `role`; empty when the chart has no such role.
    pub fn allowed_classes(self, role: PlotRole) -> &'static [VariableClass] {
        self.definition()
            .roles
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, classes)| *classes)
            .unwrap_or(&[])
    }
}

impl FromStr for ChartType {
    type Err = OrganismsError;

    fn from_str(s: &str) -> Result<Self> {
        PLOT_TYPES
            .iter()
            .find(|p| p.id == s.to_lowercase())
            .map(|p| p.chart)
            .ok_or_else(|| OrganismsError::UnknownChartType(s.to_string()))
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Which population a pie chart summarises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Population {
    Cadets,
    Sectors,
}

impl FromStr for Population {
    type Err = OrganismsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cadets" => Ok(Self::Cadets),
            "sectors" => Ok(Self::Sectors),
            other => Err(OrganismsError::Config(format!(
                "unknown population: {other}"
            ))),
        }
    }
}

// ── Validation ────────────────────────────────────────────────────────────────

/// All variables whose class `chart` accepts for `role`.
///
/// `valid_variables(ChartType::Line, PlotRole::X)` yields the temporal and
/// ordinal variables.
pub fn valid_variables(chart: ChartType, role: PlotRole) -> Vec<TelemetryField> {
    let allowed = chart.allowed_classes(role);
    VARIABLES
        .iter()
        .filter(|v| allowed.contains(&v.class))
        .map(|v| v.field)
        .collect()
}

/// The variables currently assigned to each role of a chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotSelection {
    pub x: Option<TelemetryField>,
    pub y: Option<TelemetryField>,
    pub value: Option<TelemetryField>,
    pub population: Option<Population>,
}

impl PlotSelection {
    pub fn get(&self, role: PlotRole) -> Option<TelemetryField> {
        match role {
            PlotRole::X => self.x,
            PlotRole::Y => self.y,
            PlotRole::Value => self.value,
        }
    }

    fn set(&mut self, role: PlotRole, field: Option<TelemetryField>) {
        match role {
            PlotRole::X => self.x = field,
            PlotRole::Y => self.y = field,
            PlotRole::Value => self.value = field,
        }
    }

    /// Check the selection against `chart`, naming the first violated role.
    pub fn validate(&self, chart: ChartType) -> Result<()> {
        for role in chart.roles() {
            let Some(field) = self.get(role) else {
                return Err(OrganismsError::InvalidPlotSelection(format!(
                    "{chart} plot needs a {role:?} variable"
                )));
            };
            if !chart.allowed_classes(role).contains(&field.class()) {
                return Err(OrganismsError::InvalidPlotSelection(format!(
                    "{field} ({:?}) cannot fill the {role:?} role of a {chart} plot",
                    field.class()
                )));
            }
        }
        if chart == ChartType::Pie && self.population.is_none() {
            return Err(OrganismsError::InvalidPlotSelection(
                "pie plot needs a population".to_string(),
            ));
        }
        Ok(())
    }

    /// Repair the selection after switching to `chart`.
    ///
    /// Assignments that remain valid are kept, missing or invalid required
    /// roles get the first valid variable, and roles `chart` does not use
    /// are cleared.
    pub fn corrected_for(&self, chart: ChartType) -> PlotSelection {
        let mut corrected = PlotSelection::default();

        for role in chart.roles() {
            let valid = valid_variables(chart, role);
            let keep = self.get(role).filter(|f| valid.contains(f));
            corrected.set(role, keep.or_else(|| valid.first().copied()));
        }

        if chart == ChartType::Pie {
            corrected.population = Some(self.population.unwrap_or(Population::Cadets));
        }

        corrected
    }

    /// Roles whose assignment differs between `self` and `other`.
    pub fn changed_roles(&self, other: &PlotSelection) -> Vec<PlotRole> {
        [PlotRole::X, PlotRole::Y, PlotRole::Value]
            .into_iter()
            .filter(|role| self.get(*role) != other.get(*role))
            .collect()
    }
}

/// `true` when every role `chart` requires is filled with an accepted variable.
pub fn is_valid_selection(chart: ChartType, selection: &PlotSelection) -> bool {
    selection.validate(chart).is_ok()
}
