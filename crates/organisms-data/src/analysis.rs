//! Snapshot analysis pipeline for DataOrganisms.
//!
//! Ingests a session snapshot, aggregates it, derives lifecycle status and
//! returns an [`AnalysisResult`] ready for the CLI and the runtime layer.

use std::path::Path;

use chrono::{DateTime, Utc};
use organisms_core::error::Result;
use organisms_core::models::{AggregatedTelemetryPoint, MaskPolicy};
use organisms_core::session_status::SessionStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregator::{AggregationReport, TelemetryAggregator};
use crate::reader::{ingest_session, load_session_value, IngestOptions};

// ── Public types ──────────────────────────────────────────────────────────────

/// Everything the pipeline needs besides the snapshot itself.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    pub ingest: IngestOptions,
    pub mask_policy: MaskPolicy,
}

/// Metadata produced alongside the analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    /// RFC 3339 timestamp when this result was generated.
    pub generated_at: String,
    /// Readings that survived ingestion.
    pub readings_ingested: usize,
    /// Meeting intervals that survived ingestion.
    pub meetings_ingested: usize,
    /// Points in the aggregated series.
    pub points_emitted: usize,
    /// Wall-clock seconds spent ingesting the snapshot.
    pub ingest_time_seconds: f64,
    /// Wall-clock seconds spent aggregating.
    pub aggregate_time_seconds: f64,
}

/// Headline numbers of a series, for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySummary {
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    pub peak_infected_cadets: u32,
    pub peak_infected_sectors: u32,
    pub meetings_held: u32,
}

/// The complete output of [`analyze_snapshot`].
#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub status: SessionStatus,
    pub points: Vec<AggregatedTelemetryPoint>,
    pub report: AggregationReport,
    /// `None` when the series is empty.
    pub summary: Option<TelemetrySummary>,
    pub metadata: AnalysisMetadata,
}

// ── Public functions ──────────────────────────────────────────────────────────

/// Run the full pipeline over an in-memory snapshot.
///
/// 1. Ingest the snapshot into a typed record.
/// 2. Aggregate with the configured mask policy.
/// 3. Derive the lifecycle status and summary.
pub fn analyze_snapshot(value: &Value, options: &AnalysisOptions) -> Result<AnalysisResult> {
    // ── Step 1: Ingest ────────────────────────────────────────────────────────
    let ingest_start = std::time::Instant::now();
    let record = ingest_session(value, &options.ingest)?;
    let ingest_time = ingest_start.elapsed().as_secs_f64();

    // ── Step 2: Aggregate ─────────────────────────────────────────────────────
    let aggregate_start = std::time::Instant::now();
    let (points, report) =
        TelemetryAggregator::new(options.mask_policy).aggregate_with_report(&record);
    let aggregate_time = aggregate_start.elapsed().as_secs_f64();

    // ── Step 3: Build result ──────────────────────────────────────────────────
    let metadata = AnalysisMetadata {
        generated_at: Utc::now().to_rfc3339(),
        readings_ingested: record.readings.len(),
        meetings_ingested: record.meetings.len(),
        points_emitted: points.len(),
        ingest_time_seconds: ingest_time,
        aggregate_time_seconds: aggregate_time,
    };

    Ok(AnalysisResult {
        status: SessionStatus::derive(&record.metadata),
        summary: summarize(&points),
        points,
        report,
        metadata,
    })
}

/// Load a session document from disk and analyse it.
pub fn analyze_session_file(path: &Path, options: &AnalysisOptions) -> Result<AnalysisResult> {
    let value = load_session_value(path)?;
    analyze_snapshot(&value, options)
}

/// Peaks and span of a series; `None` for an empty series.
pub fn summarize(points: &[AggregatedTelemetryPoint]) -> Option<TelemetrySummary> {
    let first = points.first()?;
    let last = points.last()?;
    Some(TelemetrySummary {
        first: first.time,
        last: last.time,
        peak_infected_cadets: points.iter().map(|p| p.infected_cadets).max().unwrap_or(0),
        peak_infected_sectors: points.iter().map(|p| p.infected_sectors).max().unwrap_or(0),
        meetings_held: last.cumulative_meetings,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
