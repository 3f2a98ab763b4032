//! Telemetry aggregation: session record in, population-health series out.
//!
//! The aggregator is a pure function of its input. It walks readings in
//! timestamp order and emits one [`AggregatedTelemetryPoint`] per reading,
//! with totals taken from session metadata and never from mask length.

use organisms_core::models::{
    AggregatedTelemetryPoint, DeviceRole, MaskPolicy, MeetingInterval, ProximityMask, RawReading,
    SessionRecord,
};
use serde::Serialize;
use tracing::{debug, warn};

// ── AggregationReport ─────────────────────────────────────────────────────────

/// Data-quality counters gathered during one aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregationReport {
    /// Readings that produced no point (strict mask policy only).
    pub readings_skipped: usize,
    /// Readings whose mask was malformed or short but was used anyway.
    pub masks_repaired: usize,
    /// Points whose infected count exceeded the total and was capped.
    pub points_clamped: usize,
}

// ── TelemetryAggregator ───────────────────────────────────────────────────────

/// Converts a [`SessionRecord`] into an ordered telemetry series.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryAggregator {
    mask_policy: MaskPolicy,
}

/// Mask layout fixed by session metadata.
#[derive(Debug, Clone, Copy)]
struct Layout {
    cadets: u32,
    sectors: u32,
}

impl Layout {
    fn mask_len(self) -> usize {
        self.cadets as usize + self.sectors as usize
    }
}

impl TelemetryAggregator {
    pub fn new(mask_policy: MaskPolicy) -> Self {
        Self { mask_policy }
    }

    pub fn mask_policy(&self) -> MaskPolicy {
        self.mask_policy
    }

    /// Aggregate `session` into one point per usable reading, sorted by time.
    ///
    /// A session without a start record yields an empty series.
    pub fn aggregate(&self, session: &SessionRecord) -> Vec<AggregatedTelemetryPoint> {
        self.aggregate_with_report(session).0
    }

    /// Like [`aggregate`](Self::aggregate), also returning data-quality counters.
    pub fn aggregate_with_report(
        &self,
        session: &SessionRecord,
    ) -> (Vec<AggregatedTelemetryPoint>, AggregationReport) {
        let mut report = AggregationReport::default();

        let Some(start) = &session.metadata.start else {
            debug!("Session has not started; no telemetry");
            return (Vec::new(), report);
        };
        let layout = Layout {
            cadets: start.cadets,
            sectors: start.sectors,
        };

        // Stable sort: equal timestamps keep document order.
        let mut ordered: Vec<&RawReading> = session.readings.iter().collect();
        ordered.sort_by_key(|r| r.timestamp);

        let mut points = Vec::with_capacity(ordered.len());
        let mut was_in_meeting = false;
        let mut cumulative_meetings = 0u32;

        for reading in ordered {
            let Some((near_cadets, near_sectors)) =
                self.proximity_counts(reading, layout, &mut report)
            else {
                report.readings_skipped += 1;
                continue;
            };

            let during_meeting = is_during_meeting(&session.meetings, reading);
            if during_meeting && !was_in_meeting {
                cumulative_meetings += 1;
            }
            was_in_meeting = during_meeting;

            let (self_cadet, self_sector) = match (reading.role, reading.infected) {
                (Some(DeviceRole::Cadet), true) => (1, 0),
                (Some(DeviceRole::Sector), true) => (0, 1),
                _ => (0, 0),
            };

            let (infected_cadets, cadets_clamped) =
                clamp_to_total(near_cadets.saturating_add(self_cadet), layout.cadets);
            let (infected_sectors, sectors_clamped) =
                clamp_to_total(near_sectors.saturating_add(self_sector), layout.sectors);

            if cadets_clamped || sectors_clamped {
                report.points_clamped += 1;
                debug!(
                    reading = %reading.id,
                    device = %reading.device_id,
                    "Infected count exceeded total, clamped"
                );
            }

            points.push(AggregatedTelemetryPoint {
                time: reading.timestamp,
                total_cadets: layout.cadets,
                total_sectors: layout.sectors,
                infected_cadets,
                healthy_cadets: layout.cadets - infected_cadets,
                infected_sectors,
                healthy_sectors: layout.sectors - infected_sectors,
                during_meeting,
                cumulative_meetings,
            });
        }

        debug!(
            readings = session.readings.len(),
            points = points.len(),
            meetings = cumulative_meetings,
            skipped = report.readings_skipped,
            repaired = report.masks_repaired,
            clamped = report.points_clamped,
            "Aggregated telemetry"
        );

        (points, report)
    }

    /// Count `true` flags in the cadet and sector slices of the mask.
    ///
    /// Returns `None` when the mask policy rejects the reading.
    fn proximity_counts(
        &self,
        reading: &RawReading,
        layout: Layout,
        report: &mut AggregationReport,
    ) -> Option<(u32, u32)> {
        let expected = layout.mask_len();

        let flags: &[bool] = match &reading.proximity_mask {
            ProximityMask::Decoded(flags) if flags.len() >= expected => flags,
            ProximityMask::Decoded(flags) => {
                if self.mask_policy == MaskPolicy::Strict {
                    warn!(
                        reading = %reading.id,
                        len = flags.len(),
                        expected,
                        "Proximity mask too short, skipping reading"
                    );
                    return None;
                }
                report.masks_repaired += 1;
                debug!(
                    reading = %reading.id,
                    len = flags.len(),
                    expected,
                    "Proximity mask too short, missing positions read as false"
                );
                flags
            }
            ProximityMask::Malformed(reason) => {
                if self.mask_policy == MaskPolicy::Strict {
                    warn!(reading = %reading.id, %reason, "Malformed proximity mask, skipping reading");
                    return None;
                }
                report.masks_repaired += 1;
                warn!(reading = %reading.id, %reason, "Malformed proximity mask, no proximity counted");
                &[]
            }
        };

        let cadet_end = layout.cadets as usize;
        Some((
            count_set(flags, 0, cadet_end),
            count_set(flags, cadet_end, expected),
        ))
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Inclusive on both ends; overlapping meetings count as one.
fn is_during_meeting(meetings: &[MeetingInterval], reading: &RawReading) -> bool {
    meetings.iter().any(|m| m.contains(reading.timestamp))
}

/// Set flags in `flags[start..end]`; positions past the mask count as unset.
fn count_set(flags: &[bool], start: usize, end: usize) -> u32 {
    let hits = flags
        .iter()
        .take(end)
        .skip(start)
        .filter(|flag| **flag)
        .count();
    u32::try_from(hits).unwrap_or(u32::MAX)
}

fn clamp_to_total(infected: u32, total: u32) -> (u32, bool) {
    if infected > total {
        (total, true)
    } else {
        (infected, false)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
