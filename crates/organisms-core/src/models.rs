use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{OrganismsError, Result};

// ── Device roles ──────────────────────────────────────────────────────────────

/// Which kind of entity a device is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// A badge worn by a cadet (student).
    Cadet,
    /// A beacon fixed in a sector (terminal).
    Sector,
}

impl DeviceRole {
    /// Parse an explicit `kind` value such as `"cadet"` or `"sector"`.
    ///
    /// Also accepts the classroom aliases `"student"` and `"terminal"`.
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind.trim().to_lowercase().as_str() {
            "cadet" | "student" => Some(Self::Cadet),
            "sector" | "terminal" => Some(Self::Sector),
            _ => None,
        }
    }
}

/// Id-prefix table used to classify devices that carry no explicit `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePrefixes {
    pub cadet: String,
    pub sector: String,
}

impl Default for RolePrefixes {
    fn default() -> Self {
        Self {
            cadet: "S".to_string(),
            sector: "T".to_string(),
        }
    }
}

impl RolePrefixes {
    /// Build a prefix table, rejecting empty or overlapping prefixes.
    pub fn new(cadet: impl Into<String>, sector: impl Into<String>) -> Result<Self> {
        let cadet = cadet.into();
        let sector = sector.into();

        if cadet.is_empty() || sector.is_empty() {
            return Err(OrganismsError::Config(
                "device prefixes must not be empty".to_string(),
            ));
        }
        if cadet.starts_with(&sector) || sector.starts_with(&cadet) {
            return Err(OrganismsError::Config(format!(
                "cadet prefix \"{cadet}\" and sector prefix \"{sector}\" overlap"
            )));
        }

        Ok(Self { cadet, sector })
    }

    /// Classify `device_id` by prefix. Ids matching neither prefix have no role.
    pub fn resolve(&self, device_id: &str) -> Option<DeviceRole> {
        if device_id.starts_with(&self.cadet) {
            Some(DeviceRole::Cadet)
        } else if device_id.starts_with(&self.sector) {
            Some(DeviceRole::Sector)
        } else {
            None
        }
    }
}

// ── Mask policy ───────────────────────────────────────────────────────────────

/// How the aggregator treats a reading whose proximity mask is unusable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskPolicy {
    /// Missing or undecodable positions count as `false`; the reading is kept.
    #[default]
    Lenient,
    /// Readings with a malformed or short mask are logged and skipped.
    Strict,
}

impl FromStr for MaskPolicy {
    type Err = OrganismsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(OrganismsError::Config(format!(
                "unknown mask policy: {other}"
            ))),
        }
    }
}

// ── Readings ──────────────────────────────────────────────────────────────────

/// A proximity mask after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProximityMask {
    /// Flags in mask order: cadets, then sectors, then an optional quarantine flag.
    Decoded(Vec<bool>),
    /// The raw value could not be decoded; the reason is kept for logging.
    Malformed(String),
}

/// One device's observation at an instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReading {
    /// Key of the reading in the session document.
    pub id: String,
    pub device_id: String,
    /// Resolved once at ingestion; `None` when neither `kind` nor prefix matched.
    pub role: Option<DeviceRole>,
    /// Self-reported infection flag.
    pub infected: bool,
    pub proximity_mask: ProximityMask,
    pub timestamp: DateTime<Utc>,
}

// ── Meetings ──────────────────────────────────────────────────────────────────

/// A period during which an organised meeting task took place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingInterval {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl MeetingInterval {
    /// `true` when `t` lies within `[start, end]`, both ends inclusive.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t <= self.end
    }
}

// ── Session metadata ──────────────────────────────────────────────────────────

/// Lifecycle actions recorded in session metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionAction {
    Start,
    Stop,
    Pause,
    Resume,
}

/// A timestamped lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEvent {
    pub action: SessionAction,
    pub timestamp: DateTime<Utc>,
}

/// The `start` record written when a teacher starts a session.
///
/// `cadets` and `sectors` are authoritative for mask layout and totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub timestamp: DateTime<Utc>,
    pub cadets: u32,
    pub sectors: u32,
    pub teacher: Option<String>,
    pub class_name: Option<String>,
}

/// Session metadata fixed by the teacher's lifecycle actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    pub start: Option<SessionStart>,
    pub stop: Option<DateTime<Utc>>,
    pub pause: Option<DateTime<Utc>>,
    pub resume: Option<DateTime<Utc>>,
    pub teacher_id: Option<String>,
    pub game_id: Option<String>,
}

impl SessionMetadata {
    /// All recorded lifecycle events, in `start, stop, pause, resume` order.
    pub fn events(&self) -> Vec<SessionEvent> {
        let mut events = Vec::with_capacity(4);
        if let Some(start) = &self.start {
            events.push(SessionEvent {
                action: SessionAction::Start,
                timestamp: start.timestamp,
            });
        }
        let rest = [
            (SessionAction::Stop, self.stop),
            (SessionAction::Pause, self.pause),
            (SessionAction::Resume, self.resume),
        ];
        for (action, ts) in rest {
            if let Some(timestamp) = ts {
                events.push(SessionEvent { action, timestamp });
            }
        }
        events
    }
}

/// A whole session snapshot after ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRecord {
    pub metadata: SessionMetadata,
    /// Readings in document order.
    pub readings: Vec<RawReading>,
    pub meetings: Vec<MeetingInterval>,
}

// ── Aggregated output ─────────────────────────────────────────────────────────

/// One row of the aggregated telemetry series, one per input reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedTelemetryPoint {
    pub time: DateTime<Utc>,

    pub total_cadets: u32,
    pub total_sectors: u32,

    pub infected_cadets: u32,
    pub healthy_cadets: u32,

    pub infected_sectors: u32,
    pub healthy_sectors: u32,

    /// `time` falls inside at least one meeting interval.
    pub during_meeting: bool,
    /// Meetings entered so far, counted on rising edges only.
    pub cumulative_meetings: u32,
}
