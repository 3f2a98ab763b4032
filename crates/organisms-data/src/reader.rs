//! Session snapshot discovery and ingestion.
//!
//! Turns a session document, as pushed by the realtime store or read from
//! disk, into a typed [`SessionRecord`]. Device roles are resolved and
//! proximity masks decoded here, once, so the aggregator only sees typed data.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use organisms_core::data_processors::{InfectionFlag, MaskDecoder, TimestampProcessor};
use organisms_core::error::{OrganismsError, Result};
use organisms_core::models::{
    DeviceRole, MeetingInterval, ProximityMask, RawReading, RolePrefixes, SessionMetadata,
    SessionRecord, SessionStart,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

// ── Options ───────────────────────────────────────────────────────────────────

/// How ingestion classifies devices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOptions {
    /// Prefix table consulted when a reading carries no explicit `kind`.
    pub role_prefixes: RolePrefixes,
}

// ── File discovery ────────────────────────────────────────────────────────────

/// Find all `.json` session documents recursively under `data_path`, sorted by path.
pub fn find_session_files(data_path: &Path) -> Vec<PathBuf> {
    if !data_path.exists() {
        warn!("Data path does not exist: {}", data_path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext == "json")
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Read and parse one session document.
pub fn load_session_value(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|source| OrganismsError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

// ── Ingestion ─────────────────────────────────────────────────────────────────

/// Convert a raw session snapshot into a [`SessionRecord`].
///
/// Fails only when the snapshot as a whole is not session-shaped. Individual
/// readings or meetings that cannot be interpreted are logged and dropped.
pub fn ingest_session(value: &Value, options: &IngestOptions) -> Result<SessionRecord> {
    let root = value.as_object().ok_or_else(|| {
        OrganismsError::InvalidSession(format!(
            "snapshot must be a JSON object, got {}",
            type_name(value)
        ))
    })?;

    let metadata = ingest_metadata(value)?;

    let readings = match section(root, "readings")? {
        Some(map) => parse_readings(map, &options.role_prefixes),
        None => Vec::new(),
    };

    let meetings = match section(root, "meetings")? {
        Some(map) => parse_meetings(map),
        None => Vec::new(),
    };

    debug!(
        readings = readings.len(),
        meetings = meetings.len(),
        started = metadata.start.is_some(),
        "Ingested session snapshot"
    );

    Ok(SessionRecord {
        metadata,
        readings,
        meetings,
    })
}

/// Interpret only the `metadata` member of a snapshot.
pub fn ingest_metadata(value: &Value) -> Result<SessionMetadata> {
    let root = value.as_object().ok_or_else(|| {
        OrganismsError::InvalidSession(format!(
            "snapshot must be a JSON object, got {}",
            type_name(value)
        ))
    })?;
    match section(root, "metadata")? {
        Some(map) => parse_metadata(map),
        None => Ok(SessionMetadata::default()),
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// An optional object-valued member of the snapshot. `null` counts as absent.
fn section<'a>(root: &'a Map<String, Value>, key: &str) -> Result<Option<&'a Map<String, Value>>> {
    match root.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(OrganismsError::InvalidSession(format!(
            "`{key}` must be an object, got {}",
            type_name(other)
        ))),
    }
}

fn parse_metadata(map: &Map<String, Value>) -> Result<SessionMetadata> {
    let start = match map.get("start") {
        None | Some(Value::Null) => None,
        Some(Value::Object(start)) => Some(parse_start(start)?),
        Some(other) => {
            return Err(OrganismsError::InvalidSession(format!(
                "`metadata.start` must be an object, got {}",
                type_name(other)
            )))
        }
    };

    Ok(SessionMetadata {
        start,
        stop: event_timestamp(map, "stop"),
        pause: event_timestamp(map, "pause"),
        resume: event_timestamp(map, "resume"),
        teacher_id: string_field(map, "teacherId"),
        game_id: string_field(map, "gameId"),
    })
}

fn parse_start(start: &Map<String, Value>) -> Result<SessionStart> {
    let timestamp = start
        .get("timestamp")
        .and_then(TimestampProcessor::parse)
        .ok_or_else(|| {
            OrganismsError::InvalidSession("`metadata.start.timestamp` is missing or invalid".into())
        })?;

    Ok(SessionStart {
        timestamp,
        cadets: count_field(start, "cadets")?,
        sectors: count_field(start, "sectors")?,
        teacher: string_field(start, "teacher"),
        class_name: string_field(start, "class"),
    })
}

fn count_field(map: &Map<String, Value>, key: &str) -> Result<u32> {
    let parsed = match map.get(key) {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        OrganismsError::InvalidSession(format!(
            "`metadata.start.{key}` must be a non-negative integer"
        ))
    })
}

/// Lifecycle events are written as `{ action, timestamp }`; a bare timestamp
/// is accepted as well.
fn event_timestamp(map: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    let raw = match map.get(key)? {
        Value::Null => return None,
        Value::Object(event) => event.get("timestamp")?,
        other => other,
    };
    let parsed = TimestampProcessor::parse(raw);
    if parsed.is_none() {
        warn!("Ignoring `metadata.{}` with unusable timestamp", key);
    }
    parsed
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn parse_readings(map: &Map<String, Value>, prefixes: &RolePrefixes) -> Vec<RawReading> {
    let mut readings = Vec::with_capacity(map.len());
    let mut dropped = 0usize;

    for (id, raw) in map {
        match parse_reading(id, raw, prefixes) {
            Some(reading) => readings.push(reading),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(dropped, kept = readings.len(), "Dropped uninterpretable readings");
    }
    readings
}

fn parse_reading(id: &str, raw: &Value, prefixes: &RolePrefixes) -> Option<RawReading> {
    let Some(fields) = raw.as_object() else {
        warn!(reading = id, "Reading is not an object, skipping");
        return None;
    };

    let device_id = match fields.get("device_id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            warn!(reading = id, "Reading has no device_id, skipping");
            return None;
        }
    };

    let Some(timestamp) = fields.get("timestamp").and_then(TimestampProcessor::parse) else {
        warn!(reading = id, device = %device_id, "Reading has no usable timestamp, skipping");
        return None;
    };

    let role = resolve_role(fields, &device_id, prefixes);
    if role.is_none() {
        debug!(reading = id, device = %device_id, "Device matches no role");
    }

    let proximity_mask = match MaskDecoder::decode(fields.get("proximity_mask").unwrap_or(&Value::Null)) {
        Ok(flags) => ProximityMask::Decoded(flags),
        Err(reason) => ProximityMask::Malformed(reason),
    };

    Some(RawReading {
        id: id.to_string(),
        device_id,
        role,
        infected: InfectionFlag::is_infected(fields.get("infection_status").unwrap_or(&Value::Null)),
        proximity_mask,
        timestamp,
    })
}

/// An explicit `kind` (or `role`) wins; otherwise the prefix table decides.
fn resolve_role(
    fields: &Map<String, Value>,
    device_id: &str,
    prefixes: &RolePrefixes,
) -> Option<DeviceRole> {
    let explicit = ["kind", "role"]
        .iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str));

    if let Some(kind) = explicit {
        match DeviceRole::from_kind(kind) {
            Some(role) => return Some(role),
            None => debug!(device = device_id, kind, "Unknown device kind, falling back to prefix"),
        }
    }

    prefixes.resolve(device_id)
}

fn parse_meetings(map: &Map<String, Value>) -> Vec<MeetingInterval> {
    let mut meetings = Vec::with_capacity(map.len());

    for (id, raw) in map {
        let bound = |keys: [&str; 2]| {
            keys.iter()
                .find_map(|k| raw.get(*k))
                .and_then(TimestampProcessor::parse)
        };

        match (bound(["startTime", "start"]), bound(["endTime", "end"])) {
            (Some(start), Some(end)) if end >= start => meetings.push(MeetingInterval {
                id: id.clone(),
                start,
                end,
            }),
            (Some(_), Some(_)) => warn!(meeting = %id, "Meeting ends before it starts, skipping"),
            _ => warn!(meeting = %id, "Meeting has unusable bounds, skipping"),
        }
    }

    meetings
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn ingest(value: Value) -> Result<SessionRecord> {
        ingest_session(&value, &IngestOptions::default())
    }

    fn started(readings: Value, meetings: Value) -> Value {
        json!({
            "metadata": {
                "start": {
                    "action": "start",
                    "timestamp": "2024-03-05T10:00:00Z",
                    "cadets": 2,
                    "sectors": 1,
                    "teacher": "teacher@example.org",
                    "class": "Period 3"
                },
                "stop": null,
                "teacherId": "t-1",
                "gameId": "alien-invasion"
            },
            "readings": readings,
            "meetings": meetings
        })
    }

    // ── find_session_files ────────────────────────────────────────────────────

    #[test]
    fn test_find_session_files_returns_sorted_json_only() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("archive");
        std::fs::create_dir_all(&nested).unwrap();

        for path in [
            tmp.path().join("b.json"),
            tmp.path().join("a.json"),
            nested.join("c.json"),
            tmp.path().join("notes.txt"),
            tmp.path().join("d.json.tmp"),
        ] {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "{{}}").unwrap();
        }

        let files = find_session_files(tmp.path());
        let names: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "archive/c.json", "b.json"]);
    }

    #[test]
    fn test_find_session_files_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(find_session_files(&tmp.path().join("nope")).is_empty());
    }

    #[test]
    fn test_load_session_value_errors() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("missing.json");
        assert!(matches!(
            load_session_value(&missing),
            Err(OrganismsError::FileRead { .. })
        ));

        let broken = tmp.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            load_session_value(&broken),
            Err(OrganismsError::JsonParse(_))
        ));
    }

    // ── Snapshot shape ────────────────────────────────────────────────────────

    #[test]
    fn test_non_object_snapshot_is_invalid() {
        assert!(matches!(
            ingest(json!([1, 2, 3])),
            Err(OrganismsError::InvalidSession(_))
        ));
        assert!(matches!(
            ingest(json!("session")),
            Err(OrganismsError::InvalidSession(_))
        ));
    }

    #[test]
    fn test_non_object_sections_are_invalid() {
        assert!(matches!(
            ingest(json!({ "readings": [] })),
            Err(OrganismsError::InvalidSession(_))
        ));
        assert!(matches!(
            ingest(json!({ "meetings": "none" })),
            Err(OrganismsError::InvalidSession(_))
        ));
        assert!(matches!(
            ingest(json!({ "metadata": 7 })),
            Err(OrganismsError::InvalidSession(_))
        ));
    }

    #[test]
    fn test_empty_snapshot_is_empty_record() {
        let record = ingest(json!({ "metadata": {}, "readings": {}, "meetings": {} })).unwrap();
        assert_eq!(record, SessionRecord::default());

        let record = ingest(json!({})).unwrap();
        assert!(record.metadata.start.is_none());
        assert!(record.readings.is_empty());
    }

    // ── Metadata ──────────────────────────────────────────────────────────────

    #[test]
    fn test_metadata_start_fields() {
        let record = ingest(started(json!({}), json!({}))).unwrap();
        let start = record.metadata.start.unwrap();
        assert_eq!(start.cadets, 2);
        assert_eq!(start.sectors, 1);
        assert_eq!(start.teacher.as_deref(), Some("teacher@example.org"));
        assert_eq!(start.class_name.as_deref(), Some("Period 3"));
        assert_eq!(start.timestamp, Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap());
        assert!(record.metadata.stop.is_none());
        assert_eq!(record.metadata.teacher_id.as_deref(), Some("t-1"));
        assert_eq!(record.metadata.game_id.as_deref(), Some("alien-invasion"));
    }

    #[test]
    fn test_metadata_start_without_counts_is_invalid() {
        let value = json!({
            "metadata": { "start": { "timestamp": "2024-03-05T10:00:00Z", "cadets": 2 } }
        });
        assert!(matches!(ingest(value), Err(OrganismsError::InvalidSession(_))));

        let value = json!({
            "metadata": { "start": { "timestamp": "2024-03-05T10:00:00Z", "cadets": -1, "sectors": 1 } }
        });
        assert!(matches!(ingest(value), Err(OrganismsError::InvalidSession(_))));
    }

    #[test]
    fn test_metadata_events_object_or_bare() {
        let value = json!({
            "metadata": {
                "stop": { "action": "stop", "timestamp": "2024-03-05T11:00:00Z" },
                "pause": "2024-03-05T10:30:00Z",
                "resume": { "action": "resume", "timestamp": "garbage" }
            }
        });
        let metadata = ingest(value).unwrap().metadata;
        assert_eq!(metadata.stop, Some(Utc.with_ymd_and_hms(2024, 3, 5, 11, 0, 0).unwrap()));
        assert_eq!(metadata.pause, Some(Utc.with_ymd_and_hms(2024, 3, 5, 10, 30, 0).unwrap()));
        assert!(metadata.resume.is_none());
    }

    // ── Readings ──────────────────────────────────────────────────────────────

    #[test]
    fn test_reading_fields_and_prefix_roles() {
        let record = ingest(started(
            json!({
                "r1": { "device_id": "S01", "infection_status": 1, "proximity_mask": "[1,0,0]", "timestamp": "2024-03-05T10:01:00Z" },
                "r2": { "device_id": "T01", "infection_status": 0, "proximity_mask": [0, 0, 1], "timestamp": "2024-03-05T10:02:00Z" },
                "r3": { "device_id": "X99", "infection_status": "1", "proximity_mask": "[0,0,0]", "timestamp": 1709632980 }
            }),
            json!({}),
        ))
        .unwrap();

        assert_eq!(record.readings.len(), 3);
        let r1 = &record.readings[0];
        assert_eq!(r1.id, "r1");
        assert_eq!(r1.role, Some(DeviceRole::Cadet));
        assert!(r1.infected);
        assert_eq!(r1.proximity_mask, ProximityMask::Decoded(vec![true, false, false]));

        let r2 = &record.readings[1];
        assert_eq!(r2.role, Some(DeviceRole::Sector));
        assert!(!r2.infected);

        let r3 = &record.readings[2];
        assert_eq!(r3.role, None);
        assert!(r3.infected);
        assert_eq!(r3.timestamp, Utc.with_ymd_and_hms(2024, 3, 5, 10, 3, 0).unwrap());
    }

    #[test]
    fn test_explicit_kind_wins_over_prefix() {
        let record = ingest(started(
            json!({
                "r1": { "device_id": "S01", "kind": "sector", "infection_status": 0, "proximity_mask": "[]", "timestamp": "2024-03-05T10:01:00Z" },
                "r2": { "device_id": "T01", "role": "drone", "infection_status": 0, "proximity_mask": "[]", "timestamp": "2024-03-05T10:01:00Z" }
            }),
            json!({}),
        ))
        .unwrap();
        assert_eq!(record.readings[0].role, Some(DeviceRole::Sector));
        // Unknown kind falls back to the prefix table.
        assert_eq!(record.readings[1].role, Some(DeviceRole::Sector));
    }

    #[test]
    fn test_custom_prefixes() {
        let options = IngestOptions {
            role_prefixes: RolePrefixes::new("badge-", "beacon-").unwrap(),
        };
        let value = started(
            json!({
                "r1": { "device_id": "badge-4", "infection_status": 0, "proximity_mask": "[]", "timestamp": "2024-03-05T10:01:00Z" },
                "r2": { "device_id": "S01", "infection_status": 0, "proximity_mask": "[]", "timestamp": "2024-03-05T10:01:00Z" }
            }),
            json!({}),
        );
        let record = ingest_session(&value, &options).unwrap();
        assert_eq!(record.readings[0].role, Some(DeviceRole::Cadet));
        assert_eq!(record.readings[1].role, None);
    }

    #[test]
    fn test_malformed_mask_is_kept_as_malformed() {
        let record = ingest(started(
            json!({
                "r1": { "device_id": "S01", "infection_status": 0, "proximity_mask": "[1,0", "timestamp": "2024-03-05T10:01:00Z" },
                "r2": { "device_id": "S02", "infection_status": 0, "timestamp": "2024-03-05T10:02:00Z" }
            }),
            json!({}),
        ))
        .unwrap();
        assert!(matches!(record.readings[0].proximity_mask, ProximityMask::Malformed(_)));
        assert!(matches!(record.readings[1].proximity_mask, ProximityMask::Malformed(_)));
    }

    #[test]
    fn test_readings_with_bad_timestamp_or_device_are_dropped() {
        let record = ingest(started(
            json!({
                "r1": { "device_id": "S01", "infection_status": 0, "proximity_mask": "[]", "timestamp": "yesterday" },
                "r2": { "infection_status": 0, "proximity_mask": "[]", "timestamp": "2024-03-05T10:02:00Z" },
                "r3": "not a reading",
                "r4": { "device_id": "S02", "infection_status": 0, "proximity_mask": "[]", "timestamp": "2024-03-05T10:03:00Z" }
            }),
            json!({}),
        ))
        .unwrap();
        let ids: Vec<&str> = record.readings.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r4"]);
    }

    #[test]
    fn test_readings_keep_document_order() {
        let raw = r#"{
            "metadata": { "start": { "timestamp": "2024-03-05T10:00:00Z", "cadets": 2, "sectors": 1 } },
            "readings": {
                "-Nb": { "device_id": "S01", "infection_status": 0, "proximity_mask": "[]", "timestamp": "2024-03-05T10:00:00Z" },
                "-Na": { "device_id": "S02", "infection_status": 0, "proximity_mask": "[]", "timestamp": "2024-03-05T10:00:00Z" },
                "-Nc": { "device_id": "T01", "infection_status": 0, "proximity_mask": "[]", "timestamp": "2024-03-05T10:00:00Z" }
            }
        }"#;
        let record = ingest(serde_json::from_str(raw).unwrap()).unwrap();
        let ids: Vec<&str> = record.readings.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["-Nb", "-Na", "-Nc"]);
    }

    // ── Meetings ──────────────────────────────────────────────────────────────

    #[test]
    fn test_meetings_parsed_and_invalid_dropped() {
        let record = ingest(started(
            json!({}),
            json!({
                "m1": { "startTime": "2024-03-05T10:05:00Z", "endTime": "2024-03-05T10:10:00Z" },
                "m2": { "start": "2024-03-05T10:20:00Z", "end": "2024-03-05T10:25:00Z" },
                "m3": { "startTime": "2024-03-05T10:30:00Z", "endTime": "2024-03-05T10:29:00Z" },
                "m4": { "startTime": "soon" }
            }),
        ))
        .unwrap();
        let ids: Vec<&str> = record.meetings.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(
            record.meetings[0].end,
            Utc.with_ymd_and_hms(2024, 3, 5, 10, 10, 0).unwrap()
        );
    }
}
