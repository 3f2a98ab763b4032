use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

// ── TimestampProcessor ────────────────────────────────────────────────────────

/// Parses the timestamp shapes written by devices and the teacher dashboard.
pub struct TimestampProcessor;

impl TimestampProcessor {
    /// Attempt to parse a [`serde_json::Value`] into a UTC [`DateTime`].
    ///
    /// Handles:
    /// * `null`       → `None`
    /// * JSON string  → RFC 3339 (including `Z`-suffix) or common
    ///   date-time patterns, interpreted as UTC when no offset is given.
    /// * JSON number  → Unix timestamp in seconds, or milliseconds when the
    ///   value is too large to be seconds.
    pub fn parse(value: &Value) -> Option<DateTime<Utc>> {
        match value {
            Value::Null => None,
            Value::String(s) => Self::parse_str(s.as_str()),
            Value::Number(n) => {
                if let Some(raw) = n.as_i64() {
                    if raw.abs() >= MILLIS_THRESHOLD {
                        DateTime::from_timestamp_millis(raw)
                    } else {
                        DateTime::from_timestamp(raw, 0)
                    }
                } else if let Some(f) = n.as_f64() {
                    let secs = f.trunc() as i64;
                    let nanos = (f.fract() * 1_000_000_000.0).round() as u32;
                    DateTime::from_timestamp(secs, nanos)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Parse a timestamp string. See [`TimestampProcessor::parse`].
    pub fn parse_str(s: &str) -> Option<DateTime<Utc>> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&Utc));
        }

        const FORMATS: &[&str] = &[
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S",
        ];

        for fmt in FORMATS {
            if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
                return Some(Utc.from_utc_datetime(&naive));
            }
        }

        warn!(
            "TimestampProcessor: could not parse timestamp string \"{}\"",
            s
        );
        None
    }
}

/// Integers at or above this magnitude are read as epoch milliseconds
/// (roughly the year 5138 when read as seconds).
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

// ── MaskDecoder ───────────────────────────────────────────────────────────────

/// Decodes proximity masks.
///
/// Devices upload the mask as a JSON-encoded string such as `"[1,0,0,1]"`;
/// hand-written fixtures sometimes inline the array. Both shapes are accepted.
pub struct MaskDecoder;

impl MaskDecoder {
    /// Decode `value` into a flag vector, or explain why it cannot be decoded.
    pub fn decode(value: &Value) -> Result<Vec<bool>, String> {
        match value {
            Value::String(encoded) => {
                let inner: Value = serde_json::from_str(encoded)
                    .map_err(|e| format!("mask is not valid JSON: {e}"))?;
                match inner {
                    Value::Array(items) => Self::decode_items(&items),
                    other => Err(format!("encoded mask is not an array: {other}")),
                }
            }
            Value::Array(items) => Self::decode_items(items),
            Value::Null => Err("mask is missing".to_string()),
            other => Err(format!("mask has unsupported type: {other}")),
        }
    }

    fn decode_items(items: &[Value]) -> Result<Vec<bool>, String> {
        items
            .iter()
            .enumerate()
            .map(|(idx, item)| match item {
                Value::Bool(b) => Ok(*b),
                Value::Number(n) => match n.as_f64() {
                    Some(f) => Ok(f != 0.0),
                    None => Err(format!("mask position {idx} is not a number")),
                },
                other => Err(format!("mask position {idx} is not a flag: {other}")),
            })
            .collect()
    }
}

// ── InfectionFlag ─────────────────────────────────────────────────────────────

/// Interprets the boolean-like `infection_status` field.
pub struct InfectionFlag;

impl InfectionFlag {
    /// Only `1`, `true`, and `"1"` / `"true"` mean infected.
    pub fn is_infected(value: &Value) -> bool {
        match value {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_i64() == Some(1) || n.as_f64() == Some(1.0),
            Value::String(s) => matches!(s.trim(), "1" | "true"),
            _ => false,
        }
    }
}
