use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{OrganismsError, Result};

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("regex is valid"))
}

fn generated_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d{8})_(\d+)$").expect("regex is valid"))
}

/// Build a session id of the form `YYYYMMDD_<unix millis>` for `now`.
pub fn generate_session_id(now: DateTime<Utc>) -> String {
    format!("{}_{}", now.format("%Y%m%d"), now.timestamp_millis())
}

/// Reject ids that cannot safely be used as a storage key.
pub fn validate_session_id(id: &str) -> Result<()> {
    if id_pattern().is_match(id) {
        Ok(())
    } else {
        Err(OrganismsError::InvalidSessionId(id.to_string()))
    }
}

/// Recover the creation instant of a generated id; `None` for other ids.
pub fn created_at(id: &str) -> Option<DateTime<Utc>> {
    let caps = generated_pattern().captures(id)?;
    let millis: i64 = caps.get(2)?.as_str().parse().ok()?;
    let created = DateTime::from_timestamp_millis(millis)?;
    (created.format("%Y%m%d").to_string() == caps.get(1)?.as_str()).then_some(created)
}
