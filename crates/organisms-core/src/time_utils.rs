use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::warn;

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

// ── TimezoneHandler ───────────────────────────────────────────────────────────

/// Renders telemetry instants in the classroom's local time.
pub struct TimezoneHandler {
    tz: Tz,
}

impl TimezoneHandler {
    /// Create a handler for an IANA timezone name, or `"auto"` for the
    /// system timezone.
    ///
    /// Unrecognised names fall back to UTC with a warning.
    pub fn new(tz_name: &str) -> Self {
        let resolved = if tz_name == "auto" {
            get_system_timezone()
        } else {
            tz_name.to_string()
        };
        let tz = resolved.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                "TimezoneHandler: unrecognised timezone \"{}\", falling back to UTC",
                resolved
            );
            Tz::UTC
        });
        Self { tz }
    }

    /// Validate that `tz_name` is a recognised IANA timezone identifier.
    pub fn validate_timezone(tz_name: &str) -> bool {
        tz_name.parse::<Tz>().is_ok()
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn to_local(&self, dt: DateTime<Utc>) -> DateTime<Tz> {
        dt.with_timezone(&self.tz)
    }

    /// Wall-clock time as used on chart time axes, e.g. `"14:05:09"`.
    pub fn format_clock(&self, dt: DateTime<Utc>) -> String {
        self.to_local(dt).format("%H:%M:%S").to_string()
    }

    /// Date, time and zone abbreviation, e.g. `"2024-03-05 09:00:00 EST"`.
    pub fn format_full(&self, dt: DateTime<Utc>) -> String {
        self.to_local(dt).format("%Y-%m-%d %H:%M:%S %Z").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone as _, Timelike};

    #[test]
    fn test_validate_timezone() {
        assert!(TimezoneHandler::validate_timezone("America/New_York"));
        assert!(TimezoneHandler::validate_timezone("UTC"));
        assert!(!TimezoneHandler::validate_timezone("Mars/Olympus"));
        assert!(!TimezoneHandler::validate_timezone(""));
    }

    #[test]
    fn test_invalid_timezone_falls_back_to_utc() {
        let handler = TimezoneHandler::new("Invalid/Timezone");
        assert_eq!(handler.timezone(), Tz::UTC);
    }

    #[test]
    fn test_to_local_shifts_hour() {
        let handler = TimezoneHandler::new("America/New_York");
        let utc = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        // EDT is UTC-4.
        assert_eq!(handler.to_local(utc).hour(), 8);
    }

    #[test]
    fn test_format_clock() {
        let handler = TimezoneHandler::new("Europe/Berlin");
        let utc = Utc.with_ymd_and_hms(2024, 1, 15, 9, 5, 3).unwrap();
        assert_eq!(handler.format_clock(utc), "10:05:03");
    }

    #[test]
    fn test_format_full_includes_zone() {
        let handler = TimezoneHandler::new("America/New_York");
        let utc = Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap();
        assert_eq!(handler.format_full(utc), "2024-03-05 09:00:00 EST");
    }

    #[test]
    fn test_auto_resolves_to_some_zone() {
        let handler = TimezoneHandler::new("auto");
        let utc = Utc.with_ymd_and_hms(2024, 3, 5, 14, 0, 0).unwrap();
        assert!(!handler.format_clock(utc).is_empty());
    }

    #[test]
    fn test_get_system_timezone_returns_nonempty_string() {
        assert!(!get_system_timezone().is_empty());
    }
}
