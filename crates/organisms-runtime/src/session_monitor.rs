//! Lifecycle tracking and structural validation for session snapshots.
//!
//! [`SessionMonitor`] receives every raw snapshot the runtime observes,
//! validates its top-level shape, derives the lifecycle status and records
//! each status transition.

use organisms_core::session_status::SessionStatus;
use organisms_data::reader::ingest_metadata;
use serde_json::Value;

// ── Public types ──────────────────────────────────────────────────────────────

/// One observed change of lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub session_id: String,
    /// `None` for the first observation of a session.
    pub from: Option<SessionStatus>,
    pub to: SessionStatus,
}

// ── SessionMonitor ────────────────────────────────────────────────────────────

/// Tracks the lifecycle status of the observed session.
///
/// Call [`SessionMonitor::update`] on every snapshot. Switching to a different
/// session id starts a fresh observation, recorded with `from: None`.
pub struct SessionMonitor {
    current_session_id: Option<String>,
    current_status: Option<SessionStatus>,
    history: Vec<StatusTransition>,
}

impl SessionMonitor {
    pub fn new() -> Self {
        Self {
            current_session_id: None,
            current_status: None,
            history: Vec::new(),
        }
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Update tracking with a fresh snapshot of `session_id`.
    ///
    /// Returns `(is_valid, errors)`. Invalid snapshots leave the tracked
    /// status untouched.
    pub fn update(&mut self, session_id: &str, data: &Value) -> (bool, Vec<String>) {
        let (is_valid, mut errors) = self.validate_data(data);
        if !is_valid {
            return (false, errors);
        }

        let metadata = match ingest_metadata(data) {
            Ok(metadata) => metadata,
            Err(e) => {
                errors.push(e.to_string());
                return (false, errors);
            }
        };
        let status = SessionStatus::derive(&metadata);

        let same_session = self.current_session_id.as_deref() == Some(session_id);
        let from = if same_session { self.current_status } else { None };

        if from != Some(status) {
            self.on_transition(session_id, from, status);
        }

        self.current_session_id = Some(session_id.to_string());
        self.current_status = Some(status);
        (true, errors)
    }

    /// Validate the top-level structure of a snapshot.
    ///
    /// Checks:
    /// - `data` is a JSON object.
    /// - `metadata`, `readings` and `meetings` are objects when present.
    /// - `metadata.start` is an object when present.
    pub fn validate_data(&self, data: &Value) -> (bool, Vec<String>) {
        let mut errors = Vec::new();

        let root = match data.as_object() {
            Some(root) => root,
            None => {
                errors.push("data must be a JSON object".to_string());
                return (false, errors);
            }
        };

        for key in ["metadata", "readings", "meetings"] {
            match root.get(key) {
                None | Some(Value::Null) | Some(Value::Object(_)) => {}
                Some(_) => errors.push(format!("field '{key}' must be an object")),
            }
        }

        if let Some(start) = root.get("metadata").and_then(|m| m.get("start")) {
            if !(start.is_object() || start.is_null()) {
                errors.push("field 'metadata.start' must be an object".to_string());
            }
        }

        let is_valid = errors.is_empty();
        (is_valid, errors)
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.current_session_id.as_deref()
    }

    /// Status derived from the last valid snapshot, or `None` before any.
    pub fn current_status(&self) -> Option<SessionStatus> {
        self.current_status
    }

    /// Ordered log of every recorded transition.
    pub fn history(&self) -> &[StatusTransition] {
        &self.history
    }

    pub fn transition_count(&self) -> usize {
        self.history.len()
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn on_transition(&mut self, session_id: &str, from: Option<SessionStatus>, to: SessionStatus) {
        tracing::info!(
            session_id,
            from = from.map(SessionStatus::as_str).unwrap_or("unobserved"),
            to = to.as_str(),
            "session status changed"
        );
        self.history.push(StatusTransition {
            session_id: session_id.to_string(),
            from,
            to,
        });
    }
}

impl Default for SessionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── helpers ───────────────────────────────────────────────────────────

    fn started() -> Value {
        json!({
            "metadata": {
                "start": { "action": "start", "timestamp": "2024-03-05T10:00:00Z", "cadets": 4, "sectors": 2 }
            },
            "readings": {},
            "meetings": {}
        })
    }

    fn with_event(mut data: Value, action: &str, timestamp: &str) -> Value {
        data["metadata"][action] = json!({ "action": action, "timestamp": timestamp });
        data
    }

    // ── validate_data ─────────────────────────────────────────────────────

    #[test]
    fn test_validate_valid_data() {
        let monitor = SessionMonitor::new();
        let (is_valid, errors) = monitor.validate_data(&started());
        assert!(is_valid, "expected valid, errors: {errors:?}");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_validate_empty_object() {
        let monitor = SessionMonitor::new();
        let (is_valid, errors) = monitor.validate_data(&json!({}));
        assert!(is_valid, "errors: {errors:?}");
    }

    #[test]
    fn test_validate_non_object_data() {
        let monitor = SessionMonitor::new();
        let (is_valid, errors) = monitor.validate_data(&json!([1, 2, 3]));
        assert!(!is_valid);
        assert!(errors.iter().any(|e| e.contains("object")));
    }

    #[test]
    fn test_validate_sections_wrong_types() {
        let monitor = SessionMonitor::new();
        let data = json!({
            "metadata": "none",
            "readings": [1, 2],
            "meetings": 3
        });
        let (is_valid, errors) = monitor.validate_data(&data);
        assert!(!is_valid);
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("metadata")));
        assert!(errors.iter().any(|e| e.contains("readings")));
        assert!(errors.iter().any(|e| e.contains("meetings")));
    }

    #[test]
    fn test_validate_start_wrong_type() {
        let monitor = SessionMonitor::new();
        let data = json!({ "metadata": { "start": "2024-03-05T10:00:00Z" } });
        let (is_valid, errors) = monitor.validate_data(&data);
        assert!(!is_valid);
        assert!(errors.iter().any(|e| e.contains("metadata.start")));
    }

    // ── update ────────────────────────────────────────────────────────────

    #[test]
    fn test_first_observation() {
        let mut monitor = SessionMonitor::new();
        assert!(monitor.current_status().is_none());

        let (is_valid, _) = monitor.update("20240305_1", &started());
        assert!(is_valid);
        assert_eq!(monitor.current_session_id(), Some("20240305_1"));
        assert_eq!(monitor.current_status(), Some(SessionStatus::Active));
        assert_eq!(monitor.history()[0].from, None);
        assert_eq!(monitor.transition_count(), 1);
    }

    #[test]
    fn test_unstarted_session_is_inactive() {
        let mut monitor = SessionMonitor::new();
        monitor.update("20240305_1", &json!({ "metadata": { "gameId": "g" } }));
        assert_eq!(monitor.current_status(), Some(SessionStatus::Inactive));
    }

    #[test]
    fn test_pause_resume_stop_transitions() {
        let mut monitor = SessionMonitor::new();
        let id = "20240305_1";

        let data = started();
        monitor.update(id, &data);
        let data = with_event(data, "pause", "2024-03-05T10:10:00Z");
        monitor.update(id, &data);
        let data = with_event(data, "resume", "2024-03-05T10:20:00Z");
        monitor.update(id, &data);
        let data = with_event(data, "stop", "2024-03-05T10:30:00Z");
        monitor.update(id, &data);

        let to: Vec<_> = monitor.history().iter().map(|t| t.to).collect();
        assert_eq!(
            to,
            vec![
                SessionStatus::Active,
                SessionStatus::Paused,
                SessionStatus::Active,
                SessionStatus::Inactive
            ]
        );
        assert_eq!(monitor.history()[1].from, Some(SessionStatus::Active));
    }

    #[test]
    fn test_no_duplicate_transition_for_unchanged_status() {
        let mut monitor = SessionMonitor::new();
        for _ in 0..3 {
            monitor.update("20240305_1", &started());
        }
        assert_eq!(monitor.transition_count(), 1);
    }

    #[test]
    fn test_session_switch_starts_fresh_observation() {
        let mut monitor = SessionMonitor::new();
        monitor.update("20240305_1", &started());
        monitor.update("20240305_2", &started());

        assert_eq!(monitor.transition_count(), 2);
        let last = &monitor.history()[1];
        assert_eq!(last.session_id, "20240305_2");
        assert_eq!(last.from, None);
    }

    #[test]
    fn test_invalid_update_keeps_state() {
        let mut monitor = SessionMonitor::new();
        monitor.update("20240305_1", &started());

        let (is_valid, errors) = monitor.update("20240305_1", &json!("garbage"));
        assert!(!is_valid);
        assert!(!errors.is_empty());
        assert_eq!(monitor.current_status(), Some(SessionStatus::Active));
        assert_eq!(monitor.transition_count(), 1);
    }

    #[test]
    fn test_start_without_counts_rejected() {
        let mut monitor = SessionMonitor::new();
        let data = json!({ "metadata": { "start": { "timestamp": "2024-03-05T10:00:00Z" } } });
        let (is_valid, errors) = monitor.update("20240305_1", &data);
        assert!(!is_valid);
        assert!(errors.iter().any(|e| e.contains("cadets")));
        assert!(monitor.current_status().is_none());
    }

    #[test]
    fn test_default_is_empty() {
        let monitor = SessionMonitor::default();
        assert!(monitor.current_session_id().is_none());
        assert!(monitor.history().is_empty());
    }
}
