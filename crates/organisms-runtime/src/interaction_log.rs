//! Sinks for user-interaction events.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use organisms_core::error::{OrganismsError, Result};
use organisms_core::events::{create_batch_timestamp, UserInteractionEvent};
use serde_json::{json, Value};

/// Who produced an event and within which session batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionContext {
    pub user_id: String,
    pub session_id: Option<String>,
    pub game_id: String,
    pub batch_timestamp: String,
}

impl InteractionContext {
    pub fn new(
        user_id: impl Into<String>,
        session_id: Option<String>,
        game_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id,
            game_id: game_id.into(),
            batch_timestamp: create_batch_timestamp(now),
        }
    }
}

pub trait InteractionLogger {
    fn log(&mut self, event: &UserInteractionEvent) -> Result<()>;
}

// ── TracingLogger ─────────────────────────────────────────────────────────────

/// Emits every event as an `info!` record.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl InteractionLogger for TracingLogger {
    fn log(&mut self, event: &UserInteractionEvent) -> Result<()> {
        tracing::info!(
            event_type = event.event_type(),
            action = %event.action(),
            details = %event.details(),
            "user interaction"
        );
        Ok(())
    }
}

// ── JsonlLogger ───────────────────────────────────────────────────────────────

/// Appends one enriched JSON record per event to a file.
#[derive(Debug)]
pub struct JsonlLogger {
    path: PathBuf,
    context: InteractionContext,
}

impl JsonlLogger {
    pub fn new(path: impl Into<PathBuf>, context: InteractionContext) -> Self {
        Self {
            path: path.into(),
            context,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build the stored record for `event` at `now`.
    pub fn record(&self, event: &UserInteractionEvent, now: DateTime<Utc>) -> Value {
        let mut record = json!({
            "userId": self.context.user_id,
            "sessionId": self.context.session_id,
            "gameId": self.context.game_id,
            "batchTimestamp": self.context.batch_timestamp,
            "timestamp": now.to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        if let (Some(record), Value::Object(event)) = (record.as_object_mut(), event.to_value()) {
            record.extend(event);
        }
        record
    }

    fn append(&self, line: &str) -> Result<()> {
        let write_err = |source| OrganismsError::FileWrite {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        writeln!(file, "{line}").map_err(write_err)
    }
}

impl InteractionLogger for JsonlLogger {
    fn log(&mut self, event: &UserInteractionEvent) -> Result<()> {
        let record = self.record(event, Utc::now());
        self.append(&record.to_string())?;
        tracing::debug!(path = %self.path.display(), event_type = event.event_type(), "interaction logged");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
