//! Change-detecting snapshot reader for one session.
//!
//! Wraps [`FileSessionStore::read_snapshot`] with retry and content
//! fingerprinting. Callers use [`SnapshotFeed::poll`] on every tick; it yields
//! a snapshot only when the document changed since the last successful read
//! (or when forced), up to three read attempts with back-off, and keeps the
//! last error for display.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::store::FileSessionStore;

/// Maximum number of read attempts per poll.
const MAX_RETRY_ATTEMPTS: u32 = 3;

// ── SnapshotFeed ──────────────────────────────────────────────────────────────

pub struct SnapshotFeed {
    store: FileSessionStore,
    session_id: String,
    /// Fingerprint of the last snapshot handed out.
    last_fingerprint: Option<u64>,
    /// Human-readable description of the last error encountered.
    last_error: Option<String>,
    /// When the last *successful* read completed.
    last_successful_fetch: Option<Instant>,
}

impl SnapshotFeed {
    pub fn new(store: FileSessionStore, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            last_fingerprint: None,
            last_error: None,
            last_successful_fetch: None,
        }
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Read the session and return it if its content changed.
    ///
    /// With `force` the snapshot is returned even when unchanged. Read
    /// failures return `None` and are kept in [`last_error`](Self::last_error).
    pub fn poll(&mut self, force: bool) -> Option<Value> {
        match self.fetch_with_retry() {
            Ok(snapshot) => {
                self.last_error = None;
                self.last_successful_fetch = Some(Instant::now());

                let fingerprint = fingerprint(&snapshot);
                let changed = self.last_fingerprint != Some(fingerprint);
                self.last_fingerprint = Some(fingerprint);

                if changed || force {
                    tracing::debug!(session_id = %self.session_id, changed, "snapshot ready");
                    Some(snapshot)
                } else {
                    None
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "snapshot read failed");
                self.last_error = Some(e);
                None
            }
        }
    }

    /// Forget the last fingerprint so the next poll yields a snapshot.
    pub fn reset(&mut self) {
        self.last_fingerprint = None;
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Human-readable description of the last read error, or `None`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Time since the last successful read, or `None` if none succeeded yet.
    pub fn since_last_success(&self) -> Option<Duration> {
        self.last_successful_fetch.map(|ts| ts.elapsed())
    }

    // ── Private helpers ───────────────────────────────────────────────────

    /// Back-off schedule: attempt 1 → 0 ms, attempt 2 → 100 ms, attempt 3 → 200 ms.
    fn fetch_with_retry(&self) -> Result<Value, String> {
        let mut last_err = String::new();

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                let sleep_ms = (attempt as u64) * 100;
                tracing::debug!(attempt, sleep_ms, "retrying snapshot read after back-off");
                thread::sleep(Duration::from_millis(sleep_ms));
            }

            match self.store.read_snapshot(&self.session_id) {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "snapshot read attempt failed");
                    last_err = e.to_string();
                }
            }
        }

        Err(last_err)
    }
}

fn fingerprint(snapshot: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    snapshot.to_string().hash(&mut hasher);
    hasher.finish()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
