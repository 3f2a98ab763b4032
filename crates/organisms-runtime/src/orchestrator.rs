//! Push-driven aggregation orchestrator.
//!
//! Snapshots arrive on an `mpsc` channel, either pushed by an external source
//! or by the file poller spawned from [`TelemetryOrchestrator::start_watching`].
//! Each snapshot is validated, ingested and aggregated from scratch, and the
//! resulting [`TelemetryUpdate`] is sent on a second channel so consumers
//! never share mutable state with the pipeline.

use std::time::Duration;

use organisms_core::models::AggregatedTelemetryPoint;
use organisms_core::session_status::SessionStatus;
use organisms_data::aggregator::AggregationReport;
use organisms_data::analysis::{analyze_snapshot, AnalysisOptions, TelemetrySummary};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tokio::time;

use crate::session_monitor::SessionMonitor;
use crate::snapshot_feed::SnapshotFeed;
use crate::store::FileSessionStore;

/// Capacity of both the snapshot and the update channels.
const CHANNEL_CAPACITY: usize = 16;

// ── Public types ──────────────────────────────────────────────────────────────

/// One aggregation result forwarded to consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryUpdate {
    pub session_id: String,
    pub status: SessionStatus,
    pub points: Vec<AggregatedTelemetryPoint>,
    pub report: AggregationReport,
    pub summary: Option<TelemetrySummary>,
}

// ── TelemetryOrchestrator ─────────────────────────────────────────────────────

/// Background aggregation coordinator for one session.
pub struct TelemetryOrchestrator {
    session_id: String,
    options: AnalysisOptions,
    /// How often the file poller checks the store for changes.
    poll_interval: Duration,
}

impl TelemetryOrchestrator {
    pub fn new(session_id: impl Into<String>, options: AnalysisOptions, poll_interval_secs: u64) -> Self {
        Self {
            session_id: session_id.into(),
            options,
            poll_interval: Duration::from_secs(poll_interval_secs),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Aggregate every snapshot received on `source`.
    ///
    /// Returns the update receiver and a [`TelemetryHandle`]. The task exits
    /// when `source` is closed or the update receiver is dropped.
    pub fn start_from_source(
        self,
        source: mpsc::Receiver<Value>,
    ) -> (mpsc::Receiver<TelemetryUpdate>, TelemetryHandle) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let handle = tokio::spawn(async move {
            self.aggregation_loop(source, tx).await;
        });

        (rx, TelemetryHandle { handles: vec![handle] })
    }

    /// Watch the session's document in `store` and aggregate every change.
    ///
    /// Spawns a poller that reads the document immediately, then once per
    /// poll interval, and pushes changed snapshots into
    /// [`start_from_source`](Self::start_from_source).
    pub fn start_watching(
        self,
        store: FileSessionStore,
    ) -> (mpsc::Receiver<TelemetryUpdate>, TelemetryHandle) {
        let (source_tx, source_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let feed = SnapshotFeed::new(store, self.session_id.clone());
        let poll_interval = self.poll_interval;

        let poller = tokio::spawn(async move {
            poll_loop(feed, poll_interval, source_tx).await;
        });

        let (rx, mut handle) = self.start_from_source(source_rx);
        handle.handles.push(poller);
        (rx, handle)
    }

    // ── Private implementation ────────────────────────────────────────────

    async fn aggregation_loop(self, mut source: mpsc::Receiver<Value>, tx: mpsc::Sender<TelemetryUpdate>) {
        let mut monitor = SessionMonitor::new();

        while let Some(mut snapshot) = source.recv().await {
            // Only the newest queued snapshot matters.
            while let Ok(newer) = source.try_recv() {
                snapshot = newer;
            }

            let Some(update) = self.process(&mut monitor, &snapshot) else {
                continue;
            };

            if let Err(e) = tx.send(update).await {
                tracing::debug!(error = %e, "update receiver dropped; exiting loop");
                break;
            }
        }

        tracing::debug!(session_id = %self.session_id, "aggregation loop finished");
    }

    fn process(&self, monitor: &mut SessionMonitor, snapshot: &Value) -> Option<TelemetryUpdate> {
        let (is_valid, errors) = monitor.update(&self.session_id, snapshot);
        if !is_valid {
            tracing::warn!(session_id = %self.session_id, ?errors, "skipping malformed snapshot");
            return None;
        }

        match analyze_snapshot(snapshot, &self.options) {
            Ok(result) => Some(TelemetryUpdate {
                session_id: self.session_id.clone(),
                status: result.status,
                points: result.points,
                report: result.report,
                summary: result.summary,
            }),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, error = %e, "skipping snapshot that failed analysis");
                None
            }
        }
    }
}

/// Push the document once immediately, then every changed version.
async fn poll_loop(feed: SnapshotFeed, poll_interval: Duration, tx: mpsc::Sender<Value>) {
    let Some((mut feed, snapshot)) = poll_off_runtime(feed, true).await else {
        return;
    };
    if let Some(snapshot) = snapshot {
        if tx.send(snapshot).await.is_err() {
            return;
        }
    }

    let mut interval = time::interval(poll_interval);
    // The first tick fires immediately; the initial read already happened.
    interval.tick().await;

    loop {
        interval.tick().await;

        if tx.is_closed() {
            tracing::debug!("snapshot channel closed; exiting poller");
            break;
        }

        let Some((next, snapshot)) = poll_off_runtime(feed, false).await else {
            break;
        };
        feed = next;

        if let Some(snapshot) = snapshot {
            if tx.send(snapshot).await.is_err() {
                break;
            }
        }
    }
}

/// Run one [`SnapshotFeed::poll`] on the blocking pool.
///
/// File reads and retry back-off sleep synchronously, so they must not
/// run on a runtime worker. Returns `None` if the blocking task panicked.
async fn poll_off_runtime(mut feed: SnapshotFeed, force: bool) -> Option<(SnapshotFeed, Option<Value>)> {
    let result = task::spawn_blocking(move || {
        let snapshot = feed.poll(force);
        (feed, snapshot)
    })
    .await;

    match result {
        Ok(polled) => Some(polled),
        Err(e) => {
            tracing::error!(error = %e, "snapshot poll task failed; exiting poller");
            None
        }
    }
}

// ── TelemetryHandle ───────────────────────────────────────────────────────────

/// Handle to the background tasks of an orchestrator.
pub struct TelemetryHandle {
    handles: Vec<JoinHandle<()>>,
}

impl TelemetryHandle {
    /// Immediately abort every task.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use organisms_core::models::MaskPolicy;
    use serde_json::json;

    // ── helpers ───────────────────────────────────────────────────────────

    fn snapshot(readings: Value) -> Value {
        json!({
            "metadata": {
                "start": { "action": "start", "timestamp": "2024-03-05T10:00:00Z", "cadets": 2, "sectors": 1 }
            },
            "readings": readings,
            "meetings": {}
        })
    }

    fn reading(device: &str, infected: u8, minute: u32) -> Value {
        json!({
            "device_id": device,
            "infection_status": infected,
            "proximity_mask": "[0,0,0]",
            "timestamp": format!("2024-03-05T10:{minute:02}:00Z"),
        })
    }

    async fn next(rx: &mut mpsc::Receiver<TelemetryUpdate>) -> TelemetryUpdate {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for update")
            .expect("channel closed before receiving update")
    }

    // ── orchestrator creation ─────────────────────────────────────────────

    #[test]
    fn test_orchestrator_creation() {
        let orch = TelemetryOrchestrator::new("20240305_1", AnalysisOptions::default(), 5);
        assert_eq!(orch.poll_interval, Duration::from_secs(5));
        assert_eq!(orch.session_id(), "20240305_1");
        assert_eq!(orch.options.mask_policy, MaskPolicy::Lenient);
    }

    #[test]
    fn test_update_serializes_camel_case() {
        let update = TelemetryUpdate {
            session_id: "20240305_1".into(),
            status: SessionStatus::Active,
            points: vec![],
            report: AggregationReport::default(),
            summary: None,
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["sessionId"], "20240305_1");
        assert_eq!(value["status"], "active");
        assert!(value["points"].as_array().unwrap().is_empty());
    }

    // ── async: pushed snapshots ───────────────────────────────────────────

    #[tokio::test]
    async fn test_pushed_snapshot_is_aggregated() {
        let (source_tx, source_rx) = mpsc::channel(4);
        let orch = TelemetryOrchestrator::new("20240305_1", AnalysisOptions::default(), 60);
        let (mut rx, handle) = orch.start_from_source(source_rx);

        let readings = json!({ "r1": reading("S01", 1, 1), "r2": reading("T01", 0, 2) });
        source_tx.send(snapshot(readings)).await.unwrap();

        let update = next(&mut rx).await;
        assert_eq!(update.session_id, "20240305_1");
        assert_eq!(update.status, SessionStatus::Active);
        assert_eq!(update.points.len(), 2);
        assert_eq!(update.points[1].infected_cadets, 1);
        assert!(update.summary.is_some());

        handle.abort();
    }

    #[tokio::test]
    async fn test_malformed_snapshot_skipped() {
        let (source_tx, source_rx) = mpsc::channel(4);
        let orch = TelemetryOrchestrator::new("20240305_1", AnalysisOptions::default(), 60);
        let (mut rx, handle) = orch.start_from_source(source_rx);

        source_tx.send(json!("not a session")).await.unwrap();
        source_tx.send(json!({ "readings": [1] })).await.unwrap();
        source_tx
            .send(snapshot(json!({ "r1": reading("S01", 0, 1) })))
            .await
            .unwrap();

        let update = next(&mut rx).await;
        assert_eq!(update.points.len(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_loop_ends_when_source_closes() {
        let (source_tx, source_rx) = mpsc::channel(4);
        let orch = TelemetryOrchestrator::new("20240305_1", AnalysisOptions::default(), 60);
        let (mut rx, _handle) = orch.start_from_source(source_rx);

        source_tx.send(snapshot(json!({}))).await.unwrap();
        drop(source_tx);

        let update = next(&mut rx).await;
        assert!(update.points.is_empty());

        let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for close");
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_latest_snapshot_wins() {
        let (source_tx, source_rx) = mpsc::channel(4);
        // Queue both before the task starts so they are coalesced.
        source_tx
            .send(snapshot(json!({ "r1": reading("S01", 0, 1) })))
            .await
            .unwrap();
        source_tx
            .send(snapshot(json!({ "r1": reading("S01", 0, 1), "r2": reading("S02", 0, 2) })))
            .await
            .unwrap();
        drop(source_tx);

        let orch = TelemetryOrchestrator::new("20240305_1", AnalysisOptions::default(), 60);
        let (mut rx, _handle) = orch.start_from_source(source_rx);

        let mut last = next(&mut rx).await;
        while let Some(update) = rx.recv().await {
            last = update;
        }
        assert_eq!(last.points.len(), 2);
    }

    // ── async: file watching ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_watching_sends_initial_snapshot() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let id = store.create_session("alien-invasion", "t1", now).unwrap();

        let orch = TelemetryOrchestrator::new(id.clone(), AnalysisOptions::default(), 60);
        let (mut rx, handle) = orch.start_watching(store);

        let update = next(&mut rx).await;
        assert_eq!(update.session_id, id);
        assert_eq!(update.status, SessionStatus::Inactive);
        assert!(update.points.is_empty());

        handle.abort();
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_watching_missing_session_keeps_runtime_responsive() {
        // Reads of a missing document back off for 300 ms in total.
        let dir = tempfile::TempDir::new().unwrap();
        let orch = TelemetryOrchestrator::new("20240305_1", AnalysisOptions::default(), 60);
        let started = std::time::Instant::now();
        let (_rx, handle) = orch.start_watching(FileSessionStore::new(dir.path()));

        // Let the poller begin its first read on the single worker.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(
            started.elapsed() < Duration::from_millis(250),
            "runtime was blocked for {:?}",
            started.elapsed()
        );

        handle.abort();
    }

    #[tokio::test]
    async fn test_watching_picks_up_changes() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path());
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();
        let id = store.create_session("alien-invasion", "t1", now).unwrap();

        let orch = TelemetryOrchestrator::new(id.clone(), AnalysisOptions::default(), 1);
        let (mut rx, handle) = orch.start_watching(store.clone());
        assert!(next(&mut rx).await.points.is_empty());

        store
            .write_snapshot(&id, &snapshot(json!({ "r1": reading("S01", 1, 1) })))
            .unwrap();
        let update = next(&mut rx).await;
        assert_eq!(update.status, SessionStatus::Active);
        assert_eq!(update.points.len(), 1);

        handle.abort();
    }

    #[tokio::test]
    async fn test_watching_start_and_abort() {
        let dir = tempfile::TempDir::new().unwrap();
        let orch = TelemetryOrchestrator::new("20240305_1", AnalysisOptions::default(), 60);
        let (_rx, handle) = orch.start_watching(FileSessionStore::new(dir.path()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();
    }
}
