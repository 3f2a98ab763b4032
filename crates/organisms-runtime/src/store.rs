//! File-backed session document store.
//!
//! Each session is one JSON document `<root>/<session id>.json` shaped like
//! the realtime store's `sessions/<id>` node: `metadata`, `readings`,
//! `meetings` and `journalAnswers`. Every write replaces the whole document
//! atomically (temp file + rename), so readers never see a partial write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use organisms_core::error::{OrganismsError, Result};
use organisms_core::games;
use organisms_core::journal::{self, JournalAnswer, StoredAnswer};
use organisms_core::session_id::{created_at, generate_session_id, validate_session_id};
use organisms_core::session_status::SessionStatus;
use organisms_data::reader::{find_session_files, ingest_metadata, load_session_value};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

// ── Public types ──────────────────────────────────────────────────────────────

/// What a teacher supplies when starting a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartDetails {
    pub class_name: String,
    pub cadets: u32,
    pub sectors: u32,
    /// Teacher identity recorded on the start event; `"Unknown"` when absent.
    pub teacher: Option<String>,
}

/// One row of [`FileSessionStore::list_sessions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub status: SessionStatus,
    pub game_id: Option<String>,
    pub teacher_id: Option<String>,
    pub class_name: Option<String>,
    /// Recovered from generated ids only.
    pub created_at: Option<DateTime<Utc>>,
    /// Created but never started or stopped.
    pub draft: bool,
}

impl SessionSummary {
    /// `draft` for never-started sessions, otherwise the lifecycle status.
    pub fn state(&self) -> &'static str {
        if self.draft {
            "draft"
        } else {
            self.status.as_str()
        }
    }
}

/// Saved journal answers of one player, keyed by round then question id.
pub type PlayerAnswers = BTreeMap<u32, BTreeMap<String, StoredAnswer>>;

// ── FileSessionStore ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.data-organisms/sessions`.
    pub fn default_root() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".data-organisms")
            .join("sessions")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a session document; rejects ids that are not path-safe.
    pub fn path_for(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.root.join(format!("{session_id}.json")))
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Create a draft session with no start or stop event.
    ///
    /// `game_id` must name an enabled game in [`games::GAMES`].
    pub fn create_session(&self, game_id: &str, teacher_id: &str, now: DateTime<Utc>) -> Result<String> {
        let game = games::enabled_game(game_id)?;
        let session_id = generate_session_id(now);
        let path = self.path_for(&session_id)?;
        if path.exists() {
            return Err(OrganismsError::Config(format!(
                "session {session_id} already exists"
            )));
        }

        let document = json!({
            "metadata": {
                "start": null,
                "stop": null,
                "teacherId": teacher_id,
                "gameId": game.id,
            }
        });
        write_atomic(&path, &document)?;

        info!(session_id = %session_id, game = game.name, "Session created");
        Ok(session_id)
    }

    /// Record the start event and clear any previous stop.
    pub fn start_session(&self, session_id: &str, details: &StartDetails, now: DateTime<Utc>) -> Result<()> {
        self.update_metadata(session_id, |metadata| {
            metadata.insert(
                "start".to_string(),
                json!({
                    "action": "start",
                    "teacher": details.teacher.as_deref().unwrap_or("Unknown"),
                    "class": details.class_name,
                    "cadets": details.cadets,
                    "sectors": details.sectors,
                    "timestamp": timestamp(now),
                }),
            );
            metadata.insert("stop".to_string(), Value::Null);
        })?;
        info!(session_id, cadets = details.cadets, sectors = details.sectors, "Session started");
        Ok(())
    }

    pub fn stop_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.record_event(session_id, "stop", now)?;
        info!(session_id, "Session stopped");
        Ok(())
    }

    pub fn pause_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.record_event(session_id, "pause", now)?;
        info!(session_id, "Session paused");
        Ok(())
    }

    pub fn resume_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.record_event(session_id, "resume", now)?;
        info!(session_id, "Session resumed");
        Ok(())
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    /// The whole session document.
    pub fn read_snapshot(&self, session_id: &str) -> Result<Value> {
        let path = self.path_for(session_id)?;
        if !path.exists() {
            return Err(OrganismsError::SessionNotFound(session_id.to_string()));
        }
        load_session_value(&path)
    }

    /// Replace the whole session document.
    pub fn write_snapshot(&self, session_id: &str, document: &Value) -> Result<()> {
        let path = self.path_for(session_id)?;
        write_atomic(&path, document)
    }

    /// Sessions in the store, sorted by id. Unreadable documents are skipped.
    ///
    /// With `teacher` set, only sessions whose `teacherId` matches are listed.
    pub fn list_sessions(&self, teacher: Option<&str>) -> Result<Vec<SessionSummary>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for path in find_session_files(&self.root) {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if validate_session_id(&id).is_err() {
                debug!(path = %path.display(), "Skipping file with non-session name");
                continue;
            }

            let metadata = match load_session_value(&path).and_then(|v| ingest_metadata(&v)) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(session_id = %id, error = %e, "Skipping unreadable session");
                    continue;
                }
            };

            if teacher.is_some() && metadata.teacher_id.as_deref() != teacher {
                continue;
            }

            sessions.push(SessionSummary {
                status: SessionStatus::derive(&metadata),
                draft: metadata.start.is_none() && metadata.stop.is_none(),
                game_id: metadata.game_id.clone(),
                teacher_id: metadata.teacher_id.clone(),
                class_name: metadata.start.as_ref().and_then(|s| s.class_name.clone()),
                created_at: created_at(&id),
                id,
            });
        }

        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }

    // ── Journal ───────────────────────────────────────────────────────────

    /// Replace `player`'s answers for `round` with `answers`.
    pub fn save_journal_round(
        &self,
        session_id: &str,
        player: &str,
        round: u32,
        answers: &[JournalAnswer],
        now: DateTime<Utc>,
    ) -> Result<()> {
        validate_player(player)?;
        let catalogue = journal::round(round)
            .ok_or_else(|| OrganismsError::Config(format!("unknown journal round {round}")))?;
        if let Some(unknown) = answers.iter().find(|a| catalogue.question(&a.question_id).is_none()) {
            return Err(OrganismsError::Config(format!(
                "question {} is not part of round {round}",
                unknown.question_id
            )));
        }

        let payload: Map<String, Value> = answers
            .iter()
            .map(|a| -> Result<(String, Value)> {
                let stored = StoredAnswer {
                    answer: a.answer.clone(),
                    updated_at: now.timestamp_millis(),
                };
                Ok((a.question_id.clone(), serde_json::to_value(stored)?))
            })
            .collect::<Result<_>>()?;

        let mut document = self.read_object(session_id)?;
        edit_object(&mut document, "journalAnswers", |players| {
            edit_object(players, player, |rounds| {
                rounds.insert(round.to_string(), Value::Object(payload));
            })
        });

        self.write_snapshot(session_id, &Value::Object(document))?;
        debug!(session_id, player, round, answers = answers.len(), "Journal round saved");
        Ok(())
    }

    /// Everything `player` has saved in this session; empty when nothing was saved.
    pub fn load_journal_answers(&self, session_id: &str, player: &str) -> Result<PlayerAnswers> {
        validate_player(player)?;
        let document = self.read_snapshot(session_id)?;

        let Some(rounds) = document
            .get("journalAnswers")
            .and_then(|j| j.get(player))
            .and_then(Value::as_object)
        else {
            return Ok(PlayerAnswers::new());
        };

        let mut answers = PlayerAnswers::new();
        for (round_key, questions) in rounds {
            let Ok(round) = round_key.parse::<u32>() else {
                warn!(session_id, player, round = %round_key, "Ignoring non-numeric journal round");
                continue;
            };
            let Some(questions) = questions.as_object() else {
                continue;
            };
            let parsed = questions
                .iter()
                .filter_map(|(qid, stored)| {
                    serde_json::from_value::<StoredAnswer>(stored.clone())
                        .map(|s| (qid.clone(), s))
                        .map_err(|e| warn!(session_id, question = %qid, error = %e, "Ignoring malformed answer"))
                        .ok()
                })
                .collect();
            answers.insert(round, parsed);
        }
        Ok(answers)
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn read_object(&self, session_id: &str) -> Result<Map<String, Value>> {
        match self.read_snapshot(session_id)? {
            Value::Object(map) => Ok(map),
            _ => Err(OrganismsError::InvalidSession(format!(
                "session {session_id} is not a JSON object"
            ))),
        }
    }

    fn update_metadata(&self, session_id: &str, edit: impl FnOnce(&mut Map<String, Value>)) -> Result<()> {
        let mut document = self.read_object(session_id)?;
        edit_object(&mut document, "metadata", edit);
        self.write_snapshot(session_id, &Value::Object(document))
    }

    fn record_event(&self, session_id: &str, action: &str, now: DateTime<Utc>) -> Result<()> {
        self.update_metadata(session_id, |metadata| {
            metadata.insert(
                action.to_string(),
                json!({ "action": action, "timestamp": timestamp(now) }),
            );
        })
    }
}

// ── Free helpers ──────────────────────────────────────────────────────────────

/// RFC 3339 with millisecond precision and a `Z` suffix.
fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Run `edit` on the object stored under `key`, replacing any non-object value.
fn edit_object<R>(
    map: &mut Map<String, Value>,
    key: &str,
    edit: impl FnOnce(&mut Map<String, Value>) -> R,
) -> R {
    let mut inner = match map.remove(key) {
        Some(Value::Object(inner)) => inner,
        _ => Map::new(),
    };
    let out = edit(&mut inner);
    map.insert(key.to_string(), Value::Object(inner));
    out
}

/// Player names become document keys; reject the characters keys cannot hold.
fn validate_player(player: &str) -> Result<()> {
    if player.trim().is_empty() || player.contains(['/', '.', '#', '$', '[', ']']) {
        return Err(OrganismsError::Config(format!("invalid player name: {player:?}")));
    }
    Ok(())
}

fn write_atomic(path: &Path, document: &Value) -> Result<()> {
    let write_err = |source| OrganismsError::FileWrite {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let json = serde_json::to_string_pretty(document)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(write_err)?;
    std::fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
