use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{OrganismsError, Result};
use crate::journal::JournalAnswer;
use crate::models::{MaskPolicy, RolePrefixes};
use crate::plots::{ChartType, PlotSelection, Population, TelemetryField};

/// Views that only read session data; only these are remembered between runs.
const READ_VIEWS: &[&str] = &["series", "table", "plot", "watch", "status", "journal"];

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Session telemetry and journal tooling for DataOrganisms classrooms
#[derive(Parser, Debug, Clone)]
#[command(
    name = "data-organisms",
    about = "Session telemetry and journal tooling for DataOrganisms classrooms",
    version
)]
pub struct Settings {
    /// View mode
    #[arg(long, default_value = "series", value_parser = [
        "series", "table", "plot", "watch", "status", "journal", "create", "start", "stop",
        "pause", "resume",
    ])]
    pub view: String,

    /// Session to read or manage
    #[arg(long)]
    pub session_id: Option<String>,

    /// Directory holding session documents (defaults to ~/.data-organisms/sessions)
    #[arg(long, env = "DATA_ORGANISMS_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Chart type for the plot view
    #[arg(long, default_value = "line", value_parser = ["line", "scatter", "histogram", "pie"])]
    pub plot: String,

    /// Variable on the x axis
    #[arg(long)]
    pub x: Option<String>,

    /// Variable on the y axis
    #[arg(long)]
    pub y: Option<String>,

    /// Variable counted by a histogram
    #[arg(long)]
    pub value: Option<String>,

    /// Population summarised by a pie chart
    #[arg(long, value_parser = ["cadets", "sectors"])]
    pub population: Option<String>,

    /// What to do with readings whose proximity mask is malformed or short
    #[arg(long, default_value = "lenient", value_parser = ["lenient", "strict"])]
    pub mask_policy: String,

    /// Device-id prefix of cadet badges
    #[arg(long, default_value = "S")]
    pub cadet_prefix: String,

    /// Device-id prefix of sector beacons
    #[arg(long, default_value = "T")]
    pub sector_prefix: String,

    /// Timezone for displayed times (auto-detected if not specified)
    #[arg(long, default_value = "auto")]
    pub timezone: String,

    /// Poll interval of the watch view in seconds (1-60)
    #[arg(long, default_value = "2", value_parser = clap::value_parser!(u32).range(1..=60))]
    pub refresh_rate: u32,

    /// Player identity for journal answers (teacher id for `create`, `start`)
    #[arg(long)]
    pub player: Option<String>,

    /// Journal round to save answers for
    #[arg(long)]
    pub round: Option<u32>,

    /// Journal answer as `QUESTION_ID=TEXT` (repeatable)
    #[arg(long = "answer")]
    pub answers: Vec<String>,

    /// Cadet count when starting a session
    #[arg(long)]
    pub cadets: Option<u32>,

    /// Sector count when starting a session
    #[arg(long)]
    pub sectors: Option<u32>,

    /// Class name when starting a session
    #[arg(long)]
    pub class_name: Option<String>,

    /// Game a new session belongs to
    #[arg(long, default_value = "alien-invasion")]
    pub game: String,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.data-organisms/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot: Option<String>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".data-organisms").join("last_used.json")
    }

    /// Load persisted params from an explicit path.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, resolve `"auto"` values, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation – accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            let _ = LastUsedParams::clear_at(config_path);
            return Self::resolve_auto_values(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins over persisted values.
        if !is_arg_explicitly_set(&matches, "view") {
            if let Some(v) = last.view {
                settings.view = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "session_id") && settings.session_id.is_none() {
            settings.session_id = last.session_id;
        }
        if !is_arg_explicitly_set(&matches, "timezone") {
            if let Some(v) = last.timezone {
                settings.timezone = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "mask_policy") {
            if let Some(v) = last.mask_policy {
                settings.mask_policy = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "refresh_rate") {
            if let Some(v) = last.refresh_rate {
                settings.refresh_rate = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "plot") {
            if let Some(v) = last.plot {
                settings.plot = v;
            }
        }

        settings = Self::resolve_auto_values(settings);

        let params = LastUsedParams::from(&settings);
        let _ = params.save_to(config_path);

        settings
    }

    /// Resolve `"auto"` sentinel values and apply the `--debug` flag.
    fn resolve_auto_values(mut settings: Settings) -> Settings {
        if settings.timezone == "auto" {
            settings.timezone = crate::time_utils::get_system_timezone();
        }

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        settings
    }

    /// `--answer` values split into journal answers.
    pub fn journal_answers(&self) -> Result<Vec<JournalAnswer>> {
        self.answers
            .iter()
            .map(|raw| {
                let (question_id, answer) = raw.split_once('=').ok_or_else(|| {
                    OrganismsError::Config(format!("answer `{raw}` must be QUESTION_ID=TEXT"))
                })?;
                Ok(JournalAnswer {
                    question_id: question_id.trim().to_string(),
                    answer: answer.to_string(),
                })
            })
            .collect()
    }

    pub fn mask_policy(&self) -> Result<MaskPolicy> {
        self.mask_policy.parse()
    }

    pub fn role_prefixes(&self) -> Result<RolePrefixes> {
        RolePrefixes::new(self.cadet_prefix.clone(), self.sector_prefix.clone())
    }

    pub fn chart_type(&self) -> Result<ChartType> {
        self.plot.parse()
    }

    /// The plot selection named on the command line, before any correction.
    pub fn plot_selection(&self) -> Result<PlotSelection> {
        let field = |raw: &Option<String>| -> Result<Option<TelemetryField>> {
            raw.as_deref().map(str::parse).transpose()
        };
        Ok(PlotSelection {
            x: field(&self.x)?,
            y: field(&self.y)?,
            value: field(&self.value)?,
            population: self
                .population
                .as_deref()
                .map(str::parse::<Population>)
                .transpose()?,
        })
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            view: READ_VIEWS
                .contains(&s.view.as_str())
                .then(|| s.view.clone()),
            session_id: s.session_id.clone(),
            timezone: Some(s.timezone.clone()),
            mask_policy: Some(s.mask_policy.clone()),
            refresh_rate: Some(s.refresh_rate),
            plot: Some(s.plot.clone()),
        }
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
