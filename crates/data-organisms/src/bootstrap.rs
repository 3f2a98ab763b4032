use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use organisms_core::settings::Settings;
use organisms_runtime::store::FileSessionStore;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure the standard `~/.data-organisms/` directory hierarchy exists.
pub fn ensure_directories() -> anyhow::Result<()> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    ensure_directories_in(&home)?;
    Ok(())
}

/// Create `.data-organisms/`, `logs/` and `sessions/` under `base_dir`.
pub fn ensure_directories_in(base_dir: &Path) -> anyhow::Result<PathBuf> {
    let app_dir = base_dir.join(".data-organisms");
    std::fs::create_dir_all(app_dir.join("logs"))?;
    std::fs::create_dir_all(app_dir.join("sessions"))?;
    Ok(app_dir)
}

/// `~/.data-organisms/logs`.
pub fn logs_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".data-organisms")
        .join("logs")
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` name to an [`EnvFilter`] directive.
pub fn filter_directive(log_level: &str) -> &'static str {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Output goes to `log_file` when given (appending, no ANSI colours) and to
/// stderr otherwise.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter_directive(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (stderr_layer, file_layer) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => {
            let layer = fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_writer(std::io::stderr);
            (Some(layer), None)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;

    Ok(())
}

// ── Data-path discovery ────────────────────────────────────────────────────────

/// Directory holding session documents: `--data-dir` (or
/// `DATA_ORGANISMS_DIR`) when set, otherwise `~/.data-organisms/sessions`.
pub fn discover_data_path(settings: &Settings) -> PathBuf {
    settings
        .data_dir
        .clone()
        .unwrap_or_else(FileSessionStore::default_root)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    // ── test_ensure_directories ───────────────────────────────────────────────

    #[test]
    fn test_ensure_directories_in() {
        let tmp = TempDir::new().expect("tempdir");

        let app_dir = ensure_directories_in(tmp.path()).expect("ensure_directories_in should succeed");

        assert_eq!(app_dir, tmp.path().join(".data-organisms"));
        assert!(app_dir.join("logs").is_dir(), "logs subdir must exist");
        assert!(app_dir.join("sessions").is_dir(), "sessions subdir must exist");
    }

    #[test]
    fn test_ensure_directories_in_is_idempotent() {
        let tmp = TempDir::new().expect("tempdir");
        ensure_directories_in(tmp.path()).unwrap();
        assert!(ensure_directories_in(tmp.path()).is_ok());
    }

    // ── test_filter_directive ─────────────────────────────────────────────────

    #[test]
    fn test_filter_directive() {
        assert_eq!(filter_directive("DEBUG"), "debug");
        assert_eq!(filter_directive("info"), "info");
        assert_eq!(filter_directive("WARNING"), "warn");
        assert_eq!(filter_directive("ERROR"), "error");
        assert_eq!(filter_directive("CRITICAL"), "error");
        assert_eq!(filter_directive("verbose"), "info");
    }

    // ── test_discover_data_path ───────────────────────────────────────────────

    #[test]
    fn test_discover_data_path_prefers_flag() {
        let settings = Settings::parse_from(["data-organisms", "--data-dir", "/tmp/sessions"]);
        assert_eq!(discover_data_path(&settings), PathBuf::from("/tmp/sessions"));
    }

    #[test]
    fn test_discover_data_path_default() {
        let mut settings = Settings::parse_from(["data-organisms"]);
        settings.data_dir = None;
        let path = discover_data_path(&settings);
        assert!(path.ends_with(".data-organisms/sessions"));
    }
}
