use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the DataOrganisms crates.
#[derive(Error, Debug)]
pub enum OrganismsError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be written.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A timestamp string did not match any recognised format.
    #[error("Invalid timestamp format: {0}")]
    TimestampParse(String),

    /// The snapshot as a whole does not have the shape of a session.
    #[error("Invalid session snapshot: {0}")]
    InvalidSession(String),

    /// A session identifier contains characters the store does not accept.
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// No session document exists for the given id.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A plot variable name is not in the registry.
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// A chart type name is not in the registry.
    #[error("Unknown chart type: {0}")]
    UnknownChartType(String),

    /// A plot selection does not satisfy its chart type's role constraints.
    #[error("Invalid plot selection: {0}")]
    InvalidPlotSelection(String),

    /// A numeric operation was requested on a field that has no numeric value.
    #[error("Field is not numeric: {0}")]
    NonNumericField(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the organisms crates.
pub type Result<T> = std::result::Result<T, OrganismsError>;
