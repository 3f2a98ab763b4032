use serde::{Deserialize, Serialize};

use crate::models::{SessionAction, SessionMetadata};

/// Whether a session is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Inactive,
}

impl SessionStatus {
    /// Derive the status from metadata timestamps alone.
    ///
    /// A session that was never started is inactive. Otherwise the latest
    /// lifecycle event wins; on equal timestamps the later-listed action
    /// (`start`, `stop`, `pause`, `resume`) wins.
    pub fn derive(metadata: &SessionMetadata) -> Self {
        if metadata.start.is_none() {
            return Self::Inactive;
        }

        let latest = metadata
            .events()
            .into_iter()
            .enumerate()
            .max_by_key(|(idx, e)| (e.timestamp, *idx))
            .map(|(_, e)| e.action);

        match latest {
            Some(SessionAction::Start) | Some(SessionAction::Resume) => Self::Active,
            Some(SessionAction::Pause) => Self::Paused,
            Some(SessionAction::Stop) | None => Self::Inactive,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Inactive => "inactive",
        }
    }
}
