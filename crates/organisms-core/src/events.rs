//! Interaction-event schema for classroom research logging.
//!
//! Events are storage-agnostic; sinks live in the runtime crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::plots::{ChartType, PlotRole, TelemetryField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenMode {
    Single,
    Dual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Panel {
    Journal,
    Plots,
}

impl ScreenMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Dual => "dual",
        }
    }
}

impl Panel {
    fn as_str(self) -> &'static str {
        match self {
            Self::Journal => "journal",
            Self::Plots => "plots",
        }
    }
}

/// A user interaction worth recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInteractionEvent {
    ScreenModeChanged {
        from: ScreenMode,
        to: ScreenMode,
    },
    ActivePanelChanged {
        from: Panel,
        to: Panel,
    },
    PlotTypeChanged {
        from: ChartType,
        to: ChartType,
    },
    PlotVariableChanged {
        chart: ChartType,
        role: PlotRole,
        from: Option<TelemetryField>,
        to: Option<TelemetryField>,
    },
    JournalResponseEdited {
        question_index: usize,
        length: usize,
    },
    JournalInputFocused {
        round: u32,
        question_index: usize,
    },
    JournalInputCommitted {
        round: u32,
        question_index: usize,
        length: usize,
    },
}

impl UserInteractionEvent {
    /// Dotted event type, e.g. `"plot.type_changed"`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ScreenModeChanged { .. } => "layout.screen_mode_changed",
            Self::ActivePanelChanged { .. } => "layout.active_panel_changed",
            Self::PlotTypeChanged { .. } => "plot.type_changed",
            Self::PlotVariableChanged { .. } => "plot.change_variable",
            Self::JournalResponseEdited { .. } => "journal.response_edited",
            Self::JournalInputFocused { .. } | Self::JournalInputCommitted { .. } => {
                "journal.input"
            }
        }
    }

    pub fn action(&self) -> String {
        match self {
            Self::ScreenModeChanged { from, to } => format!("{}_to_{}", from.as_str(), to.as_str()),
            Self::ActivePanelChanged { from, to } => {
                format!("{}_to_{}", from.as_str(), to.as_str())
            }
            Self::PlotTypeChanged { to, .. } => to.id().to_string(),
            Self::PlotVariableChanged { role, .. } => format!("{}_variable_changed", role_id(*role)),
            Self::JournalResponseEdited { .. } => "text_updated".to_string(),
            Self::JournalInputFocused { .. } => "answer_focused".to_string(),
            Self::JournalInputCommitted { .. } => "answer_committed".to_string(),
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::ScreenModeChanged { from, to } => json!({ "from": from, "to": to }),
            Self::ActivePanelChanged { from, to } => json!({ "from": from, "to": to }),
            Self::PlotTypeChanged { from, to } => json!({ "from": from, "to": to }),
            Self::PlotVariableChanged { role, from, to, .. } => json!({
                "axis": role,
                "from": from,
                "to": to,
            }),
            Self::JournalResponseEdited {
                question_index,
                length,
            } => json!({ "questionIndex": question_index, "length": length }),
            Self::JournalInputFocused {
                round,
                question_index,
            } => json!({ "round": round, "questionIndex": question_index }),
            Self::JournalInputCommitted {
                round,
                question_index,
                length,
            } => json!({ "round": round, "questionIndex": question_index, "length": length }),
        }
    }

    /// The event as `{ type, action, details }`, plus `plotType` for
    /// variable changes.
    pub fn to_value(&self) -> Value {
        let mut value = json!({
            "type": self.event_type(),
            "action": self.action(),
            "details": self.details(),
        });
        if let Self::PlotVariableChanged { chart, .. } = self {
            value["plotType"] = json!(chart);
        }
        value
    }
}

fn role_id(role: PlotRole) -> &'static str {
    match role {
        PlotRole::X => "x",
        PlotRole::Y => "y",
        PlotRole::Value => "value",
    }
}

/// Session-level grouping key for a batch of logged events.
///
/// `:` and `.` are replaced so the key is safe as a document path segment.
pub fn create_batch_timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace(':', "_")
        .replace('.', "_")
}
