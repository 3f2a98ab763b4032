//! Mission-journal catalogue and answer types.
//!
//! Questions are static configuration; answers are persisted per session,
//! player and round by the runtime store.

use serde::{Deserialize, Serialize};

use crate::plots::{ChartType, PlotSelection, TelemetryField};

// ── Questions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    Text,
    /// The student must build a plot before answering.
    PlotRequired,
}

/// Plot a `plot-required` question expects the student to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotConstraints {
    pub chart: ChartType,
    pub x_options: &'static [TelemetryField],
    pub y_options: &'static [TelemetryField],
}

impl PlotConstraints {
    /// `true` when `selection` on `chart` is one of the expected plots.
    pub fn is_satisfied_by(&self, chart: ChartType, selection: &PlotSelection) -> bool {
        chart == self.chart
            && selection.x.is_some_and(|x| self.x_options.contains(&x))
            && selection.y.is_some_and(|y| self.y_options.contains(&y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JournalQuestion {
    pub id: &'static str,
    pub prompt: &'static str,
    pub kind: QuestionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot: Option<PlotConstraints>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalRound {
    pub round_number: u32,
    pub questions: &'static [JournalQuestion],
}

impl JournalRound {
    pub fn question(&self, id: &str) -> Option<&'static JournalQuestion> {
        self.questions.iter().find(|q| q.id == id)
    }
}

const fn text(id: &'static str, prompt: &'static str) -> JournalQuestion {
    JournalQuestion {
        id,
        prompt,
        kind: QuestionKind::Text,
        plot: None,
    }
}

const fn plot_required(
    id: &'static str,
    prompt: &'static str,
    plot: Option<PlotConstraints>,
) -> JournalQuestion {
    JournalQuestion {
        id,
        prompt,
        kind: QuestionKind::PlotRequired,
        plot,
    }
}

pub const JOURNAL_ROUNDS: [JournalRound; 3] = [
    JournalRound {
        round_number: 1,
        questions: &[
            text("r1-q1", "Welcome to your Mission Journal, cadet! To get started, enter your codename."),
            text("r1-q2", "How many sectors are there on S.S. Astra?"),
            text("r1-q3", "Look around the room, how many cadets are there in total [remember to count yourself!]"),
            text("r1-q4", "During this round you completed a task with a partner cadet, what task did you complete as a team?"),
            text("r1-q5", "Write down the codename of your partner cadet for this task."),
            text("r1-q6", "Given that you know that on this ship there is a sector that is infected, do you suspect that you or your partner cadet have become infected after this round?"),
            text("r1-q7", "On the top right there is an option to \"Go Dual Screen\" or \"Go Single Screen.\" How does the view change when you \"Go Dual Screen\"?"),
        ],
    },
    JournalRound {
        round_number: 2,
        questions: &[
            text("r2-q1", "Report the letter of the sector (A, B, etc) you visited in this round."),
            text("r2-q2", "Write down the codename of your partner cadet for this task."),
            text("r2-q3", "Did you work with the same cadet as in Round 1? If so, why?"),
            text("r2-q4", "Without changing the rules of the game, what do you suggest the cadets should do to lessen the spread?"),
            plot_required(
                "r2-q5",
                "Using a line plot with Time on the x-axis and Infected Cadets on the y-axis, would you say infections increased over time?",
                Some(PlotConstraints {
                    chart: ChartType::Line,
                    x_options: &[TelemetryField::Time],
                    y_options: &[TelemetryField::InfectedCadets],
                }),
            ),
            plot_required(
                "r2-q6",
                "What makes the line plot helpful in answering the previous question?",
                None,
            ),
        ],
    },
    JournalRound {
        round_number: 3,
        questions: &[
            text("r3-q1", "Did you pick a new partner for this task? Do you think changing partners increases infection risk?"),
            plot_required(
                "r3-q2",
                "Using a line plot with Time vs Infected Sectors, describe your observations.",
                Some(PlotConstraints {
                    chart: ChartType::Line,
                    x_options: &[TelemetryField::Time],
                    y_options: &[TelemetryField::InfectedSectors],
                }),
            ),
            text("r3-q3", "What type of plot do you think is most useful for limiting infection spread?"),
        ],
    },
];

/// Look up a round by its 1-based number.
pub fn round(round_number: u32) -> Option<&'static JournalRound> {
    JOURNAL_ROUNDS.iter().find(|r| r.round_number == round_number)
}

// ── Players ───────────────────────────────────────────────────────────────────

/// Identities a student may pick when joining a session.
pub const PLAYER_NAMES: [&str; 20] = [
    "Luma", "Buzz", "Kino", "Zee", "Taz", "Jade", "Star", "Gem", "Echo", "Synth", "Jazz",
    "Drift", "Nova", "Hex", "Ember", "Mav", "Geo", "Eli", "Glow", "Lex",
];

pub fn is_player_name(name: &str) -> bool {
    PLAYER_NAMES.contains(&name)
}

// ── Answers ───────────────────────────────────────────────────────────────────

/// An answer as submitted from the journal panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalAnswer {
    pub question_id: String,
    pub answer: String,
}

/// An answer as persisted in the session document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAnswer {
    pub answer: String,
    /// Unix milliseconds of the last save.
    pub updated_at: i64,
}
