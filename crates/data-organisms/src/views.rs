//! Text and JSON renderings used by the CLI views.

use organisms_core::events::UserInteractionEvent;
use organisms_core::games;
use organisms_core::journal::JOURNAL_ROUNDS;
use organisms_core::models::AggregatedTelemetryPoint;
use organisms_core::plots::{ChartType, PlotSelection};
use organisms_core::time_utils::TimezoneHandler;
use organisms_runtime::store::{PlayerAnswers, SessionSummary};
use serde_json::{json, Value};

const TABLE_HEADERS: [&str; 7] = [
    "Time",
    "Meetings",
    "Infected Cadets",
    "Healthy Cadets",
    "Infected Sectors",
    "Healthy Sectors",
    "Meeting",
];

// ── Table ─────────────────────────────────────────────────────────────────────

/// Render the series as an aligned text table with local wall-clock times.
pub fn render_table(points: &[AggregatedTelemetryPoint], tz: &TimezoneHandler) -> String {
    let rows: Vec<[String; 7]> = points
        .iter()
        .map(|p| {
            [
                tz.format_clock(p.time),
                p.cumulative_meetings.to_string(),
                format!("{}/{}", p.infected_cadets, p.total_cadets),
                format!("{}/{}", p.healthy_cadets, p.total_cadets),
                format!("{}/{}", p.infected_sectors, p.total_sectors),
                format!("{}/{}", p.healthy_sectors, p.total_sectors),
                if p.during_meeting { "yes" } else { "" }.to_string(),
            ]
        })
        .collect();

    let mut widths = TABLE_HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |cells: &[&str]| -> String {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = vec![line(&TABLE_HEADERS[..])];
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push(line(&cells[..]));
    }
    if rows.is_empty() {
        out.push("(no readings)".to_string());
    }
    out.join("\n")
}

// ── Plot corrections ──────────────────────────────────────────────────────────

/// Interaction events describing how the requested plot was adjusted.
///
/// A chart type different from the previously used one yields a
/// `PlotTypeChanged`; every role the correction changed yields a
/// `PlotVariableChanged`.
pub fn plot_corrections(
    previous: Option<ChartType>,
    chart: ChartType,
    requested: &PlotSelection,
    corrected: &PlotSelection,
) -> Vec<UserInteractionEvent> {
    let mut events = Vec::new();

    if let Some(from) = previous.filter(|p| *p != chart) {
        events.push(UserInteractionEvent::PlotTypeChanged { from, to: chart });
    }

    for role in requested.changed_roles(corrected) {
        events.push(UserInteractionEvent::PlotVariableChanged {
            chart,
            role,
            from: requested.get(role),
            to: corrected.get(role),
        });
    }

    events
}

// ── Status ────────────────────────────────────────────────────────────────────

pub fn render_session_line(summary: &SessionSummary, tz: &TimezoneHandler) -> String {
    let created = summary
        .created_at
        .map(|t| tz.format_full(t))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{:<28} {:<9} {:<16} {:<12} {}",
        summary.id,
        summary.state(),
        summary.game_id.as_deref().map(games::display_name).unwrap_or("-"),
        summary.class_name.as_deref().unwrap_or("-"),
        created
    )
}

// ── Journal ───────────────────────────────────────────────────────────────────

/// The journal catalogue with the player's saved answer next to each question.
///
/// Questions that expect a plot carry `plotSatisfied`, telling whether the
/// plot currently on screen matches what they ask for.
pub fn journal_document(
    answers: Option<&PlayerAnswers>,
    current_plot: Option<(ChartType, &PlotSelection)>,
) -> Value {
    let rounds: Vec<Value> = JOURNAL_ROUNDS
        .iter()
        .map(|round| {
            let saved = answers.and_then(|a| a.get(&round.round_number));
            let questions: Vec<Value> = round
                .questions
                .iter()
                .map(|q| {
                    let mut question = json!(q);
                    if let Some(stored) = saved.and_then(|s| s.get(q.id)) {
                        question["saved"] = json!(stored);
                    }
                    if let Some(constraints) = &q.plot {
                        question["plotSatisfied"] = json!(current_plot.is_some_and(
                            |(chart, selection)| constraints.is_satisfied_by(chart, selection)
                        ));
                    }
                    question
                })
                .collect();
            json!({ "roundNumber": round.round_number, "questions": questions })
        })
        .collect();
    json!({ "rounds": rounds })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
