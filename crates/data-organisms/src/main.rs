mod bootstrap;
mod views;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use organisms_core::events::UserInteractionEvent;
use organisms_core::plots::ChartType;
use organisms_core::settings::{LastUsedParams, Settings};
use organisms_core::time_utils::TimezoneHandler;
use organisms_data::adapters::chart_data;
use organisms_data::analysis::{analyze_snapshot, AnalysisOptions, AnalysisResult};
use organisms_data::reader::IngestOptions;
use organisms_runtime::interaction_log::{
    InteractionContext, InteractionLogger, JsonlLogger, TracingLogger,
};
use organisms_runtime::orchestrator::TelemetryOrchestrator;
use organisms_runtime::store::{FileSessionStore, StartDetails};

#[tokio::main]
async fn main() -> Result<()> {
    // Read before settings are merged and saved, for plot-type change events.
    let previous_plot = LastUsedParams::load_from(&LastUsedParams::config_path()).plot;
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("DataOrganisms v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "View: {}, Session: {}, Timezone: {}",
        settings.view,
        settings.session_id.as_deref().unwrap_or("-"),
        settings.timezone
    );

    let store = FileSessionStore::new(bootstrap::discover_data_path(&settings));

    match settings.view.as_str() {
        "series" => {
            let result = analyze(&store, &settings)?;
            println!("{}", serde_json::to_string_pretty(&result.points)?);
        }

        "table" => {
            let result = analyze(&store, &settings)?;
            let tz = TimezoneHandler::new(&settings.timezone);
            println!("{}", views::render_table(&result.points, &tz));
        }

        "plot" => {
            let result = analyze(&store, &settings)?;
            let chart = settings.chart_type()?;
            let requested = settings.plot_selection()?;
            let corrected = requested.corrected_for(chart);

            let previous = previous_plot.as_deref().and_then(|p| p.parse::<ChartType>().ok());
            let events = views::plot_corrections(previous, chart, &requested, &corrected);
            log_interactions(&settings, &events);

            let data = chart_data(chart, &corrected, &result.points)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "chart": chart,
                    "selection": corrected,
                    "data": data,
                }))?
            );
        }

        "watch" => {
            let session_id = require_session(&settings)?;
            tracing::info!(session_id, "Watching session for changes...");

            let orchestrator = TelemetryOrchestrator::new(
                session_id,
                analysis_options(&settings)?,
                u64::from(settings.refresh_rate),
            );
            let (mut rx, handle) = orchestrator.start_watching(store);

            loop {
                tokio::select! {
                    update = rx.recv() => match update {
                        Some(update) => println!("{}", serde_json::to_string(&update)?),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Ctrl+C received; stopping watch");
                        break;
                    }
                }
            }
            handle.abort();
        }

        "status" => {
            let tz = TimezoneHandler::new(&settings.timezone);
            match settings.session_id.as_deref() {
                Some(_) => {
                    let result = analyze(&store, &settings)?;
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&serde_json::json!({
                            "status": result.status,
                            "summary": result.summary,
                            "report": result.report,
                        }))?
                    );
                }
                None => {
                    // A known player sees only the sessions they own.
                    for summary in store.list_sessions(settings.player.as_deref())? {
                        println!("{}", views::render_session_line(&summary, &tz));
                    }
                }
            }
        }

        "create" => {
            let teacher = settings.player.as_deref().unwrap_or("Unknown");
            let id = store.create_session(&settings.game, teacher, Utc::now())?;
            println!("{id}");
        }

        "start" => {
            let session_id = require_session(&settings)?;
            let details = StartDetails {
                class_name: settings
                    .class_name
                    .clone()
                    .context("--class-name is required to start a session")?,
                cadets: settings.cadets.context("--cadets is required to start a session")?,
                sectors: settings.sectors.context("--sectors is required to start a session")?,
                teacher: settings.player.clone(),
            };
            store.start_session(session_id, &details, Utc::now())?;
        }

        "stop" => store.stop_session(require_session(&settings)?, Utc::now())?,
        "pause" => store.pause_session(require_session(&settings)?, Utc::now())?,
        "resume" => store.resume_session(require_session(&settings)?, Utc::now())?,

        "journal" => {
            let answers = match (settings.session_id.as_deref(), settings.player.as_deref()) {
                (Some(session_id), Some(player)) => {
                    let submitted = settings.journal_answers()?;
                    if let Some(round) = settings.round {
                        store.save_journal_round(session_id, player, round, &submitted, Utc::now())?;
                    } else if !submitted.is_empty() {
                        bail!("--round is required when saving journal answers");
                    }
                    Some(store.load_journal_answers(session_id, player)?)
                }
                _ => None,
            };
            let chart = settings.chart_type()?;
            let selection = settings.plot_selection()?.corrected_for(chart);
            let document = views::journal_document(answers.as_ref(), Some((chart, &selection)));
            println!("{}", serde_json::to_string_pretty(&document)?);
        }

        unknown => {
            eprintln!("Unknown view mode: {}", unknown);
        }
    }

    Ok(())
}

// ── Helpers ────────────────────────────────────────────────────────────────────

fn require_session(settings: &Settings) -> Result<&str> {
    settings
        .session_id
        .as_deref()
        .context("--session-id is required for this view")
}

fn analysis_options(settings: &Settings) -> Result<AnalysisOptions> {
    Ok(AnalysisOptions {
        ingest: IngestOptions {
            role_prefixes: settings.role_prefixes()?,
        },
        mask_policy: settings.mask_policy()?,
    })
}

fn analyze(store: &FileSessionStore, settings: &Settings) -> Result<AnalysisResult> {
    let session_id = require_session(settings)?;
    let snapshot = store.read_snapshot(session_id)?;
    let result = analyze_snapshot(&snapshot, &analysis_options(settings)?)?;

    tracing::info!(
        session_id,
        status = result.status.as_str(),
        points = result.points.len(),
        readings_skipped = result.report.readings_skipped,
        masks_repaired = result.report.masks_repaired,
        "Session analysed"
    );
    Ok(result)
}

/// Record plot adjustments: to the interaction log when a player is known,
/// otherwise to the tracing output.
fn log_interactions(settings: &Settings, events: &[UserInteractionEvent]) {
    if events.is_empty() {
        return;
    }

    let mut logger: Box<dyn InteractionLogger> = match settings.player.as_deref() {
        Some(player) => {
            let context = InteractionContext::new(
                player,
                settings.session_id.clone(),
                settings.game.clone(),
                Utc::now(),
            );
            Box::new(JsonlLogger::new(
                bootstrap::logs_dir().join("interactions.jsonl"),
                context,
            ))
        }
        None => Box::new(TracingLogger),
    };

    for event in events {
        if let Err(e) = logger.log(event) {
            tracing::warn!(error = %e, "failed to record interaction");
        }
    }
}
