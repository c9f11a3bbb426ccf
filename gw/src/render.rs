//! Terminal rendering of the progress projection

use std::time::Duration;

use colored::Colorize;
use serde::Serialize;

use crate::progress::{GenerationRun, SlotProgress, Stage, TrackerStats, overall_percent, slot_percent, status_text};
use crate::stream::StreamError;

const BAR_WIDTH: usize = 20;

/// A fixed-width bar for `percent`
pub fn progress_bar(percent: u8, width: usize) -> String {
    let filled = (usize::from(percent.min(100)) * width + 50) / 100;
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

fn slot_label(index: usize, slot: &SlotProgress) -> String {
    let details: Vec<&str> = [&slot.difficulty, &slot.topic, &slot.language]
        .into_iter()
        .filter_map(|s| s.as_deref())
        .collect();
    if details.is_empty() {
        format!("slot {}", index + 1)
    } else {
        format!("slot {} ({})", index + 1, details.join(", "))
    }
}

fn colored_status(slot: &SlotProgress, max_attempts: u32) -> String {
    let text = status_text(slot, max_attempts);
    match slot.stage {
        Stage::Queued => text.dimmed().to_string(),
        Stage::Drafting if slot.last_failure.is_some() => text.yellow().to_string(),
        Stage::Verifying if slot.last_failure.is_some() => text.yellow().to_string(),
        Stage::Drafting | Stage::Verifying => text.cyan().to_string(),
        Stage::Done => text.green().to_string(),
        Stage::Failed => text.red().to_string(),
    }
}

/// One line for a slot: label, bar, status
pub fn render_slot(index: usize, slot: &SlotProgress, max_attempts: u32) -> String {
    format!(
        "  {:<36} {} {}",
        slot_label(index, slot),
        progress_bar(slot_percent(slot), BAR_WIDTH / 2),
        colored_status(slot, max_attempts)
    )
}

/// Run-level failure banner
pub fn render_error_banner(error: &str) -> String {
    format!("{} {}", " GENERATION FAILED ".on_red().white().bold(), error.red())
}

fn render_header(run: &GenerationRun) -> String {
    let percent = overall_percent(run);
    format!(
        "{} {} {:>3}%  {} done, {} failed of {}",
        format!("Run #{}", run.run_number).bold(),
        progress_bar(percent, BAR_WIDTH),
        percent,
        run.count(Stage::Done).to_string().green(),
        run.count(Stage::Failed).to_string().red(),
        run.total_slots()
    )
}

/// Full view of the projection
pub fn render_run(run: &GenerationRun, max_attempts: u32) -> String {
    let mut lines = vec![render_header(run)];
    lines.extend(
        run.slots()
            .iter()
            .enumerate()
            .map(|(i, slot)| render_slot(i, slot, max_attempts)),
    );
    if let Some(error) = &run.error {
        lines.push(render_error_banner(error));
    }
    lines.join("\n")
}

/// Lines describing what changed between two projections
///
/// A new run (or a first one) prints its header; otherwise only slots whose
/// state differs are printed, prefixed with the overall percent.
pub fn render_changes(before: Option<&GenerationRun>, after: &GenerationRun, max_attempts: u32) -> Vec<String> {
    let same_run = before.is_some_and(|b| b.run_number == after.run_number && b.total_slots() == after.total_slots());
    if !same_run {
        return vec![format!(
            "{} {} slots",
            format!("Run #{} started:", after.run_number).bold(),
            after.total_slots()
        )];
    }

    let mut lines = Vec::new();
    let percent = overall_percent(after);
    if let Some(before) = before {
        for (i, (old, new)) in before.slots().iter().zip(after.slots()).enumerate() {
            if old != new {
                lines.push(format!(
                    "[{:>3}%] {}: {}",
                    percent,
                    slot_label(i, new),
                    colored_status(new, max_attempts)
                ));
            }
        }
        if before.error.is_none()
            && let Some(error) = &after.error
        {
            lines.push(render_error_banner(error));
        }
    }
    lines
}

/// Advisory notice for a silent stream
pub fn render_stalled(silent_for: Duration) -> String {
    format!(
        "{}",
        format!(
            "No progress for {}s; the backend may be busy or the connection stalled",
            silent_for.as_secs()
        )
        .yellow()
    )
}

pub fn render_reconnecting(error: &StreamError) -> String {
    format!("{} {}", "Connection lost, reconnecting:".yellow(), error)
}

pub fn render_reconnected() -> String {
    format!("{}", "Connection restored".green())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport<'a> {
    run: Option<&'a GenerationRun>,
    overall_percent: Option<u8>,
    stats: &'a TrackerStats,
}

/// Machine-readable projection plus tracker counters
pub fn render_json(run: Option<&GenerationRun>, stats: &TrackerStats) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonReport {
        run,
        overall_percent: run.map(overall_percent),
        stats,
    })
}
