//! Console rendering of batch results.

use capacity_probe::{ProbeResult, ProbeStatus};

const HEADERS: [&str; 6] = ["#", "route", "target", "status", "max", "notes"];

/// Plain-text table, one row per result in batch order.
///
/// Rows without a positive count are prefixed with `!`; rows with a
/// snapshot carry a `review:` note pointing at it.
pub fn render_table(results: &[ProbeResult]) -> String {
    let rows: Vec<[String; 6]> = results.iter().map(row).collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    out.push_str(&format_line(' ', &HEADERS.map(str::to_string), &widths));
    for (result, row) in results.iter().zip(&rows) {
        let flag = if result.is_success() { ' ' } else { '!' };
        out.push_str(&format_line(flag, row, &widths));
    }
    out
}

fn row(result: &ProbeResult) -> [String; 6] {
    [
        (result.index + 1).to_string(),
        result.query.label(),
        result.target.to_string(),
        result.status.to_string(),
        result.confirmed_max.to_string(),
        notes(result),
    ]
}

fn notes(result: &ProbeResult) -> String {
    let mut notes = Vec::new();
    if result.status == ProbeStatus::TechnicalError {
        notes.push(result.message.clone());
    }
    if let Some(ref snapshot) = result.diagnostic {
        let location = snapshot
            .location
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| snapshot.id.to_string());
        notes.push(format!("review: {location}"));
    }
    notes.join("; ")
}

fn format_line(flag: char, cells: &[String; 6], widths: &[usize; 6]) -> String {
    let mut line = String::new();
    line.push(flag);
    for (i, (cell, width)) in cells.iter().zip(widths.iter()).enumerate() {
        line.push(' ');
        if i == cells.len() - 1 {
            line.push_str(cell);
        } else {
            line.push_str(&format!("{cell:<width$}"));
        }
    }
    line.truncate(line.trim_end().len());
    line.push('\n');
    line
}

/// One-line tally of a batch.
pub fn summary_line(results: &[ProbeResult]) -> String {
    let succeeded = results.iter().filter(|r| r.is_success()).count();
    let not_found = results.iter().filter(|r| r.status == ProbeStatus::NotFound).count();
    let failed = results
        .iter()
        .filter(|r| r.status == ProbeStatus::TechnicalError)
        .count();
    let review = results.iter().filter(|r| r.needs_review()).count();
    format!(
        "{} probes: {succeeded} with capacity, {not_found} not found, {failed} failed, {review} flagged for review",
        results.len()
    )
}

/// Pretty JSON array of results.
pub fn render_json(results: &[ProbeResult]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(results)
}
