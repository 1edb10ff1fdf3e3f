use crate::significance::{Marker, Report, RowKind};

struct ChangedLine {
    marker: Marker,
    benchmark: String,
    metric: String,
    change: String,
    sigma: String,
}

fn width<'a>(cells: impl Iterator<Item = &'a str>) -> usize {
    cells.map(|c| c.chars().count()).max().unwrap_or(0)
}

/// Render a report as a fenced diff block.
///
/// Changed dimensions come first in `(benchmark, metric)` order, then one
/// line per failed dimension. Columns are padded to a common width.
pub fn render_diff(report: &Report) -> String {
    let mut out = String::from("```diff\n");

    if report.rows.is_empty() {
        if let Some(error) = &report.run_error {
            out.push_str(&format!("- run failed: {error}\n"));
        }
        out.push_str("```");
        return out;
    }

    let changed: Vec<ChangedLine> = report
        .changed()
        .filter_map(|row| match &row.kind {
            RowKind::Changed { difference, marker } => Some(ChangedLine {
                marker: *marker,
                benchmark: row.dimension.benchmark.clone(),
                metric: row.dimension.metric.clone(),
                change: difference
                    .percent_change()
                    .map(|p| format!("{p:+.1}%"))
                    .unwrap_or_else(|| "n/a".to_string()),
                sigma: difference
                    .sigma
                    .map(|s| format!("{s:.1}σ"))
                    .unwrap_or_else(|| "-".to_string()),
            }),
            RowKind::Failed => None,
        })
        .collect();

    let bw = width(report.rows.iter().map(|r| r.dimension.benchmark.as_str()));
    let mw = width(report.rows.iter().map(|r| r.dimension.metric.as_str()));
    let cw = width(changed.iter().map(|l| l.change.as_str()));
    let sw = width(changed.iter().map(|l| l.sigma.as_str()));

    for line in &changed {
        let text = format!(
            "{} {:<bw$} {:<mw$} {:>cw$} {:>sw$}",
            line.marker.symbol(),
            line.benchmark,
            line.metric,
            line.change,
            line.sigma,
        );
        out.push_str(text.trim_end());
        out.push('\n');
    }

    for row in report.failed() {
        let text = format!(
            "- {:<bw$} {:<mw$} failed",
            row.dimension.benchmark, row.dimension.metric,
        );
        out.push_str(&text);
        out.push('\n');
    }

    out.push_str("```");
    out
}
