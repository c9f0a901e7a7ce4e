use std::fmt::Write as _;

use crate::formats::{ArchiveFile, Dataset, ParseError};

pub fn format_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if size < 1024 {
        return format!("{size} B");
    }
    let mut value = size as f64 / 1024.0;
    for unit in &UNITS[..UNITS.len() - 1] {
        if value < 1024.0 {
            return format!("{value:.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} {}", UNITS[UNITS.len() - 1])
}

/// Plain-text table with left-aligned columns, except those listed in `right`.
fn render_table(headers: &[&str], rows: &[Vec<String>], right: &[usize]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: Vec<&str>| {
        let line = cells
            .iter()
            .enumerate()
            .map(|(idx, cell)| {
                let pad = widths[idx].saturating_sub(cell.chars().count());
                if right.contains(&idx) {
                    format!("{}{cell}", " ".repeat(pad))
                } else {
                    format!("{cell}{}", " ".repeat(pad))
                }
            })
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    };

    push_row(headers.to_vec());
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    push_row(rule.iter().map(String::as_str).collect());
    for row in rows {
        push_row(row.iter().map(String::as_str).collect());
    }
    out
}

pub fn dataset_table(datasets: &[Dataset]) -> String {
    let rows: Vec<Vec<String>> = datasets
        .iter()
        .map(|ds| {
            vec![
                ds.short_id().to_owned(),
                ds.display_title().to_owned(),
                format!("{}-{}", ds.temporal_coverage.0, ds.temporal_coverage.1),
                ds.published
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_owned()),
                ds.links.len().to_string(),
                if ds.superseded { "superseded" } else { "current" }.to_owned(),
            ]
        })
        .collect();
    render_table(
        &["ID", "Source", "Coverage", "Published", "Links", "Status"],
        &rows,
        &[4],
    )
}

pub fn file_table(files: &[ArchiveFile]) -> String {
    let rows: Vec<Vec<String>> = files
        .iter()
        .map(|f| vec![f.name.clone(), f.file_type.clone(), format_size(f.size)])
        .collect();
    render_table(&["Name", "Type", "Size"], &rows, &[2])
}

/// Error summary grouped by message so one root cause does not flood the output.
pub fn error_summary(errors: &[ParseError]) -> String {
    let mut out = String::new();
    match errors {
        [] => {}
        [single] => {
            let _ = writeln!(
                out,
                "1 error: {}: {}",
                single.dataset_id.as_deref().unwrap_or("unknown"),
                single.message
            );
        }
        _ => {
            let _ = writeln!(out, "{} errors while parsing:", errors.len());
            let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
            for err in errors {
                let id = err.dataset_id.as_deref().unwrap_or("unknown");
                match groups.iter_mut().find(|(message, _)| *message == err.message) {
                    Some((_, ids)) => ids.push(id),
                    None => groups.push((err.message.as_str(), vec![id])),
                }
            }
            for (message, ids) in groups {
                if ids.len() <= 3 {
                    let _ = writeln!(out, "  - {message}: {}", ids.join(", "));
                } else {
                    let _ = writeln!(
                        out,
                        "  - {message}: {} +{} more",
                        ids[..2].join(", "),
                        ids.len() - 2
                    );
                }
            }
        }
    }
    out
}
