//! Terminal rendering of gateway responses.

use crate::cli::OutputFormat;
use crate::db::Value;
use crate::gateway::GatewayResponse;

/// Longest cell shown in table output before it is cut.
const MAX_CELL_WIDTH: usize = 40;

/// Renders a response in the requested format.
pub fn render(response: &GatewayResponse, format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => render_table(response),
        OutputFormat::Json => serde_json::to_string_pretty(response)
            .unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}")),
    }
}

/// Renders a response as an aligned text table followed by a summary line.
pub fn render_table(response: &GatewayResponse) -> String {
    if let Some(error) = &response.error {
        return format!("{}: {}\n", error.kind, error.message);
    }

    let cells: Vec<Vec<String>> = response
        .rows
        .iter()
        .map(|row| {
            response
                .columns
                .iter()
                .map(|column| cell_text(row.get(column)))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = response
        .columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    if !response.columns.is_empty() {
        push_line(&mut out, &response.columns, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&rule.join("-+-"));
        out.push('\n');
        for row in &cells {
            push_line(&mut out, row, &widths);
        }
    }

    let plural = if response.row_count == 1 { "" } else { "s" };
    out.push_str(&format!("({} row{plural})\n", response.row_count));
    if let Some(notice) = &response.notice {
        out.push_str(notice);
        out.push('\n');
    }
    out
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(padded.join(" | ").trim_end());
    out.push('\n');
}

fn cell_text(value: Option<&Value>) -> String {
    let text = value.map(Value::to_display_string).unwrap_or_default();
    if text.chars().count() > MAX_CELL_WIDTH {
        let cut: String = text.chars().take(MAX_CELL_WIDTH - 1).collect();
        format!("{cut}…")
    } else {
        text
    }
}
