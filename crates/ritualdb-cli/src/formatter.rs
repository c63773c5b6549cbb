//! Output formatters for command results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// A tabular command result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    /// Column names.
    pub headers: Vec<String>,
    /// Rows, one cell per header. `None` renders as an empty cell or null.
    pub rows: Vec<Vec<Option<String>>>,
    /// Trailing line shown below the rows.
    pub footer: Option<String>,
}

impl Report {
    /// Create an empty report with the given columns.
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
            footer: None,
        }
    }

    /// Append a row.
    pub fn push(&mut self, row: Vec<Option<String>>) {
        self.rows.push(row);
    }

    /// Set the footer.
    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Check if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format a tabular report.
    fn format_report(&self, report: &Report) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;

    /// Format an error message.
    fn format_error(&self, error: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_report(&self, report: &Report) -> String {
        let mut output = if report.is_empty() {
            "No results".to_string()
        } else {
            let mut table = Table::new();
            table.set_header(report.headers.iter().map(Cell::new));
            for row in &report.rows {
                table.add_row(row.iter().map(|cell| Cell::new(cell.as_deref().unwrap_or(""))));
            }
            table.to_string()
        };

        if let Some(footer) = &report.footer {
            output.push('\n');
            output.push_str(footer);
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_report(&self, report: &Report) -> String {
        let rows: Vec<serde_json::Value> = report
            .rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, serde_json::Value> = report
                    .headers
                    .iter()
                    .zip(row)
                    .map(|(header, cell)| {
                        let value = cell
                            .as_ref()
                            .map_or(serde_json::Value::Null, |c| serde_json::Value::from(c.as_str()));
                        (json_key(header), value)
                    })
                    .collect();
                serde_json::Value::Object(obj)
            })
            .collect();

        let value = match &report.footer {
            Some(footer) => serde_json::json!({ "rows": rows, "summary": footer }),
            None => serde_json::Value::Array(rows),
        };
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({ "message": message }).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({ "error": error }).to_string()
    }
}

/// Header text as a snake_case JSON key.
fn json_key(header: &str) -> String {
    header
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Report {
        let mut report = Report::new(&["Store", "Version", "Pending Restore"]);
        report.push(vec![
            Some("Ritualist".to_string()),
            Some("8.0.0".to_string()),
            None,
        ]);
        report
    }

    #[test]
    fn test_table_formatter() {
        let output = TableFormatter.format_report(&sample());
        assert!(output.contains("Ritualist"));
        assert!(output.contains("Pending Restore"));
    }

    #[test]
    fn test_table_formatter_empty() {
        let report = Report::new(&["Store"]).with_footer("0 backup(s)");
        assert_eq!(TableFormatter.format_report(&report), "No results\n0 backup(s)");
    }

    #[test]
    fn test_json_formatter() {
        let output = JsonFormatter.format_report(&sample());
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value[0]["store"], "Ritualist");
        assert_eq!(value[0]["version"], "8.0.0");
        assert!(value[0]["pending_restore"].is_null());
    }

    #[test]
    fn test_json_formatter_with_footer() {
        let output = JsonFormatter.format_report(&sample().with_footer("1 store"));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["summary"], "1 store");
        assert_eq!(value["rows"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_error_format() {
        assert_eq!(TableFormatter.format_error("boom"), "Error: boom");
        assert_eq!(JsonFormatter.format_error("boom"), r#"{"error":"boom"}"#);
    }
}
