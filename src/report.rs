//! Result reporting for db-chores.
//!
//! Renders the outcome of an invocation: rows or the affected count to the
//! output stream, failures and usage text to the diagnostic stream. Reporting
//! never fails; write errors are logged and a value that cannot be rendered is
//! dumped in its debug form instead.

use std::io::{self, Stderr, Stdout, Write};

use serde_json::json;
use tracing::warn;

use crate::db::{ResultSet, RowSet, Value};
use crate::error::TaskError;

/// Output format for results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One line per row, `column=value` pairs.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: text or json")),
        }
    }
}

/// Final outcome of one invocation.
#[derive(Debug)]
pub enum OutcomeReport {
    Success(ResultSet),
    Failure(TaskError),
}

impl OutcomeReport {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<crate::error::Result<ResultSet>> for OutcomeReport {
    fn from(result: crate::error::Result<ResultSet>) -> Self {
        match result {
            Ok(result_set) => Self::Success(result_set),
            Err(e) => Self::Failure(e),
        }
    }
}

/// Writes outcomes to an output and a diagnostic stream.
pub struct Reporter<O: Write, E: Write> {
    out: O,
    err: E,
    format: OutputFormat,
}

impl Reporter<Stdout, Stderr> {
    /// Reporter bound to the process's stdout and stderr.
    pub fn stdio(format: OutputFormat) -> Self {
        Self::new(io::stdout(), io::stderr(), format)
    }
}

impl<O: Write, E: Write> Reporter<O, E> {
    pub fn new(out: O, err: E, format: OutputFormat) -> Self {
        Self { out, err, format }
    }

    /// Renders an outcome.
    pub fn report(&mut self, outcome: &OutcomeReport) {
        match outcome {
            OutcomeReport::Success(result) => {
                let text = match self.format {
                    OutputFormat::Text => render_text(result),
                    OutputFormat::Json => render_json(result).unwrap_or_else(|e| {
                        warn!("Could not render result as JSON: {e}");
                        format!("{result:?}")
                    }),
                };
                emit(&mut self.out, &text);
            }
            OutcomeReport::Failure(error) => {
                let text = match self.format {
                    OutputFormat::Text => format!("{}: {}", error.category(), error.message()),
                    OutputFormat::Json => json!({
                        "error": {
                            "category": error.category(),
                            "message": error.message(),
                        }
                    })
                    .to_string(),
                };
                emit(&mut self.err, &text);
            }
        }
    }

    /// Prints a usage line to the diagnostic stream.
    pub fn usage(&mut self, usage: &str) {
        emit(&mut self.err, usage);
    }

    /// Returns the underlying streams.
    pub fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }
}

fn emit(stream: &mut impl Write, text: &str) {
    if let Err(e) = writeln!(stream, "{text}").and_then(|()| stream.flush()) {
        warn!("Failed to write report: {e}");
    }
}

fn render_text(result: &ResultSet) -> String {
    match result {
        ResultSet::AffectedCount(count) => format!("affected_rows: {count}"),
        ResultSet::Rows(rows) => {
            let mut lines: Vec<String> = rows
                .records()
                .map(|record| {
                    record
                        .fields()
                        .map(|(name, value)| format!("{name}={}", text_field(value)))
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .collect();
            lines.push(row_count_footer(rows));
            lines.join("\n")
        }
    }
}

/// Renders a value for a `column=value` listing.
///
/// Strings that could be misread (empty, `NULL`, containing the field
/// separator, quotes, control characters or edge whitespace) are quoted and
/// escaped so each row stays on one unambiguous line.
fn text_field(value: &Value) -> String {
    match value {
        Value::String(s) if is_ambiguous(s) => format!("{s:?}"),
        other => other.to_string(),
    }
}

fn is_ambiguous(s: &str) -> bool {
    s.is_empty()
        || s == "NULL"
        || s.trim() != s
        || s.contains(',')
        || s.contains('"')
        || s.contains('=')
        || s.chars().any(char::is_control)
}

fn row_count_footer(rows: &RowSet) -> String {
    match rows.len() {
        1 => "(1 row)".to_string(),
        n => format!("({n} rows)"),
    }
}

fn render_json(result: &ResultSet) -> serde_json::Result<String> {
    let value = match result {
        ResultSet::AffectedCount(count) => json!({ "affected_rows": count }),
        ResultSet::Rows(rows) => serde_json::Value::Array(
            rows.records()
                .map(|record| {
                    let object: serde_json::Map<String, serde_json::Value> = record
                        .fields()
                        .map(|(name, value)| (name.to_string(), value.to_json()))
                        .collect();
                    serde_json::Value::Object(object)
                })
                .collect(),
        ),
    };
    serde_json::to_string_pretty(&value)
}
