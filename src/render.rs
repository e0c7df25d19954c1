//! Terminal rendering for result sets and schema views.

use clap::ValueEnum;
use colored::*;

use crate::execute::{ExecutionOutcome, ResultSet, Value};
use crate::introspect::Schema;

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

pub fn print_outcome(outcome: &ExecutionOutcome, format: OutputFormat) {
    match outcome {
        ExecutionOutcome::Affected(n) => {
            println!("{} {} row(s) affected", "✓".green(), n);
        }
        ExecutionOutcome::Rows(rs) => match format {
            OutputFormat::Table => print_table(rs),
            OutputFormat::Json => print_json(rs),
        },
    }
}

fn print_table(rs: &ResultSet) {
    if rs.rows.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    // Column widths sized to the widest cell.
    let mut widths: Vec<usize> = rs.columns.iter().map(|c| c.len()).collect();
    for row in &rs.rows {
        for (i, value) in row.iter().enumerate() {
            let len = value.to_string().len();
            if len > widths[i] {
                widths[i] = len;
            }
        }
    }

    let header: Vec<String> = rs
        .columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{c:<width$}", width = *w))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    let separator: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", separator.join("─┼─").dimmed());

    for row in &rs.rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v.to_string(), width = *w))
            .collect();
        println!("{}", cells.join(" │ "));
    }

    println!();
    if rs.truncated() {
        println!(
            "{} showing first {} of {} row(s)",
            "⚠".yellow(),
            rs.rows.len().to_string().cyan(),
            rs.total_rows
        );
    } else {
        println!("{} row(s) returned", rs.rows.len().to_string().cyan());
    }
}

fn print_json(rs: &ResultSet) {
    let rows: Vec<Vec<serde_json::Value>> = rs
        .rows
        .iter()
        .map(|row| row.iter().map(value_to_json).collect())
        .collect();
    let doc = serde_json::json!({
        "columns": rs.columns,
        "rows": rows,
        "total_rows": rs.total_rows,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&doc).unwrap_or_default()
    );
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => (*b).into(),
        Value::Int(i) => (*i).into(),
        Value::Float(x) => serde_json::Number::from_f64(*x)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => s.clone().into(),
    }
}

/// Schema-browsing view.
pub fn print_schema(schema: &Schema) {
    if schema.tables.is_empty() {
        println!("{}", "(no tables)".dimmed());
        return;
    }
    for table in &schema.tables {
        println!("{}", table.name.white().bold());
        for column in &table.columns {
            println!("  {} {}", column.name, column.data_type.dimmed());
        }
    }
    if schema.is_truncated() {
        println!(
            "{}",
            format!(
                "… {} more table(s) not shown",
                schema.total_tables - schema.tables.len()
            )
            .yellow()
        );
    }
}
