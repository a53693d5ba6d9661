//! CSV to JSON, written in the legacy module shape.
//!
//! The convert method returns a plain object without a `success` key; the
//! registry's legacy adapter turns it into a regular result.

use anyhow::{bail, Context};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

use super::legacy::LegacyModule;
use super::support::ensure_parent_dir;

/// Module name; the adapter derives the id `csv-to-json` from it.
pub const MODULE_NAME: &str = "csvToJson";

/// Builds the legacy module.
pub fn module() -> LegacyModule {
    LegacyModule::new(MODULE_NAME)
        .describe("Converts CSV tables into a JSON array of objects")
        .supported_extensions(&[".csv"])
        .output_types(&["json"])
        .method(
            "convertCsvToJson",
            |input: PathBuf, output: PathBuf, options: Map<String, Value>| async move {
                convert_csv_to_json(&input, &output, &options).await
            },
        )
}

async fn convert_csv_to_json(
    input: &Path,
    output: &Path,
    options: &Map<String, Value>,
) -> anyhow::Result<Value> {
    let text = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("File not found: {}", input.display()))?;

    let delimiter = options
        .get("delimiter")
        .and_then(Value::as_str)
        .and_then(|d| d.chars().next())
        .unwrap_or(',');

    let mut records = parse_csv(text.trim_start_matches('\u{feff}'), delimiter)?.into_iter();
    let Some(headers) = records.next() else {
        bail!("CSV file is empty");
    };

    let rows: Vec<Value> = records
        .map(|record| {
            let object: Map<String, Value> = headers
                .iter()
                .enumerate()
                .map(|(i, header)| {
                    let cell = record.get(i).cloned().unwrap_or_default();
                    (header.trim().to_string(), Value::String(cell))
                })
                .collect();
            Value::Object(object)
        })
        .collect();

    let body = serde_json::to_string_pretty(&rows).context("Failed to serialize rows")?;
    ensure_parent_dir(output)
        .await
        .context("Failed to create output directory")?;
    tokio::fs::write(output, body.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    Ok(json!({
        "outputPath": output.display().to_string(),
        "rowsProcessed": rows.len(),
        "columns": headers,
        "outputSize": body.len(),
    }))
}

/// Splits CSV text into records. Quoted fields may contain the delimiter,
/// doubled quotes and line breaks. Blank lines are skipped.
pub fn parse_csv(text: &str, delimiter: char) -> anyhow::Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                if !(record.len() == 1 && record[0].is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            c if c == delimiter => record.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }

    if in_quotes {
        bail!("Unterminated quoted field");
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}
