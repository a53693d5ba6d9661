//! In-process JSON to CSV converter.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use super::support::{ensure_extension, ensure_parent_dir, input_size};
use super::traits::Converter;
use super::types::{ConversionResult, ConvertOptions, ConverterInfo};

pub const ID: &str = "json-to-csv";

const INPUT_EXTENSIONS: &[&str] = &[".json"];

/// Converts an array of JSON objects (or a single object) into CSV.
///
/// Nested objects are flattened into dot-separated columns up to the
/// `flattenDepth` option (default 0). Deeper values, and arrays, are written
/// as JSON text.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonToCsvConverter;

impl JsonToCsvConverter {
    pub fn new() -> Self {
        Self
    }
}

/// Renders rows into CSV text, returning the text and the header row.
pub fn render_csv(rows: &[Value], flatten_depth: usize) -> Result<(String, Vec<String>), String> {
    if rows.is_empty() {
        return Err("JSON array is empty".to_string());
    }

    let mut headers = Vec::new();
    let mut seen = HashSet::new();
    for row in rows {
        collect_headers(row, "", &mut headers, &mut seen, flatten_depth, 0);
    }
    if headers.is_empty() {
        return Err("JSON rows contain no fields".to_string());
    }

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|h| escape_cell(h))
            .collect::<Vec<_>>()
            .join(","),
    );
    for row in rows {
        let cells: Vec<String> = headers
            .iter()
            .map(|header| escape_cell(&cell_text(row, header)))
            .collect();
        lines.push(cells.join(","));
    }
    Ok((lines.join("\n"), headers))
}

fn collect_headers(
    value: &Value,
    prefix: &str,
    headers: &mut Vec<String>,
    seen: &mut HashSet<String>,
    max_depth: usize,
    depth: usize,
) {
    let mut add = |key: String| {
        if !key.is_empty() && seen.insert(key.clone()) {
            headers.push(key);
        }
    };

    let object = match value {
        Value::Object(object) if depth <= max_depth => object,
        _ => {
            add(prefix.to_string());
            return;
        }
    };
    if object.is_empty() {
        add(prefix.to_string());
        return;
    }

    for (key, child) in object {
        let column = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match child {
            Value::Object(_) if depth < max_depth => {
                collect_headers(child, &column, headers, seen, max_depth, depth + 1)
            }
            _ => {
                if seen.insert(column.clone()) {
                    headers.push(column);
                }
            }
        }
    }
}

/// Looks up a dot-separated column in `row` and renders it as cell text.
fn cell_text(row: &Value, column: &str) -> String {
    let value = match row.get(column) {
        Some(value) => Some(value),
        None => column
            .split('.')
            .try_fold(row, |current, key| current.as_object().and_then(|o| o.get(key))),
    };
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Quotes a cell when it contains a quote, comma or line break.
fn escape_cell(text: &str) -> String {
    if text.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn file_name(path: &Path) -> Value {
    Value::from(
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
    )
}

#[async_trait]
impl Converter for JsonToCsvConverter {
    fn info(&self) -> ConverterInfo {
        ConverterInfo::new(ID, "JSON to CSV")
            .inputs(INPUT_EXTENSIONS)
            .outputs(&["csv"])
    }

    async fn convert(&self, input: &Path, output: &Path, options: &ConvertOptions) -> ConversionResult {
        let mut metadata = Map::new();

        let input_bytes = match input_size(input).await {
            Ok(size) => size,
            Err(e) => return ConversionResult::failed_with(e, metadata),
        };
        metadata.insert("inputSize".to_string(), Value::from(input_bytes));
        if let Err(e) = ensure_extension(input, INPUT_EXTENSIONS) {
            return ConversionResult::failed_with(e, metadata);
        }

        let text = match tokio::fs::read_to_string(input).await {
            Ok(text) => text,
            Err(e) => return ConversionResult::failed_with(format!("Failed to read input: {}", e), metadata),
        };
        let parsed: Value = match serde_json::from_str(text.trim_start_matches('\u{feff}')) {
            Ok(value) => value,
            Err(e) => return ConversionResult::failed_with(format!("Invalid JSON: {}", e), metadata),
        };
        let rows = match parsed {
            Value::Array(rows) => rows,
            object @ Value::Object(_) => vec![object],
            _ => {
                return ConversionResult::failed_with("JSON must be an array or an object", metadata)
            }
        };

        let flatten_depth = options.param_u64("flattenDepth").unwrap_or(0) as usize;
        let (csv, headers) = match render_csv(&rows, flatten_depth) {
            Ok(rendered) => rendered,
            Err(e) => return ConversionResult::failed_with(e, metadata),
        };

        if let Err(e) = ensure_parent_dir(output).await {
            return ConversionResult::failed_with(
                format!("Failed to create output directory: {}", e),
                metadata,
            );
        }
        if let Err(e) = tokio::fs::write(output, csv.as_bytes()).await {
            return ConversionResult::failed_with(format!("Failed to write output: {}", e), metadata);
        }

        metadata.insert("inputFile".to_string(), file_name(input));
        metadata.insert("outputFile".to_string(), file_name(output));
        metadata.insert("outputSize".to_string(), Value::from(csv.len() as u64));
        metadata.insert("rowsProcessed".to_string(), Value::from(rows.len() as u64));
        metadata.insert("columnsProcessed".to_string(), Value::from(headers.len() as u64));
        metadata.insert(
            "headers".to_string(),
            Value::Array(headers.into_iter().map(Value::String).collect()),
        );
        metadata.insert("timestamp".to_string(), Value::from(Utc::now().to_rfc3339()));

        info!(rows = rows.len(), bytes = csv.len(), "JSON converted to CSV");
        ConversionResult::ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_flat_rows() {
        let rows = vec![
            json!({"name": "Ana", "age": 31}),
            json!({"name": "Bo, Jr.", "city": "Porto"}),
        ];
        let (csv, headers) = render_csv(&rows, 0).unwrap();
        assert_eq!(headers, vec!["name", "age", "city"]);
        assert_eq!(csv, "name,age,city\nAna,31,\n\"Bo, Jr.\",,Porto");
    }

    #[test]
    fn test_render_nested_without_flattening() {
        let rows = vec![json!({"id": 1, "tags": ["a", "b"], "address": {"zip": "1000"}})];
        let (csv, _) = render_csv(&rows, 0).unwrap();
        assert_eq!(
            csv,
            "id,tags,address\n1,\"[\"\"a\"\",\"\"b\"\"]\",\"{\"\"zip\"\":\"\"1000\"\"}\""
        );
    }

    #[test]
    fn test_render_flattened() {
        let rows = vec![json!({"id": 1, "address": {"zip": "1000", "geo": {"lat": 1.5}}})];
        let (csv, headers) = render_csv(&rows, 1).unwrap();
        assert_eq!(headers, vec!["id", "address.zip", "address.geo"]);
        assert_eq!(csv, "id,address.zip,address.geo\n1,1000,\"{\"\"lat\"\":1.5}\"");
    }

    #[test]
    fn test_render_literal_dotted_key() {
        let rows = vec![json!({"a.b": "direct", "n": null})];
        let (csv, _) = render_csv(&rows, 0).unwrap();
        assert_eq!(csv, "a.b,n\ndirect,");
    }

    #[test]
    fn test_render_rejects_empty_input() {
        assert_eq!(render_csv(&[], 0).unwrap_err(), "JSON array is empty");
        assert!(render_csv(&[json!(1), json!("x")], 0).is_err());
    }

    #[tokio::test]
    async fn test_convert_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.json");
        tokio::fs::write(&input, r#"[{"a": 1, "b": "x\"y"}]"#).await.unwrap();
        let output = dir.path().join("nested").join("data.csv");

        let result = JsonToCsvConverter::new()
            .convert(&input, &output, &ConvertOptions::default())
            .await;

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.metadata["rowsProcessed"], json!(1));
        assert_eq!(result.metadata["headers"], json!(["a", "b"]));
        let csv = tokio::fs::read_to_string(&output).await.unwrap();
        assert_eq!(csv, "a,b\n1,\"x\"\"y\"");
    }

    #[tokio::test]
    async fn test_convert_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.json");
        tokio::fs::write(&input, "{not json").await.unwrap();

        let result = JsonToCsvConverter::new()
            .convert(&input, &dir.path().join("out.csv"), &ConvertOptions::default())
            .await;
        assert!(!result.success);
        assert!(result.errors[0].starts_with("Invalid JSON"));

        tokio::fs::write(&input, "42").await.unwrap();
        let result = JsonToCsvConverter::new()
            .convert(&input, &dir.path().join("out.csv"), &ConvertOptions::default())
            .await;
        assert_eq!(result.errors, vec!["JSON must be an array or an object"]);
    }
}
