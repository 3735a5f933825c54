use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use serde_json::Value;

use crate::models::{RawValue, Row};

/// Dispatches on the file extension; anything but `.json` is read as CSV.
pub fn load_rows(path: &Path) -> anyhow::Result<Vec<Row>> {
    let is_json = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"));

    let rows = if is_json { read_json(path)? } else { read_csv(path)? };
    tracing::info!(path = %path.display(), rows = rows.len(), "rows loaded");
    Ok(rows)
}

/// Header row names the fields. Blank cells are stored as nulls, short records
/// keep the fields they have and unreadable records are skipped.
pub fn read_csv(path: &Path) -> anyhow::Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("failed to read the header row of {}", path.display()))?
        .clone();

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    record = index + 1,
                    %error,
                    "skipping unreadable csv record"
                );
                continue;
            }
        };

        let row: Row = headers
            .iter()
            .zip(record.iter())
            .filter(|(field, _)| !field.is_empty())
            .map(|(field, value)| {
                let value = if value.is_empty() {
                    RawValue::Null
                } else {
                    RawValue::Text(value.to_string())
                };
                (field, value)
            })
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

/// Expects a top-level array of objects; other array items are skipped.
pub fn read_json(path: &Path) -> anyhow::Result<Vec<Row>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let items: Vec<Value> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{} is not a JSON array", path.display()))?;

    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(object) = item else {
            tracing::warn!(path = %path.display(), item = index, "skipping non-object json item");
            continue;
        };
        rows.push(
            object
                .into_iter()
                .map(|(field, value)| (field.trim().to_string(), json_value(value)))
                .collect(),
        );
    }

    Ok(rows)
}

fn json_value(value: Value) -> RawValue {
    match value {
        Value::Null => RawValue::Null,
        Value::Number(number) => number.as_f64().map_or(RawValue::Null, RawValue::Number),
        Value::String(text) => RawValue::Text(text),
        Value::Bool(flag) => RawValue::Text(flag.to_string()),
        other => RawValue::Text(other.to_string()),
    }
}
