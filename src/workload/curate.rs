use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::workload::{error_value, WorkloadError};

const SHAPE_ERROR: &str = "Input data must be a list of records or contain a list";

/// Load the curation input: fetched when `source` is an http(s) URL,
/// parsed as inline JSON otherwise.
pub async fn load(source: &str) -> Result<Value, WorkloadError> {
    if source.starts_with("http://") || source.starts_with("https://") {
        tracing::debug!(url = source, "Fetching curation input");
        let value = reqwest::get(source)
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(value)
    } else {
        Ok(serde_json::from_str(source)?)
    }
}

/// Load and clean in one step, folding every failure into `{"error": ...}`.
pub async fn run(source: &str) -> Value {
    match load(source).await {
        Ok(data) => clean(data),
        Err(e) => error_value(e),
    }
}

/// Drop non-object items, records with any null field, and duplicates.
///
/// `data` is either a list of records or an object with exactly one
/// list-valued field holding them. Order of first occurrence is kept.
/// Two records are duplicates when they have the same keys and the same
/// textual value for each key.
pub fn clean(data: Value) -> Value {
    let records = match extract_records(data) {
        Ok(records) => records,
        Err(e) => return error_value(e),
    };

    let mut seen: HashSet<Vec<(String, String)>> = HashSet::new();
    let cleaned: Vec<Value> = records
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(record) => Some(record),
            _ => None,
        })
        .filter(|record| !record.values().any(Value::is_null))
        .filter(|record| seen.insert(fingerprint(record)))
        .map(Value::Object)
        .collect();

    Value::Array(cleaned)
}

fn extract_records(data: Value) -> Result<Vec<Value>, WorkloadError> {
    match data {
        Value::Array(items) => Ok(items),
        Value::Object(map) => {
            let mut lists = map.into_iter().filter_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            });
            match (lists.next(), lists.next()) {
                (Some(items), None) => Ok(items),
                _ => Err(WorkloadError::Shape(SHAPE_ERROR.to_string())),
            }
        }
        _ => Err(WorkloadError::Shape(SHAPE_ERROR.to_string())),
    }
}

fn fingerprint(record: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = record
        .iter()
        .map(|(k, v)| (k.clone(), textual(v)))
        .collect();
    pairs.sort();
    pairs
}

/// Textual form of a scalar, with `True`/`False`/`None` for the keywords.
/// Containers fall back to their JSON.
fn textual(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Null => "None".to_string(),
        other => other.to_string(),
    }
}
