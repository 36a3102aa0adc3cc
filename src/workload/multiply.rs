use serde_json::{Number, Value};

use crate::workload::{error_value, WorkloadError};

/// Element-wise product of lists `a` and `b`.
///
/// `{"a": [1, 2], "b": [3, 4]}` becomes `{"c": [3, 8]}`. A missing list is
/// treated as empty. Every failure is reported as `{"error": ...}` rather
/// than a non-zero exit, so it still produces a commitment.
pub fn process(input: &str) -> Value {
    match multiply(input) {
        Ok(value) => value,
        Err(e) => error_value(e),
    }
}

fn multiply(input: &str) -> Result<Value, WorkloadError> {
    let data: Value = serde_json::from_str(input)?;
    let object = data
        .as_object()
        .ok_or_else(|| WorkloadError::Shape("input must be a JSON object".to_string()))?;

    let a = list(object.get("a"), "a")?;
    let b = list(object.get("b"), "b")?;
    if a.len() != b.len() {
        return Err(WorkloadError::Shape("Lists must be of same length".to_string()));
    }

    let c = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| product(x, y))
        .collect::<Result<Vec<Value>, WorkloadError>>()?;

    Ok(serde_json::json!({ "c": c }))
}

fn list<'a>(value: Option<&'a Value>, name: &str) -> Result<&'a [Value], WorkloadError> {
    match value {
        None => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(WorkloadError::Shape(format!("'{}' must be a list", name))),
    }
}

fn product(x: &Value, y: &Value) -> Result<Value, WorkloadError> {
    let (Value::Number(x), Value::Number(y)) = (x, y) else {
        return Err(WorkloadError::Shape(format!(
            "unsupported operand types for *: {} and {}",
            x, y
        )));
    };

    if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
        if let Some(p) = x.checked_mul(y) {
            return Ok(Value::Number(p.into()));
        }
    }

    let p = x.as_f64().unwrap_or(f64::NAN) * y.as_f64().unwrap_or(f64::NAN);
    Number::from_f64(p)
        .map(Value::Number)
        .ok_or_else(|| WorkloadError::Shape("product is not a finite number".to_string()))
}
