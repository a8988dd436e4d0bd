use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Drops nulls, empty strings, zeros, `false`, and containers left empty
/// after pruning. Returns `None` when nothing survives.
pub fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Bool(flag) => flag.then_some(Value::Bool(true)),
        Value::Number(number) => {
            let is_zero = number.as_f64().is_some_and(|n| n == 0.0);
            (!is_zero).then_some(Value::Number(number))
        }
        Value::String(text) => (!text.is_empty()).then_some(Value::String(text)),
        Value::Array(items) => {
            let kept: Vec<Value> = items.into_iter().filter_map(prune).collect();
            (!kept.is_empty()).then_some(Value::Array(kept))
        }
        Value::Object(fields) => {
            let kept: Map<String, Value> = fields
                .into_iter()
                .filter_map(|(key, value)| prune(value).map(|value| (key, value)))
                .collect();
            (!kept.is_empty()).then_some(Value::Object(kept))
        }
    }
}

pub fn to_pruned_json<T: Serialize>(value: &T) -> Result<String> {
    let raw = serde_json::to_value(value).context("failed to encode output")?;
    let pruned = prune(raw).unwrap_or(Value::Null);
    serde_json::to_string_pretty(&pruned).context("failed to render output")
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", to_pruned_json(value)?);
    Ok(())
}

pub fn print_error(err: &anyhow::Error) {
    eprintln!("{}", json!({ "error": format!("{err:#}") }));
}
