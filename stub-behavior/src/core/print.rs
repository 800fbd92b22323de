//! Human-readable rendering used in failure messages.

use crate::core::value::{Array, Function, Value};

/// Name used when a double or function has no inferable name.
pub const DEFAULT_DOUBLE_NAME: &str = "stub";

/// Best-effort function name, falling back to `fallback`.
pub fn function_name(function: &Function, fallback: &str) -> String {
    function.name().unwrap_or(fallback).to_string()
}

/// Printable string for a value, following string-conversion rules.
///
/// An array reached again while it is being printed renders as empty.
pub fn value_to_string(value: &Value) -> String {
    render(value, &mut Vec::new())
}

/// Join values the way list joining does: `null` and `undefined` print as empty.
pub fn join_values(values: &[Value], separator: &str) -> String {
    join_within(values, separator, &mut Vec::new())
}

fn render(value: &Value, open: &mut Vec<Array>) -> String {
    match value {
        Value::Undefined => "undefined".to_string(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => number_to_string(*n),
        Value::Str(s) => s.clone(),
        Value::Symbol(symbol) => symbol.to_string(),
        Value::Array(array) => {
            if open.iter().any(|seen| seen.ptr_eq(array)) {
                return String::new();
            }
            open.push(array.clone());
            let joined = join_within(&array.to_vec(), ",", open);
            open.pop();
            joined
        }
        Value::Object(_) | Value::Host(_) => "[object Object]".to_string(),
        Value::Function(function) => {
            format!("[Function: {}]", function.name().unwrap_or("anonymous"))
        }
        Value::Error(error) if error.message().is_empty() => error.name().to_string(),
        Value::Error(error) => format!("{}: {}", error.name(), error.message()),
        Value::Promise(_) => "[object Promise]".to_string(),
    }
}

fn join_within(values: &[Value], separator: &str, open: &mut Vec<Array>) -> String {
    values
        .iter()
        .map(|value| match value {
            Value::Undefined | Value::Null => String::new(),
            other => render(other, open),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 {
        return format!("{n:.0}");
    }
    n.to_string()
}
