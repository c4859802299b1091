//! JavaScript literal rendering
//!
//! Values are rendered as JSON, which is also a valid JavaScript expression,
//! so strings with quotes, backslashes, newlines or control characters survive
//! the trip into generated source unchanged. The one exception is an object key
//! named `__proto__`, which is emitted as a computed key so it stays an own
//! property instead of replacing the object's prototype.

use serde_json::{Map, Value};

use crate::browser::Headers;

/// Render a string literal
#[must_use]
pub fn string(value: &str) -> String {
    Value::String(value.to_owned()).to_string()
}

/// Render a string literal, or `undefined` when absent
#[must_use]
pub fn optional_string(value: Option<&str>) -> String {
    value.map_or_else(|| "undefined".to_string(), string)
}

/// Render a header map as a multi-line object literal
#[must_use]
pub fn headers(headers: &Headers) -> String {
    let object: Map<String, Value> = headers
        .iter()
        .map(|(name, value)| (name.clone(), Value::String(value.clone())))
        .collect();
    pretty(&Value::Object(object))
}

/// Render structured data as a multi-line literal, two spaces per level
#[must_use]
pub fn pretty(value: &Value) -> String {
    let mut out = String::new();
    push_pretty(&mut out, value, 0);
    out
}

fn push_pretty(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Array(items) if !items.is_empty() => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                push_entry_start(out, i, depth + 1);
                push_pretty(out, item, depth + 1);
            }
            push_close(out, depth, ']');
        }
        Value::Object(map) if !map.is_empty() => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                push_entry_start(out, i, depth + 1);
                out.push_str(&object_key(key));
                out.push_str(": ");
                push_pretty(out, item, depth + 1);
            }
            push_close(out, depth, '}');
        }
        // Scalars and empty containers
        _ => out.push_str(&value.to_string()),
    }
}

fn push_entry_start(out: &mut String, index: usize, depth: usize) {
    if index > 0 {
        out.push(',');
    }
    out.push('\n');
    out.push_str(&"  ".repeat(depth));
}

fn push_close(out: &mut String, depth: usize, close: char) {
    out.push('\n');
    out.push_str(&"  ".repeat(depth));
    out.push(close);
}

/// Object key literal; `__proto__` must be computed to stay an own property
fn object_key(key: &str) -> String {
    if key == "__proto__" {
        format!("[{}]", string(key))
    } else {
        string(key)
    }
}

/// Indent every line after the first
///
/// Used when a multi-line literal is spliced into an already-indented line.
#[must_use]
pub fn indent_tail(text: &str, indent: &str) -> String {
    let mut lines = text.lines();
    let mut out = lines.next().unwrap_or_default().to_string();
    for line in lines {
        out.push('\n');
        out.push_str(indent);
        out.push_str(line);
    }
    out
}
