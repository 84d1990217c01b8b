//! Metadata templates
//!
//! Action metadata may reference the run's trigger payload with `{path}`
//! placeholders, e.g. `"You received {comment.amount} from {comment.link}"`.
//! Paths are dot-separated object keys or array indices.

use serde_json::Value;

/// Renders `text`, substituting every `{path}` with the value found at that
/// path in `values`
///
/// String values are inserted as-is; any other JSON value is inserted in its
/// compact JSON form. Placeholders that do not resolve, and an unterminated
/// `{`, are kept literally.
pub fn render(text: &str, values: &Value) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];

        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let path = &after[..end];
        if path.contains('{') {
            // "{a {b}" - the first brace is literal
            out.push('{');
            rest = after;
            continue;
        }

        match lookup(values, path) {
            Some(value) => out.push_str(&value),
            None => {
                out.push('{');
                out.push_str(path);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Resolves a dotted path, descending into string values that hold JSON
fn lookup(values: &Value, path: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }

    let mut current = values.clone();
    for key in path.split('.') {
        if let Value::String(raw) = &current {
            if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
                current = parsed;
            }
        }

        current = match &current {
            Value::Object(map) => map.get(key)?.clone(),
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?.clone(),
            _ => return None,
        };
    }

    Some(match current {
        Value::String(s) => s,
        other => other.to_string(),
    })
}
