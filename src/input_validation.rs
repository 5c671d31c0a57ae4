// src/input_validation.rs
// Bounded parsing of request bodies, query strings and dotted field paths.

use percent_encoding::percent_decode_str;
use serde_json::Value;

pub const MAX_LOGIN_BODY_BYTES: usize = 64 * 1024;
pub const MAX_GRAPHQL_BODY_BYTES: usize = 256 * 1024;
pub const MAX_FIELD_PATH_DEPTH: usize = 16;

pub fn enforce_body_size(body: &[u8], max_bytes: usize) -> Result<(), &'static str> {
    if body.len() > max_bytes {
        return Err("Payload too large");
    }
    Ok(())
}

pub fn parse_json_body(body: &[u8], max_bytes: usize) -> Result<Value, &'static str> {
    enforce_body_size(body, max_bytes)?;
    serde_json::from_slice::<Value>(body).map_err(|_| "Invalid JSON")
}

/// `application/x-www-form-urlencoded` into ordered pairs.
pub fn parse_form_body(body: &[u8], max_bytes: usize) -> Result<Vec<(String, String)>, &'static str> {
    enforce_body_size(body, max_bytes)?;
    let text = std::str::from_utf8(body).map_err(|_| "Invalid form encoding")?;
    Ok(text
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_form_component(key), decode_form_component(value))
        })
        .collect())
}

fn decode_form_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().to_string()
}

pub fn query_param(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let k = parts.next()?;
        if decode_form_component(k) != key {
            return None;
        }
        let raw = parts.next().unwrap_or("");
        Some(decode_form_component(raw))
    })
}

/// Resolves `a.b.c` inside a JSON document. Strings come back verbatim,
/// numbers and booleans in their JSON text form; objects, arrays and null
/// do not resolve.
pub fn json_path_str(root: &Value, path: &str) -> Option<String> {
    json_path(root, path).and_then(|value| match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

pub fn json_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed.split('.').count() > MAX_FIELD_PATH_DEPTH {
        return None;
    }
    trimmed
        .split('.')
        .try_fold(root, |node, segment| node.get(segment))
}
