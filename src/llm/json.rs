use serde_json::{Map, Value};
use tracing::debug;

/// Parses an LLM response as a JSON object, stripping one surrounding
/// markdown code fence if present. Returns None when the text is empty or
/// does not decode to an object; callers apply their own recovery policy.
pub fn parse_json_response(text: &str) -> Option<Map<String, Value>> {
    let mut text = text.trim();
    if text.is_empty() {
        return None;
    }

    let stripped;
    if text.starts_with("```") {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut end_idx = lines.len() - 1;
        for i in (1..lines.len()).rev() {
            if lines[i].trim() == "```" {
                end_idx = i;
                break;
            }
        }
        stripped = lines[1..end_idx].join("\n");
        text = &stripped;
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) | Err(_) => {
            debug!("failed to parse LLM response as JSON object");
            None
        }
    }
}

/// String field lookup with a fallback.
pub fn get_str(map: &Map<String, Value>, key: &str, fallback: &str) -> String {
    match map.get(key) {
        Some(Value::String(s)) => s.clone(),
        _ => fallback.to_string(),
    }
}

/// Integer field lookup with a fallback; accepts JSON numbers only.
pub fn get_i64(map: &Map<String, Value>, key: &str, fallback: i64) -> i64 {
    match map.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(fallback),
        _ => fallback,
    }
}
