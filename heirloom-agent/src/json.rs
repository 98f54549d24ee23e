//! Lenient JSON extraction from model output.
//!
//! Models wrap JSON in markdown fences or prose even when asked not to.

use serde_json::Value;

/// Find and parse the first JSON object or array in `text`.
pub fn extract_json(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }

    if let Some(inner) = fenced_block(text) {
        if let Ok(value) = serde_json::from_str(inner.trim()) {
            return Some(value);
        }
    }

    // Widest bracketed span, objects before arrays
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // Skip a language tag such as `json`
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// Read a number that may have been emitted as a string.
pub fn lenient_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_and_fenced() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(json!({"a": 1})));
        assert_eq!(
            extract_json("Here you go:\n```json\n{\"a\": 2}\n```\nThanks"),
            Some(json!({"a": 2}))
        );
        assert_eq!(extract_json("```\n[1, 2]\n```"), Some(json!([1, 2])));
    }

    #[test]
    fn test_embedded_in_prose() {
        assert_eq!(
            extract_json("The result is {\"score\": 40} as requested."),
            Some(json!({"score": 40}))
        );
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("{broken"), None);
    }

    #[test]
    fn test_lenient_numbers() {
        assert_eq!(lenient_f64(&json!(12.5)), Some(12.5));
        assert_eq!(lenient_f64(&json!("30%")), Some(30.0));
        assert_eq!(lenient_f64(&json!(null)), None);
    }
}
