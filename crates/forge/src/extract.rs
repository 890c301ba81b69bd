//! JSON extraction from free-form model responses
//!
//! Model output often wraps the object in prose or markdown fences, or
//! truncates it. Strategies run in order and the first candidate that parses
//! as a JSON object wins:
//! 1. the whole trimmed text
//! 2. each fenced code block
//! 3. forward brace matching from each `{`
//! 4. backward brace matching from each `}`

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("Model response was empty")]
    Empty,

    #[error("No JSON object found in model response ({0} chars)")]
    NotFound(usize),
}

/// Extract the first JSON object embedded in `text`
pub fn extract_json_object(text: &str) -> Result<Value, ExtractError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExtractError::Empty);
    }

    if let Some(v) = parse_object(trimmed) {
        return Ok(v);
    }

    for caps in FENCED.captures_iter(trimmed) {
        if let Some(v) = caps.get(1).and_then(|m| parse_object(m.as_str().trim())) {
            return Ok(v);
        }
    }

    let bytes = trimmed.as_bytes();
    for (start, _) in trimmed.match_indices('{') {
        if let Some(end) = match_forward(bytes, start) {
            if let Some(v) = parse_object(&trimmed[start..=end]) {
                return Ok(v);
            }
        }
    }

    for (end, _) in trimmed.rmatch_indices('}') {
        if let Some(start) = match_backward(bytes, end) {
            if let Some(v) = parse_object(&trimmed[start..=end]) {
                return Ok(v);
            }
        }
    }

    Err(ExtractError::NotFound(trimmed.len()))
}

fn parse_object(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

/// Index of the `}` closing the `{` at `start`, skipping braces inside strings
fn match_forward(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Index of the `{` opening the `}` at `end`, scanning right to left
fn match_backward(bytes: &[u8], end: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut i = end + 1;
    while i > 0 {
        i -= 1;
        let b = bytes[i];
        if b == b'"' && !is_escaped(bytes, i) {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match b {
            b'}' => depth += 1,
            b'{' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// A quote is escaped when preceded by an odd run of backslashes
fn is_escaped(bytes: &[u8], index: usize) -> bool {
    bytes[..index]
        .iter()
        .rev()
        .take_while(|&&b| b == b'\\')
        .count()
        % 2
        == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_object() {
        assert_eq!(extract_json_object(r#" {"a": 1} "#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_fenced_block_with_prose() {
        let text = "Here you go:\n```json\n{\"a\": [1, 2]}\n```\nLet me know!";
        assert_eq!(extract_json_object(text).unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"Sure! {"note": "use {{LINK}} here", "n": {"x": "}"}} trailing {"#;
        assert_eq!(
            extract_json_object(text).unwrap(),
            json!({"note": "use {{LINK}} here", "n": {"x": "}"}})
        );
    }

    #[test]
    fn test_recovers_object_after_unbalanced_prefix() {
        let text = r#"{ broken prefix {"ok": true}"#;
        assert_eq!(extract_json_object(text).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_escaped_quotes() {
        let text = r#"result: {"quote": "she said \"}\" loudly"}"#;
        assert_eq!(
            extract_json_object(text).unwrap(),
            json!({"quote": "she said \"}\" loudly"})
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(extract_json_object("   "), Err(ExtractError::Empty));
        assert!(matches!(
            extract_json_object("no json here [1, 2]"),
            Err(ExtractError::NotFound(_))
        ));
    }
}
