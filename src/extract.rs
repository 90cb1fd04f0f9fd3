// src/extract.rs
//! Lenient JSON extraction for external language-model responses.
//!
//! Both external services are asked to return bare JSON but routinely wrap it
//! in markdown code fences or surround it with prose. The fallback chain is:
//! strip any code fence, try a strict parse, then parse the substring between
//! the outermost delimiters for the expected top-level shape. Callers supply
//! the default for total failure.

use serde::de::DeserializeOwned;

/// Expected top-level shape of the response document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonShape {
    Array,
    Object,
}

impl JsonShape {
    fn delimiters(self) -> (char, char) {
        match self {
            JsonShape::Array => ('[', ']'),
            JsonShape::Object => ('{', '}'),
        }
    }
}

/// Strip an optional markdown code fence (with or without a language tag).
fn strip_code_fence(raw: &str) -> &str {
    raw.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Parse a semi-structured response into `T`, or `None` if every fallback fails.
pub fn lenient_json<T: DeserializeOwned>(raw: &str, shape: JsonShape) -> Option<T> {
    let content = strip_code_fence(raw);

    if let Ok(value) = serde_json::from_str::<T>(content) {
        return Some(value);
    }

    // Fall back to the substring between the first opening and last closing
    // delimiter, which drops leading/trailing prose the model added.
    let (open, close) = shape.delimiters();
    let start = content.find(open)?;
    let end = content.rfind(close)?;
    if end <= start {
        return None;
    }

    serde_json::from_str(&content[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn parses_bare_array() {
        let parsed: Vec<Value> = lenient_json(r#"[{"a": 1}, {"a": 2}]"#, JsonShape::Array).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn fenced_array_parses_same_as_unfenced() {
        let bare = r#"[{"title": "Strategy Lead"}]"#;
        let fenced = format!("```json\n{}\n```", bare);

        let a: Vec<Value> = lenient_json(bare, JsonShape::Array).unwrap();
        let b: Vec<Value> = lenient_json(&fenced, JsonShape::Array).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fence_without_language_tag() {
        let raw = "```\n{\"total_score\": 85}\n```";
        let parsed: Value = lenient_json(raw, JsonShape::Object).unwrap();
        assert_eq!(parsed["total_score"], 85);
    }

    #[test]
    fn extracts_array_embedded_in_prose() {
        let raw = "Here are the roles I found:\n[{\"title\": \"BD Manager\"}]\nLet me know!";
        let parsed: Vec<Value> = lenient_json(raw, JsonShape::Array).unwrap();
        assert_eq!(parsed[0]["title"], "BD Manager");
    }

    #[test]
    fn extracts_object_embedded_in_prose() {
        let raw = "Sure! {\"total_score\": 42} Hope this helps.";
        let parsed: Value = lenient_json(raw, JsonShape::Object).unwrap();
        assert_eq!(parsed["total_score"], 42);
    }

    #[test]
    fn garbage_yields_none() {
        assert!(lenient_json::<Vec<Value>>("no json here at all", JsonShape::Array).is_none());
        assert!(lenient_json::<Value>("still nothing", JsonShape::Object).is_none());
    }

    #[test]
    fn mismatched_delimiters_yield_none() {
        assert!(lenient_json::<Vec<Value>>("] backwards [", JsonShape::Array).is_none());
    }

    #[test]
    fn wrong_shape_is_not_coerced() {
        // An object response when an array was requested has no '[' to anchor on.
        assert!(lenient_json::<Vec<Value>>(r#"{"title": "x"}"#, JsonShape::Array).is_none());
    }
}
