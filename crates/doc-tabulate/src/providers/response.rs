//! Parsing of model text output into JSON

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::types::{dedup_headers, Record};

fn code_fence() -> &'static Regex {
    static CODE_FENCE: OnceLock<Regex> = OnceLock::new();
    CODE_FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("code fence pattern is valid")
    })
}

/// Strip a Markdown code fence if the model wrapped its answer in one
pub fn strip_code_fences(text: &str) -> &str {
    match code_fence().captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}

/// Parse model output as JSON, tolerating code fences
pub fn parse_json_payload(text: &str) -> Result<Value> {
    let payload = strip_code_fences(text);
    if payload.is_empty() {
        return Err(Error::malformed("empty response"));
    }
    serde_json::from_str(payload).map_err(|e| {
        let preview: String = payload.chars().take(120).collect();
        Error::malformed(format!("response is not valid JSON ({}): {}", e, preview))
    })
}

/// Parse an extraction answer into a record
pub fn parse_record(text: &str) -> Result<Record> {
    Record::from_json(parse_json_payload(text)?)
}

/// Parse a header suggestion: `{"headers": [...]}` or a bare array
pub fn parse_headers(text: &str) -> Result<Vec<String>> {
    let value = parse_json_payload(text)?;
    let list = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("headers") {
            Some(Value::Array(items)) => items,
            _ => return Err(Error::malformed("expected a \"headers\" array")),
        },
        _ => return Err(Error::malformed("expected a list of headers")),
    };

    let names = list.into_iter().filter_map(|item| match item {
        Value::String(s) => Some(s),
        _ => None,
    });
    Ok(dedup_headers(names))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("Here you go:\n```\n[1]\n```\nthanks"), "[1]");
        assert_eq!(strip_code_fences("  {\"a\": 1} \n"), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_record_from_fenced_json() {
        let record = parse_record("```json\n{\"Total\": \"42.00\", \"Vendor\": null}\n```").unwrap();
        assert_eq!(record.get("Total"), Some("42.00"));
        assert_eq!(record.get("Vendor"), None);
    }

    #[test]
    fn test_parse_record_rejects_garbage() {
        assert!(matches!(parse_record("I could not read it"), Err(Error::MalformedResponse(_))));
        assert!(matches!(parse_record(""), Err(Error::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_headers_shapes() {
        let wrapped = parse_headers(r#"{"headers": ["Date", "Total", "Date", " "]}"#).unwrap();
        assert_eq!(wrapped, vec!["Date", "Total"]);

        let bare = parse_headers(r#"["Vendor", 3, "Amount"]"#).unwrap();
        assert_eq!(bare, vec!["Vendor", "Amount"]);

        assert!(parse_headers(r#"{"columns": []}"#).is_err());
    }
}
