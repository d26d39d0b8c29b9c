//! Extracted records and output rows

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

use crate::error::{Error, Result};

/// Value written for a content header the model left empty
pub const MISSING_VALUE: &str = "N/A";

/// Structured fields returned by the extraction service for one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: HashMap<String, Option<String>>,
}

impl Record {
    /// Empty record (metadata-only rows)
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a JSON object returned by the model.
    ///
    /// Strings are kept verbatim, numbers and booleans use their JSON text,
    /// `null` marks a missing field, nested values are kept as compact JSON.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let object = match value {
            serde_json::Value::Object(map) => map,
            // Some models wrap a single record in a one-element array
            serde_json::Value::Array(mut items) if items.len() == 1 && items[0].is_object() => {
                match items.pop() {
                    Some(serde_json::Value::Object(map)) => map,
                    _ => return Err(Error::malformed("expected a JSON object")),
                }
            }
            other => {
                return Err(Error::malformed(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let fields = object
            .into_iter()
            .map(|(key, value)| (key.trim().to_string(), json_to_cell(value)))
            .collect();

        Ok(Self { fields })
    }

    /// Set a field
    pub fn insert(&mut self, header: impl Into<String>, value: Option<String>) {
        self.fields.insert(header.into(), value);
    }

    /// Value for a header; `None` when absent, null or blank
    pub fn get(&self, header: &str) -> Option<&str> {
        self.fields
            .get(header)
            .and_then(|v| v.as_deref())
            .filter(|v| !v.trim().is_empty())
    }

    /// Number of fields returned
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the service returned no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn json_to_cell(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        nested => Some(nested.to_string()),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// One output row: every schema header, in schema order, mapped to a value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(String, String)>,
}

impl Row {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, header: impl Into<String>, value: impl Into<String>) {
        self.cells.push((header.into(), value.into()));
    }

    /// Value for a header
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    /// Cells in schema order
    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }

    /// Values in schema order
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(_, v)| v.as_str())
    }
}

// Serialized as a JSON object; keys keep schema order
impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (header, value) in &self.cells {
            map.serialize_entry(header, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_from_json_object() {
        let record = Record::from_json(json!({
            "Vendor": "ACME",
            "Total": 41.5,
            "Paid": true,
            "Due Date": null,
            "Items": ["a", "b"],
            "Notes": "  "
        }))
        .unwrap();

        assert_eq!(record.get("Vendor"), Some("ACME"));
        assert_eq!(record.get("Total"), Some("41.5"));
        assert_eq!(record.get("Paid"), Some("true"));
        assert_eq!(record.get("Due Date"), None);
        assert_eq!(record.get("Items"), Some(r#"["a","b"]"#));
        assert_eq!(record.get("Notes"), None);
        assert_eq!(record.get("Missing"), None);
    }

    #[test]
    fn test_record_unwraps_single_element_array() {
        let record = Record::from_json(json!([{ "Total": "10" }])).unwrap();
        assert_eq!(record.get("Total"), Some("10"));
    }

    #[test]
    fn test_record_rejects_non_object() {
        let err = Record::from_json(json!("just text")).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
        assert!(err.to_string().contains("a string"));
    }

    #[test]
    fn test_row_serializes_in_schema_order() {
        let mut row = Row::with_capacity(3);
        row.push("S.No", "1");
        row.push("Zeta", "z");
        row.push("Alpha", "a");

        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"S.No":"1","Zeta":"z","Alpha":"a"}"#);
    }
}
