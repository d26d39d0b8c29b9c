//! Table schema: the ordered, deduplicated header list

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};

/// Serial number header, computed from row position
pub const SERIAL_NUMBER_HEADER: &str = "S.No";

/// Document name header, computed from the source filename
pub const DOCUMENT_NAME_HEADER: &str = "Document Name";

/// Headers synthesized locally, never sent to the extraction service
pub const METADATA_HEADERS: [&str; 2] = [SERIAL_NUMBER_HEADER, DOCUMENT_NAME_HEADER];

/// Ordered list of table headers.
///
/// Duplicates are removed (first occurrence wins) and blank names dropped.
/// Metadata headers may appear anywhere in the order; every other header is
/// a content header sent to the extraction service verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Schema {
    headers: Vec<String>,
}

impl Schema {
    /// Build a schema, failing when no usable header remains
    pub fn new<I, S>(headers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let headers = dedup_headers(headers);
        if headers.is_empty() {
            return Err(Error::invalid_input("schema must contain at least one header"));
        }
        Ok(Self { headers })
    }

    /// All headers in display order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Headers sent to the extraction service, in schema order
    pub fn content_headers(&self) -> Vec<String> {
        self.headers
            .iter()
            .filter(|h| !is_metadata_header(h))
            .cloned()
            .collect()
    }

    /// True when nothing needs to be extracted remotely
    pub fn is_metadata_only(&self) -> bool {
        self.headers.iter().all(|h| is_metadata_header(h))
    }

    /// Number of headers
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Always false for a constructed schema
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

impl TryFrom<Vec<String>> for Schema {
    type Error = Error;

    fn try_from(headers: Vec<String>) -> Result<Self> {
        Self::new(headers)
    }
}

impl From<Schema> for Vec<String> {
    fn from(schema: Schema) -> Self {
        schema.headers
    }
}

/// Whether a header is computed locally
pub fn is_metadata_header(header: &str) -> bool {
    METADATA_HEADERS.contains(&header)
}

/// Trim, drop blanks and remove duplicates while keeping first-seen order
pub fn dedup_headers<I, S>(headers: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    headers
        .into_iter()
        .map(|h| h.as_ref().trim().to_string())
        .filter(|h| !h.is_empty())
        .filter(|h| seen.insert(h.clone()))
        .collect()
}

/// Suggested header list for the curation step: metadata headers first,
/// followed by the model's suggestions with duplicates removed
pub fn suggested_headers<I, S>(suggestions: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let metadata = METADATA_HEADERS.iter().map(|h| h.to_string());
    let suggested = suggestions.into_iter().map(|h| h.as_ref().to_string());
    dedup_headers(metadata.chain(suggested))
}
