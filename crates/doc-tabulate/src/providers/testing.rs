//! Scripted extraction client for tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::{DocumentFile, EncodedDocument, Record};

use super::ExtractionClient;

/// Per-file delays, scripted failures and a call log.
///
/// A successful call fills every content header with `"<header>:<filename>"`.
#[derive(Default)]
pub struct ScriptedClient {
    pub delays_ms: HashMap<String, u64>,
    pub failing: Mutex<HashSet<String>>,
    /// Remaining failures per file before it starts succeeding
    pub flaky: Mutex<HashMap<String, usize>>,
    pub calls: Mutex<Vec<String>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub suggested: Vec<String>,
}

impl ScriptedClient {
    pub fn failing(names: &[&str]) -> Self {
        let client = Self::default();
        client.failing.lock().extend(names.iter().map(|n| n.to_string()));
        client
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionClient for ScriptedClient {
    async fn identify_headers(&self, _documents: &[EncodedDocument]) -> Result<Vec<String>> {
        Ok(self.suggested.clone())
    }

    async fn extract_one(
        &self,
        content_headers: &[String],
        _instructions: &str,
        document: &EncodedDocument,
    ) -> Result<Record> {
        self.calls.lock().push(document.filename.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays_ms.get(&document.filename).copied().unwrap_or(10);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().contains(&document.filename) {
            return Err(Error::llm("HTTP 503 - overloaded"));
        }
        {
            let mut flaky = self.flaky.lock();
            if let Some(remaining) = flaky.get_mut(&document.filename) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(Error::llm("transient failure"));
                }
            }
        }

        let mut record = Record::new();
        for header in content_headers {
            record.insert(header.clone(), Some(format!("{}:{}", header, document.filename)));
        }
        Ok(record)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "test"
    }
}

/// `doc0.pdf .. doc{n-1}.pdf`, three bytes each
pub fn sample_files(n: usize) -> Vec<DocumentFile> {
    (0..n)
        .map(|i| DocumentFile::from_bytes(format!("doc{}.pdf", i), None, vec![1u8, 2, 3]))
        .collect()
}
