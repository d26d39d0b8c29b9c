//! Batch runner: bounded-concurrency extraction with partial-failure retry

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

use crate::config::ProcessingConfig;
use crate::error::{Error, Result};
use crate::providers::ExtractionClient;
use crate::types::{DocumentFile, Record, Row, Schema};

use super::progress::{ProgressSnapshot, ProgressTracker};
use super::result_table::{ResultSlot, ResultTable, SlotCounts};
use super::work_queue::{WorkItem, WorkQueue};

/// Default number of concurrent extraction workers
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Live update emitted after every slot write
#[derive(Debug, Clone, Serialize)]
pub struct BatchUpdate {
    /// Current ordered rows
    pub rows: Vec<Row>,
    /// Progress of the current run (or retry)
    pub progress: ProgressSnapshot,
    /// Failure slots across the whole table
    pub failed: usize,
    /// Slot counts across the whole table
    pub counts: SlotCounts,
}

/// Outcome of a run or retry
#[derive(Debug, Clone)]
pub struct FinalResult {
    /// Ordered rows, one per input document
    pub rows: Vec<Row>,
    /// Items whose latest attempt failed, by original index
    pub failed_items: Vec<WorkItem>,
    /// Table to hand back to `retry`
    pub table: Arc<ResultTable>,
    pub duration_ms: u64,
}

impl FinalResult {
    pub fn all_succeeded(&self) -> bool {
        self.failed_items.is_empty()
    }

    /// Every slot in the table is a failure
    pub fn all_failed(&self) -> bool {
        !self.table.is_empty() && self.table.counts().failed == self.table.len()
    }

    /// Some rows succeeded and some failed
    pub fn is_partial(&self) -> bool {
        !self.all_succeeded() && !self.all_failed()
    }
}

/// Shared state for the workers of one run
struct RunContext<'a> {
    queue: WorkQueue,
    table: Arc<ResultTable>,
    progress: ProgressTracker,
    failed: Mutex<Vec<WorkItem>>,
    schema: &'a Schema,
    content_headers: Vec<String>,
    instructions: &'a str,
}

/// Runs extraction over a batch with a fixed worker pool
pub struct BatchRunner {
    client: Arc<dyn ExtractionClient>,
    concurrency: usize,
    updates: Option<mpsc::UnboundedSender<BatchUpdate>>,
}

impl BatchRunner {
    /// Create a runner with `concurrency` workers (at least one)
    pub fn new(client: Arc<dyn ExtractionClient>, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            updates: None,
        }
    }

    /// Create a runner from processing configuration
    pub fn from_config(client: Arc<dyn ExtractionClient>, config: &ProcessingConfig) -> Self {
        Self::new(client, config.concurrency)
    }

    /// Send a `BatchUpdate` to `sender` after every slot write
    pub fn with_updates(mut self, sender: mpsc::UnboundedSender<BatchUpdate>) -> Self {
        self.updates = Some(sender);
        self
    }

    /// Convenience: attach a fresh update channel and return its receiver
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<BatchUpdate> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.updates = Some(sender);
        receiver
    }

    /// Extract one row per file.
    ///
    /// Per-file failures never abort the run; they come back in
    /// `failed_items`. Only precondition violations are returned as errors.
    pub async fn run(
        &self,
        files: Vec<DocumentFile>,
        schema: &Schema,
        instructions: &str,
    ) -> Result<FinalResult> {
        if files.is_empty() {
            return Err(Error::invalid_input("no documents provided"));
        }

        let table = Arc::new(ResultTable::new(files.iter().map(|f| f.name.clone()).collect()));
        let items: Vec<WorkItem> = files
            .into_iter()
            .enumerate()
            .map(|(index, file)| WorkItem::new(file, index))
            .collect();

        tracing::info!(
            "Starting batch: {} documents, {} headers ({} content), {} workers, provider {}",
            items.len(),
            schema.len(),
            schema.content_headers().len(),
            self.concurrency.min(items.len()),
            self.client.name()
        );

        Ok(self.drain(items, schema, instructions, table).await)
    }

    /// Re-run only `failed_items` against an existing table.
    ///
    /// Success slots are left untouched; each retried slot is overwritten
    /// with its new outcome.
    pub async fn retry(
        &self,
        failed_items: Vec<WorkItem>,
        schema: &Schema,
        instructions: &str,
        table: Arc<ResultTable>,
    ) -> Result<FinalResult> {
        if failed_items.is_empty() {
            return Err(Error::invalid_input("no failed documents to retry"));
        }
        if let Some(item) = failed_items.iter().find(|i| i.original_index >= table.len()) {
            return Err(Error::invalid_input(format!(
                "document '{}' has index {} but the table holds {} rows",
                item.filename(),
                item.original_index,
                table.len()
            )));
        }

        // One worker per slot: a duplicated index would be written twice
        let mut seen = HashSet::new();
        let items: Vec<WorkItem> = failed_items
            .into_iter()
            .filter(|i| seen.insert(i.original_index))
            .collect();

        tracing::info!("Retrying {} failed documents", items.len());

        Ok(self.drain(items, schema, instructions, table).await)
    }

    async fn drain(
        &self,
        items: Vec<WorkItem>,
        schema: &Schema,
        instructions: &str,
        table: Arc<ResultTable>,
    ) -> FinalResult {
        let start = Instant::now();

        if schema.is_metadata_only() {
            // Nothing to ask the model for
            for item in &items {
                table.write(item.original_index, ResultSlot::Success(Record::new()));
            }
            tracing::info!("Metadata-only schema: built {} rows without extraction", items.len());
            return FinalResult {
                rows: table.snapshot(schema),
                failed_items: Vec::new(),
                table,
                duration_ms: start.elapsed().as_millis() as u64,
            };
        }

        let worker_count = self.concurrency.min(items.len());
        let progress = ProgressTracker::new();
        progress.on_start(items.len());

        let ctx = RunContext {
            queue: WorkQueue::from_items(items),
            table,
            progress,
            failed: Mutex::new(Vec::new()),
            schema,
            content_headers: schema.content_headers(),
            instructions,
        };

        join_all((0..worker_count).map(|worker_id| self.worker(worker_id, &ctx))).await;

        let RunContext { table, failed, .. } = ctx;
        let mut failed_items = failed.into_inner();
        failed_items.sort_by_key(|i| i.original_index);

        let duration_ms = start.elapsed().as_millis() as u64;
        let counts = table.counts();
        tracing::info!(
            "Batch finished in {:.1}s: {} succeeded, {} failed",
            duration_ms as f64 / 1000.0,
            counts.succeeded,
            counts.failed
        );

        FinalResult {
            rows: table.snapshot(schema),
            failed_items,
            table,
            duration_ms,
        }
    }

    async fn worker(&self, worker_id: usize, ctx: &RunContext<'_>) {
        while let Some(item) = ctx.queue.take_next() {
            let index = item.original_index;

            match self.extract_item(&item, ctx).await {
                Ok(record) => {
                    tracing::debug!(
                        "[worker {}] {} -> {} fields",
                        worker_id,
                        item.filename(),
                        record.len()
                    );
                    ctx.table.write(index, ResultSlot::Success(record));
                }
                Err(e) => {
                    let reason = failure_reason(&e);
                    tracing::warn!("[worker {}] Failed to extract {}: {}", worker_id, item.filename(), reason);
                    ctx.table.write(index, ResultSlot::Failure(reason));
                    ctx.failed.lock().push(item);
                }
            }

            let progress = ctx.progress.on_completed();
            self.emit(ctx, progress);
        }
    }

    async fn extract_item(&self, item: &WorkItem, ctx: &RunContext<'_>) -> Result<Record> {
        let document = item.file.load().await?;
        self.client
            .extract_one(&ctx.content_headers, ctx.instructions, &document)
            .await
    }

    fn emit(&self, ctx: &RunContext<'_>, progress: ProgressSnapshot) {
        let Some(sender) = &self.updates else {
            return;
        };

        let counts = ctx.table.counts();
        let update = BatchUpdate {
            rows: ctx.table.snapshot(ctx.schema),
            progress,
            failed: counts.failed,
            counts,
        };

        // A dropped receiver only means nobody is watching
        let _ = sender.send(update);
    }
}

/// Short reason stored in a failure slot
fn failure_reason(error: &Error) -> String {
    match error {
        Error::Extraction { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::{sample_files as files, ScriptedClient};
    use tokio_test::{assert_err, assert_ok};

    fn schema() -> Schema {
        Schema::new(["S.No", "Document Name", "Total"]).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_rows_follow_input_order_not_completion_order() {
        // Later documents finish first
        let delays_ms = (0..8).map(|i| (format!("doc{}.pdf", i), 100 - i as u64 * 10)).collect();
        let client = Arc::new(ScriptedClient { delays_ms, ..Default::default() });
        let runner = BatchRunner::new(client, 5);

        let result = runner.run(files(8), &schema(), "").await.unwrap();

        assert!(result.all_succeeded());
        assert_eq!(result.rows.len(), 8);
        for (k, row) in result.rows.iter().enumerate() {
            assert_eq!(row.get("S.No"), Some((k + 1).to_string().as_str()));
            assert_eq!(row.get("Document Name"), Some(format!("doc{}.pdf", k).as_str()));
            assert_eq!(row.get("Total"), Some(format!("Total:doc{}.pdf", k).as_str()));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_serial_numbers_dense_with_failures() {
        let client = Arc::new(ScriptedClient::failing(&["doc1.pdf", "doc3.pdf"]));
        let runner = BatchRunner::new(client, 5);

        let result = runner.run(files(5), &schema(), "").await.unwrap();

        assert!(result.is_partial());
        let serials: Vec<_> = result.rows.iter().map(|r| r.get("S.No").unwrap().to_string()).collect();
        assert_eq!(serials, vec!["1", "2", "3", "4", "5"]);
        assert_eq!(result.rows[1].get("Total"), Some("Error: LLM error: HTTP 503 - overloaded"));
        let failed: Vec<_> = result.failed_items.iter().map(|i| i.original_index).collect();
        assert_eq!(failed, vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_bound() {
        let client = Arc::new(ScriptedClient {
            delays_ms: (0..12).map(|i| (format!("doc{}.pdf", i), 50)).collect(),
            ..Default::default()
        });
        let runner = BatchRunner::new(client.clone(), 5);

        let result = runner.run(files(12), &schema(), "").await.unwrap();

        assert_eq!(result.rows.len(), 12);
        assert_eq!(client.calls().len(), 12);
        let max = client.max_in_flight();
        assert!(max <= 5, "max in flight was {}", max);
        assert_eq!(max, 5);
    }

    #[tokio::test]
    async fn test_metadata_only_schema_skips_extraction() {
        let client = Arc::new(ScriptedClient::default());
        let runner = BatchRunner::new(client.clone(), 5);
        let schema = Schema::new(["Document Name", "S.No"]).unwrap();

        let result = runner.run(files(3), &schema, "ignored").await.unwrap();

        assert!(client.calls().is_empty());
        assert!(result.all_succeeded());
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[2].get("Document Name"), Some("doc2.pdf"));
        assert_eq!(result.rows[2].get("S.No"), Some("3"));
        let headers: Vec<_> = result.rows[0].cells().iter().map(|(h, _)| h.as_str()).collect();
        assert_eq!(headers, vec!["Document Name", "S.No"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_only_touches_failed_rows() {
        let client = Arc::new(ScriptedClient::failing(&["doc2.pdf", "doc5.pdf"]));
        let runner = BatchRunner::new(client.clone(), 5);
        let schema = schema();

        let first = runner.run(files(7), &schema, "").await.unwrap();
        let failed: Vec<_> = first.failed_items.iter().map(|i| i.original_index).collect();
        assert_eq!(failed, vec![2, 5]);

        client.heal();
        client.calls.lock().clear();

        let second = runner
            .retry(first.failed_items.clone(), &schema, "", first.table.clone())
            .await
            .unwrap();

        let mut retried = client.calls();
        retried.sort();
        assert_eq!(retried, vec!["doc2.pdf", "doc5.pdf"]);
        assert!(second.all_succeeded());
        assert_eq!(second.rows.len(), 7);
        for k in [0, 1, 3, 4, 6] {
            assert_eq!(second.rows[k], first.rows[k], "row {} changed", k);
        }
        assert_eq!(second.rows[2].get("Total"), Some("Total:doc2.pdf"));
        assert_eq!(second.rows[5].get("S.No"), Some("6"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_that_fails_again_stays_failed() {
        let client = Arc::new(ScriptedClient::failing(&["doc0.pdf"]));
        let runner = BatchRunner::new(client.clone(), 2);
        let schema = schema();

        let first = runner.run(files(2), &schema, "").await.unwrap();
        let second = runner
            .retry(first.failed_items.clone(), &schema, "", first.table.clone())
            .await
            .unwrap();

        assert_eq!(second.failed_items.len(), 1);
        assert_eq!(second.failed_items[0].original_index, 0);
        assert!(second.table.slot(0).unwrap().is_failure());
        assert_eq!(second.rows[1], first.rows[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_converges_once_cause_is_fixed() {
        let client = Arc::new(ScriptedClient::default());
        client.flaky.lock().extend([
            ("doc1.pdf".to_string(), 1),
            ("doc4.pdf".to_string(), 3),
        ]);
        let runner = BatchRunner::new(client.clone(), 5);
        let schema = schema();

        let mut result = runner.run(files(6), &schema, "").await.unwrap();
        let mut attempts = 0;
        while !result.all_succeeded() {
            attempts += 1;
            assert!(attempts <= 5, "retry did not converge");
            result = runner
                .retry(result.failed_items.clone(), &schema, "", result.table.clone())
                .await
                .unwrap();
        }

        assert_eq!(attempts, 3);
        assert_eq!(result.table.counts().succeeded, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failed_is_reported() {
        let names: Vec<String> = (0..3).map(|i| format!("doc{}.pdf", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let client = Arc::new(ScriptedClient::failing(&refs));
        let runner = BatchRunner::new(client, 5);

        let result = runner.run(files(3), &schema(), "").await.unwrap();

        assert!(result.all_failed());
        assert!(!result.is_partial());
        assert_eq!(result.failed_items.len(), 3);
        assert_eq!(result.rows.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_updates_after_every_write() {
        let client = Arc::new(ScriptedClient::failing(&["doc2.pdf"]));
        let mut runner = BatchRunner::new(client, 3);
        let mut updates = runner.subscribe();

        let result = runner.run(files(6), &schema(), "").await.unwrap();
        drop(runner);

        let mut received = Vec::new();
        while let Some(update) = updates.recv().await {
            received.push(update);
        }

        assert_eq!(received.len(), 6);
        for (i, update) in received.iter().enumerate() {
            assert_eq!(update.progress.processed, i + 1);
            assert_eq!(update.rows.len(), i + 1);
            for (k, row) in update.rows.iter().enumerate() {
                assert_eq!(row.get("S.No"), Some((k + 1).to_string().as_str()));
            }
        }
        let last = received.last().unwrap();
        assert_eq!(last.rows, result.rows);
        assert_eq!(last.failed, 1);
        assert_eq!(last.counts, SlotCounts { pending: 0, succeeded: 5, failed: 1 });
        assert_eq!(received[0].counts.pending, 5);
    }

    #[tokio::test]
    async fn test_preconditions() {
        let client = Arc::new(ScriptedClient::default());
        let runner = BatchRunner::new(client, 5);
        let schema = schema();

        let err = assert_err!(runner.run(Vec::new(), &schema, "").await);
        assert!(matches!(err, Error::InvalidInput(_)));

        let table = Arc::new(ResultTable::new(vec!["a.pdf".to_string()]));
        let err = assert_err!(runner.retry(Vec::new(), &schema, "", table.clone()).await);
        assert!(matches!(err, Error::InvalidInput(_)));

        let stray = WorkItem::new(DocumentFile::from_bytes("b.pdf", None, vec![1u8]), 4);
        let err = assert_err!(runner.retry(vec![stray], &schema, "", table.clone()).await);
        assert!(err.to_string().contains("index 4"));

        assert!(table.slot(0).unwrap().is_pending());

        let result = assert_ok!(runner.run(files(1), &schema, "").await);
        assert!(result.all_succeeded());
    }

    #[tokio::test]
    async fn test_unreadable_file_becomes_failure_slot() {
        let client = Arc::new(ScriptedClient::default());
        let runner = BatchRunner::new(client.clone(), 2);
        let docs = vec![
            DocumentFile::from_path("/definitely/not/here.pdf"),
            DocumentFile::from_bytes("ok.pdf", None, vec![1u8]),
        ];

        let result = runner.run(docs, &schema(), "").await.unwrap();

        assert_eq!(result.failed_items.len(), 1);
        assert_eq!(result.failed_items[0].original_index, 0);
        assert_eq!(client.calls(), vec!["ok.pdf"]);
        assert!(result.rows[0].get("Total").unwrap().starts_with("Error: IO error"));
    }
}
