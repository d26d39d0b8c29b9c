//! In-memory registry of extraction jobs run behind the HTTP API

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::providers::ExtractionClient;
use crate::types::{DocumentFile, Row, Schema};

use super::progress::ProgressSnapshot;
use super::result_table::{ResultSlot, ResultTable, SlotCounts};
use super::runner::{BatchRunner, BatchUpdate, FinalResult};
use super::work_queue::WorkItem;

/// Job status
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, workers not started yet
    Queued,
    /// Initial run in progress
    Running,
    /// Retry of the failed subset in progress
    Retrying,
    /// Every document succeeded
    Complete,
    /// Finished with some failed documents
    Partial,
    /// Every document failed, or the run could not start
    Failed,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running | JobStatus::Retrying)
    }
}

/// A document whose latest attempt failed
#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub index: usize,
    pub filename: String,
    pub reason: String,
}

/// Everything `retry` needs, taken from a finished job
#[derive(Debug, Clone)]
pub struct RetryPlan {
    pub failed_items: Vec<WorkItem>,
    pub schema: Schema,
    pub instructions: String,
    pub table: Arc<ResultTable>,
}

/// Work handed to `run_job`
#[derive(Debug)]
pub enum JobWork {
    Run(Vec<DocumentFile>),
    Retry(RetryPlan),
}

/// Job state held by the registry
#[derive(Debug, Clone)]
struct JobEntry {
    id: Uuid,
    /// Creation order
    seq: u64,
    status: JobStatus,
    schema: Schema,
    instructions: String,
    total_files: usize,
    rows: Vec<Row>,
    progress: Option<ProgressSnapshot>,
    counts: SlotCounts,
    table: Option<Arc<ResultTable>>,
    failed_items: Vec<WorkItem>,
    retries: u32,
    error: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl JobEntry {
    /// Failed items whose slot still holds a failure; a retry in flight may
    /// already have fixed some of them
    fn failed_files(&self) -> Vec<FailedFile> {
        let Some(table) = &self.table else {
            return Vec::new();
        };

        self.failed_items
            .iter()
            .filter_map(|item| match table.slot(item.original_index) {
                Some(ResultSlot::Failure(reason)) => Some(FailedFile {
                    index: item.original_index,
                    filename: item.filename().to_string(),
                    reason,
                }),
                _ => None,
            })
            .collect()
    }

    fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            status: self.status,
            total_files: self.total_files,
            succeeded: self.counts.succeeded,
            failed: self.counts.failed,
            percent: self.progress.as_ref().map(|p| p.percent).unwrap_or(0.0),
            retries: self.retries,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn detail(&self) -> JobDetail {
        JobDetail {
            summary: self.summary(),
            headers: self.schema.headers().to_vec(),
            instructions: self.instructions.clone(),
            rows: self.rows.clone(),
            progress: self.progress.clone(),
            failed_files: self.failed_files(),
            error: self.error.clone(),
        }
    }
}

/// Job list entry
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub status: JobStatus,
    pub total_files: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub percent: f32,
    pub retries: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Full job view with live rows
#[derive(Debug, Clone, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub headers: Vec<String>,
    pub instructions: String,
    pub rows: Vec<Row>,
    pub progress: Option<ProgressSnapshot>,
    pub failed_files: Vec<FailedFile>,
    pub error: Option<String>,
}

/// Registry statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegistryStats {
    pub total_jobs: usize,
    pub active: usize,
    pub complete: usize,
    pub partial: usize,
    pub failed: usize,
}

/// Jobs kept before finished ones are evicted, oldest first
pub const DEFAULT_MAX_RETAINED_JOBS: usize = 100;

/// Registry of jobs keyed by id.
///
/// Finished jobs hold their uploaded bytes until removed or evicted; active
/// jobs are never evicted.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: DashMap<Uuid, JobEntry>,
    next_seq: AtomicU64,
    max_retained: usize,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_MAX_RETAINED_JOBS)
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that keeps at most `max_retained` jobs (0 keeps everything)
    pub fn with_retention(max_retained: usize) -> Self {
        Self {
            jobs: DashMap::new(),
            next_seq: AtomicU64::new(0),
            max_retained,
        }
    }

    /// Register a new job
    pub fn create(&self, schema: Schema, instructions: impl Into<String>, total_files: usize) -> Uuid {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.jobs.insert(
            id,
            JobEntry {
                id,
                seq,
                status: JobStatus::Queued,
                schema,
                instructions: instructions.into(),
                total_files,
                rows: Vec::new(),
                progress: None,
                counts: SlotCounts {
                    pending: total_files,
                    ..Default::default()
                },
                table: None,
                failed_items: Vec::new(),
                retries: 0,
                error: None,
                created_at: now,
                updated_at: now,
            },
        );
        tracing::info!("Created job {} with {} documents", id, total_files);
        self.evict_finished();
        id
    }

    /// Drop a finished job and the documents it holds
    pub fn remove(&self, job_id: Uuid) -> Result<()> {
        match self.jobs.remove_if(&job_id, |_, job| !job.status.is_active()) {
            Some(_) => {
                tracing::info!("Removed job {}", job_id);
                Ok(())
            }
            None if self.jobs.contains_key(&job_id) => {
                Err(Error::invalid_input(format!("job {} is still running", job_id)))
            }
            None => Err(Error::JobNotFound(job_id.to_string())),
        }
    }

    /// Evict the oldest finished jobs while over the retention limit
    fn evict_finished(&self) {
        if self.max_retained == 0 {
            return;
        }
        let excess = self.jobs.len().saturating_sub(self.max_retained);
        if excess == 0 {
            return;
        }

        let mut finished: Vec<(u64, Uuid)> = self
            .jobs
            .iter()
            .filter(|job| !job.status.is_active())
            .map(|job| (job.seq, job.id))
            .collect();
        finished.sort_unstable();

        for (_, id) in finished.into_iter().take(excess) {
            if self.jobs.remove_if(&id, |_, job| !job.status.is_active()).is_some() {
                tracing::debug!("Evicted finished job {}", id);
            }
        }
    }

    /// Store the latest live snapshot
    pub fn apply_update(&self, job_id: Uuid, update: BatchUpdate) {
        if let Some(mut job) = self.jobs.get_mut(&job_id) {
            if job.status == JobStatus::Queued {
                job.status = JobStatus::Running;
            }
            job.counts = update.counts;
            job.rows = update.rows;
            job.progress = Some(update.progress);
            job.updated_at = chrono::Utc::now();
        }
    }

    /// Record the outcome of a run or retry
    pub fn finish(&self, job_id: Uuid, result: &FinalResult) {
        if let Some(mut job) = self.jobs.get_mut(&job_id) {
            job.status = if result.all_succeeded() {
                JobStatus::Complete
            } else if result.all_failed() {
                JobStatus::Failed
            } else {
                JobStatus::Partial
            };
            job.rows = result.rows.clone();
            job.counts = result.table.counts();
            job.failed_items = result.failed_items.clone();
            job.table = Some(result.table.clone());
            job.error = None;
            job.updated_at = chrono::Utc::now();

            tracing::info!(
                "Job {} finished: {:?} ({} succeeded, {} failed)",
                job_id,
                job.status,
                job.counts.succeeded,
                job.counts.failed
            );
        }
    }

    /// Mark a job failed without a result (bad input, provider setup)
    pub fn fail(&self, job_id: Uuid, error: impl Into<String>) {
        if let Some(mut job) = self.jobs.get_mut(&job_id) {
            let error = error.into();
            tracing::error!("Job {} failed: {}", job_id, error);
            job.status = JobStatus::Failed;
            job.error = Some(error);
            job.updated_at = chrono::Utc::now();
        }
    }

    /// Claim a finished job's failed items for a retry.
    ///
    /// The job moves to `Retrying` so a second concurrent retry is refused.
    pub fn begin_retry(&self, job_id: Uuid) -> Result<RetryPlan> {
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;

        if job.status.is_active() {
            return Err(Error::invalid_input(format!("job {} is still running", job_id)));
        }
        let table = match &job.table {
            Some(table) => table.clone(),
            None => return Err(Error::invalid_input(format!("job {} has no results to retry", job_id))),
        };
        if job.failed_items.is_empty() {
            return Err(Error::invalid_input(format!("job {} has no failed documents", job_id)));
        }

        job.status = JobStatus::Retrying;
        job.retries += 1;
        job.progress = None;
        job.updated_at = chrono::Utc::now();

        Ok(RetryPlan {
            failed_items: job.failed_items.clone(),
            schema: job.schema.clone(),
            instructions: job.instructions.clone(),
            table,
        })
    }

    /// Job detail with live rows
    pub fn get(&self, job_id: Uuid) -> Option<JobDetail> {
        self.jobs.get(&job_id).map(|job| job.detail())
    }

    /// Schema and current rows, for export
    pub fn rows(&self, job_id: Uuid) -> Result<(Schema, Vec<Row>)> {
        self.jobs
            .get(&job_id)
            .map(|job| (job.schema.clone(), job.rows.clone()))
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))
    }

    /// All jobs, newest first
    pub fn list(&self) -> Vec<JobSummary> {
        let mut jobs: Vec<JobSummary> = self.jobs.iter().map(|e| e.value().summary()).collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub fn stats(&self) -> RegistryStats {
        self.jobs.iter().fold(RegistryStats::default(), |mut stats, job| {
            stats.total_jobs += 1;
            match job.status {
                s if s.is_active() => stats.active += 1,
                JobStatus::Complete => stats.complete += 1,
                JobStatus::Partial => stats.partial += 1,
                _ => stats.failed += 1,
            }
            stats
        })
    }
}

/// Drive one run or retry to completion, mirroring live updates into the registry
pub async fn run_job(
    registry: Arc<JobRegistry>,
    client: Arc<dyn ExtractionClient>,
    concurrency: usize,
    job_id: Uuid,
    work: JobWork,
) {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let runner = BatchRunner::new(client, concurrency).with_updates(sender);

    let forwarder = {
        let registry = registry.clone();
        tokio::spawn(async move {
            while let Some(update) = receiver.recv().await {
                registry.apply_update(job_id, update);
            }
        })
    };

    let result = match work {
        JobWork::Run(files) => {
            let (schema, instructions) = match registry.jobs.get(&job_id) {
                Some(job) => (job.schema.clone(), job.instructions.clone()),
                None => {
                    tracing::error!("Job {} vanished before it started", job_id);
                    return;
                }
            };
            runner.run(files, &schema, &instructions).await
        }
        JobWork::Retry(plan) => {
            runner
                .retry(plan.failed_items, &plan.schema, &plan.instructions, plan.table)
                .await
        }
    };

    // Closing the channel lets the forwarder drain and exit
    drop(runner);
    if let Err(e) = forwarder.await {
        tracing::warn!("Update forwarder for job {} ended abnormally: {}", job_id, e);
    }

    match result {
        Ok(result) => registry.finish(job_id, &result),
        Err(e) => registry.fail(job_id, e.to_string()),
    }
}
