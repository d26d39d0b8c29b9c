//! Batch extraction: work queue, result table, progress and the runner

mod job_registry;
mod progress;
mod result_table;
mod runner;
mod work_queue;

pub use job_registry::{
    run_job, FailedFile, JobDetail, JobRegistry, JobStatus, JobSummary, JobWork, RegistryStats,
    RetryPlan, DEFAULT_MAX_RETAINED_JOBS,
};
pub use progress::{format_eta, ProgressSnapshot, ProgressState, ProgressTracker};
pub use result_table::{failure_marker, ResultSlot, ResultTable, SlotCounts};
pub use runner::{BatchRunner, BatchUpdate, FinalResult, DEFAULT_CONCURRENCY};
pub use work_queue::{WorkItem, WorkQueue};
