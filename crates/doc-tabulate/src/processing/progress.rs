//! Run progress and smoothed time-remaining estimate

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// No estimate before this much wall-clock time has elapsed
const ETA_WARMUP: Duration = Duration::from_secs(1);

/// No estimate before this many completions
const MIN_COMPLETIONS_FOR_ETA: usize = 2;

/// Weight of the newest raw estimate in the moving average
const SMOOTHING_ALPHA: f64 = 0.4;

/// Mutable progress state for one run
#[derive(Debug, Clone)]
pub struct ProgressState {
    pub processed_count: usize,
    pub total: usize,
    pub started_at: Instant,
    pub smoothed_eta_ms: Option<f64>,
}

impl ProgressState {
    fn new(total: usize) -> Self {
        Self {
            processed_count: 0,
            total,
            started_at: Instant::now(),
            smoothed_eta_ms: None,
        }
    }

    fn snapshot(&self) -> ProgressSnapshot {
        let percent = if self.total == 0 {
            0.0
        } else {
            (self.processed_count as f32 / self.total as f32) * 100.0
        };

        ProgressSnapshot {
            processed: self.processed_count,
            total: self.total,
            percent,
            elapsed_ms: self.started_at.elapsed().as_millis() as u64,
            eta_ms: self.smoothed_eta_ms.map(|ms| ms.max(0.0).round() as u64),
            eta: self.smoothed_eta_ms.map(format_eta),
        }
    }
}

/// Read-only view of progress, sent with every live update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub processed: usize,
    pub total: usize,
    pub percent: f32,
    pub elapsed_ms: u64,
    pub eta_ms: Option<u64>,
    /// Human-readable time remaining, absent during warm-up
    pub eta: Option<String>,
}

/// Progress tracker shared by all workers of one run.
///
/// The increment and the ETA update happen under one lock so two workers
/// finishing together never compute from a stale count.
#[derive(Debug)]
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProgressState::new(0)),
        }
    }

    /// Reset for a new run (or retry) over `total` documents
    pub fn on_start(&self, total: usize) {
        *self.state.lock() = ProgressState::new(total);
    }

    /// Record one finished document and refresh the estimate
    pub fn on_completed(&self) -> ProgressSnapshot {
        let mut state = self.state.lock();
        state.processed_count += 1;

        let elapsed = state.started_at.elapsed();
        if elapsed >= ETA_WARMUP && state.processed_count >= MIN_COMPLETIONS_FOR_ETA {
            let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
            let remaining = state.total.saturating_sub(state.processed_count) as f64;
            let raw_eta_ms = remaining * (elapsed_ms / state.processed_count as f64);

            state.smoothed_eta_ms = Some(match state.smoothed_eta_ms {
                None => raw_eta_ms,
                Some(previous) => SMOOTHING_ALPHA * raw_eta_ms + (1.0 - SMOOTHING_ALPHA) * previous,
            });
        }

        state.snapshot()
    }

    /// Current progress without recording a completion
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().snapshot()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a remaining duration the way the progress line shows it
pub fn format_eta(eta_ms: f64) -> String {
    if eta_ms < 1000.0 {
        return "a few seconds".to_string();
    }

    let total_secs = (eta_ms / 1000.0).floor() as u64;
    if total_secs >= 60 {
        let minutes = total_secs / 60;
        let seconds = total_secs % 60;
        let mut text = format!("about {} minute{}", minutes, plural(minutes));
        if seconds > 10 {
            text.push_str(&format!(" and {} seconds", seconds));
        }
        text
    } else {
        format!("about {} second{}", total_secs, plural(total_secs))
    }
}

fn plural(n: u64) -> &'static str {
    if n == 1 { "" } else { "s" }
}
