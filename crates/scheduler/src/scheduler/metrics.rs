use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Report scheduler operational metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Runs that finished COMPLETED.
    pub reports_completed: u64,
    /// Runs that finished FAILED, including engine rejections.
    pub reports_failed: u64,
    /// Total runs by definition name.
    pub runs_by_definition: HashMap<String, u64>,
    /// Average run duration by definition name.
    pub avg_run_duration: HashMap<String, Duration>,
    /// Last finish time by definition name.
    pub last_run: HashMap<String, DateTime<Utc>>,
    /// Requests waiting in the pending queue.
    pub queue_depth: usize,
    /// Requests currently executing (queued and synchronous).
    pub in_progress: usize,
    /// Background pump ticks.
    pub pump_ticks: u64,
    /// Retention passes, manual or scheduled.
    pub sweep_runs: u64,
    /// Requests removed by retention.
    pub requests_deleted: u64,
}

impl SchedulerMetrics {
    /// Record a finished run.
    pub fn record_execution(&mut self, definition: &str, duration: Duration, succeeded: bool) {
        if succeeded {
            self.reports_completed += 1;
        } else {
            self.reports_failed += 1;
        }
        *self.runs_by_definition.entry(definition.to_string()).or_default() += 1;
        self.last_run.insert(definition.to_string(), Utc::now());

        let count = self.runs_by_definition[definition];
        let prev_avg = self
            .avg_run_duration
            .get(definition)
            .copied()
            .unwrap_or_default();

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let new_avg = if count == 1 {
            duration
        } else {
            let prev_nanos = prev_avg.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };

        self.avg_run_duration.insert(definition.to_string(), new_avg);
    }

    pub fn record_sweep(&mut self, deleted: usize) {
        self.sweep_runs += 1;
        self.requests_deleted += deleted as u64;
    }
}
