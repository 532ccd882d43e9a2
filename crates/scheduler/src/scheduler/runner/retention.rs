use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::error::ReportError;
use crate::scheduler::supervisor::TaskKind;

use super::ReportScheduler;

impl ReportScheduler {
    /// Delete finished, unsaved requests older than the retention age.
    /// Returns how many were deleted.
    pub fn delete_old_report_requests(&self) -> Result<usize, ReportError> {
        self.delete_old_report_requests_at(Utc::now())
    }

    /// [`delete_old_report_requests`](Self::delete_old_report_requests)
    /// against an explicit clock.
    pub fn delete_old_report_requests_at(&self, now: DateTime<Utc>) -> Result<usize, ReportError> {
        let cutoff = self
            .config
            .retention_age()
            .and_then(|age| chrono::Duration::from_std(age).ok())
            .and_then(|age| now.checked_sub_signed(age));
        let Some(cutoff) = cutoff else {
            debug!("Report retention disabled");
            return Ok(0);
        };

        let mut deleted = 0;
        for candidate in self.history.completed_requests()? {
            let Some(uuid) = candidate.uuid() else { continue };
            if candidate.is_saved() || candidate.requested_at >= cutoff {
                continue;
            }
            // Re-check under the queue lock: the request may have been
            // archived or re-queued since the scan.
            let queue = self.lock_queue();
            if queue.in_progress.contains_key(&uuid) || queue.pending.contains(&uuid) {
                continue;
            }
            let Some(current) = self.history.get_request(&uuid)? else { continue };
            if current.is_saved() || !current.status().is_terminal() || current.requested_at >= cutoff {
                continue;
            }
            if self.history.delete(&uuid)? {
                deleted += 1;
            }
        }

        self.metrics
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .record_sweep(deleted);
        if deleted > 0 {
            info!("Deleted {} report requests older than {}", deleted, cutoff);
        } else {
            debug!("No report requests older than {}", cutoff);
        }
        Ok(deleted)
    }

    /// Make sure exactly one queue pump and one retention sweep are
    /// running. Safe to call any number of times; returns how many tasks
    /// were started by this call.
    ///
    /// Configuration and history are checked first, so a broken setup
    /// fails here instead of inside a background thread.
    pub fn ensure_scheduled_tasks_running(&self) -> Result<usize, ReportError> {
        self.config.validate()?;
        self.history.requests()?;

        let mut started = 0;

        let weak = self.weak_self.clone();
        let pump = move || {
            let Some(scheduler) = weak.upgrade() else {
                return false;
            };
            scheduler
                .metrics
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .pump_ticks += 1;
            while scheduler.maybe_run_next_queued_report().is_some() {}
            true
        };
        if self.supervisor.ensure(TaskKind::Pump, self.config.pump_interval(), pump)? {
            started += 1;
        }

        let weak = self.weak_self.clone();
        let sweep = move || {
            let Some(scheduler) = weak.upgrade() else {
                return false;
            };
            if let Err(e) = scheduler.delete_old_report_requests() {
                error!("Report retention sweep failed: {}", e);
            }
            true
        };
        if self.supervisor.ensure(TaskKind::Sweep, self.config.sweep_interval(), sweep)? {
            started += 1;
        }

        Ok(started)
    }

    /// Number of live background tasks (0 to 2).
    pub fn running_background_tasks(&self) -> usize {
        self.supervisor.live_tasks()
    }

    /// Stop the pump and the sweep and wait for them. Runs already on the
    /// worker pool finish on their own.
    pub fn shutdown(&self) {
        info!("Report scheduler shutdown requested");
        self.supervisor.shutdown();
    }
}
