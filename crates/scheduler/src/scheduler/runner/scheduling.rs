use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ReportError;
use crate::request::{ReportRequest, ReportStatus};

use super::ReportScheduler;

impl ReportScheduler {
    /// Record a request as QUEUED and return without running it.
    ///
    /// Assigns an identifier when the request has none. The request must
    /// still be REQUESTED. Nothing is admitted here; the pump or the next
    /// completion picks it up, or call
    /// [`maybe_run_next_queued_report`](Self::maybe_run_next_queued_report).
    pub fn queue_report(&self, mut request: ReportRequest) -> Result<ReportRequest, ReportError> {
        let uuid = request.ensure_uuid();
        if request.status() != ReportStatus::Requested {
            return Err(ReportError::InvalidState {
                uuid,
                status: request.status(),
                action: "queue",
            });
        }
        request.advance_to(ReportStatus::Queued)?;

        let mut queue = self.lock_queue();
        self.ensure_not_submitted(&queue, uuid, "queue")?;
        self.history.save_request(&request)?;
        queue.pending.push(request.clone());
        self.refresh_gauges(&queue);
        drop(queue);

        info!(uuid = %uuid, priority = %request.priority, "Queued report '{}'", request.definition.name);
        Ok(request)
    }

    /// Put a finished request back in the queue. Keeps its identifier and
    /// saved flag, resets its run timestamps.
    pub fn requeue_report(&self, uuid: &Uuid) -> Result<ReportRequest, ReportError> {
        let mut queue = self.lock_queue();
        if queue.in_progress.contains_key(uuid) {
            return Err(ReportError::InvalidState {
                uuid: *uuid,
                status: ReportStatus::Processing,
                action: "requeue",
            });
        }
        let mut request = self
            .history
            .get_request(uuid)?
            .ok_or(ReportError::NotFound(*uuid))?;
        request.requeue(Utc::now())?;
        self.history.save_request(&request)?;
        // The previous run's result must not read as this run's.
        self.history.delete_report(uuid)?;
        queue.pending.push(request.clone());
        self.refresh_gauges(&queue);
        drop(queue);

        info!(uuid = %uuid, "Re-queued report '{}'", request.definition.name);
        Ok(request)
    }

    /// Admit the head of the queue if a slot is free.
    ///
    /// Non-blocking and safe to call from any number of threads at once:
    /// the check, the pop and the PROCESSING mark happen under the queue
    /// lock. Returns the identifier of the dispatched request, or `None`
    /// when at capacity or the queue is empty.
    pub fn maybe_run_next_queued_report(&self) -> Option<Uuid> {
        let (uuid, request) = {
            let mut queue = self.lock_queue();
            if queue.in_progress.len() >= self.config.max_parallel_reports {
                debug!(
                    "Admission skipped: {} in progress (max {})",
                    queue.in_progress.len(),
                    self.config.max_parallel_reports
                );
                return None;
            }
            let mut request = queue.pending.pop()?;
            let uuid = request.uuid()?;
            if let Err(e) = request.advance_to(ReportStatus::Processing) {
                error!(uuid = %uuid, "Dropping unrunnable queue entry: {}", e);
                self.refresh_gauges(&queue);
                return None;
            }
            if let Err(e) = self.history.save_request(&request) {
                warn!(uuid = %uuid, "Failed to record PROCESSING status: {}", e);
            }
            queue.in_progress.insert(uuid, request.clone());
            self.refresh_gauges(&queue);
            (uuid, request)
        };

        info!(uuid = %uuid, priority = %request.priority, "Dispatching report '{}'", request.definition.name);

        match self.weak_self.upgrade() {
            Some(this) => self.pool.spawn(move || this.execute_dispatched(request)),
            // Only reachable while the scheduler is being dropped.
            None => self.execute_dispatched(request),
        }
        Some(uuid)
    }

    /// Requests currently executing, in dispatch order. The returned
    /// vector is a copy.
    pub fn get_in_progress(&self) -> Vec<ReportRequest> {
        self.lock_queue().in_progress.values().cloned().collect()
    }

    /// Pending requests in dequeue order.
    pub fn get_pending(&self) -> Vec<ReportRequest> {
        self.lock_queue().pending.snapshot()
    }

    pub fn queue_depth(&self) -> usize {
        self.lock_queue().pending.len()
    }

    /// Block until nothing is pending or in progress, admitting queued
    /// requests along the way. Returns `false` on timeout.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            while self.maybe_run_next_queued_report().is_some() {}
            {
                let queue = self.lock_queue();
                if queue.pending.is_empty() && queue.in_progress.is_empty() {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
