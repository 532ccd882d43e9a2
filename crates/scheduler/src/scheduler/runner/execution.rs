use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::{ExecutionFailure, ExecutionOutcome};
use crate::error::{EngineError, ReportError};
use crate::report::{ErrorDetail, FailureStage, Report};
use crate::request::{Priority, ReportRequest, ReportStatus};

use super::ReportScheduler;

/// How an engine run ended, after its result has been recorded.
pub(super) enum RunOutcome {
    Finished(ExecutionOutcome),
    Rejected(EngineError),
    Panicked(Box<dyn Any + Send>),
}

impl ReportScheduler {
    /// Execute a request on the calling thread and wait for the result.
    ///
    /// The request runs at HIGHEST priority without passing through the
    /// queue or the worker pool, but is visible in
    /// [`get_in_progress`](Self::get_in_progress) while it runs so that
    /// admission does not over-commit. Evaluation and render failures are
    /// recorded as FAILED and returned as errors.
    pub fn run_report(&self, mut request: ReportRequest) -> Result<Report, ReportError> {
        let uuid = request.ensure_uuid();
        if request.status() != ReportStatus::Requested {
            return Err(ReportError::InvalidState {
                uuid,
                status: request.status(),
                action: "run",
            });
        }
        request.priority = Priority::Highest;
        request.advance_to(ReportStatus::Processing)?;
        {
            let mut queue = self.lock_queue();
            self.ensure_not_submitted(&queue, uuid, "run")?;
            self.history.save_request(&request)?;
            queue.in_progress.insert(uuid, request.clone());
            self.refresh_gauges(&queue);
        }
        info!(uuid = %uuid, "Running report '{}' synchronously", request.definition.name);

        let outcome = self.run_engine(uuid, &mut request);
        self.finish(&uuid);
        self.maybe_run_next_queued_report();

        match outcome {
            RunOutcome::Finished(ExecutionOutcome { report, failure: None }) => Ok(report),
            RunOutcome::Finished(ExecutionOutcome {
                failure: Some(failure), ..
            }) => Err(match failure {
                ExecutionFailure::Evaluation(e) => ReportError::Evaluation(e),
                ExecutionFailure::Render(e) => ReportError::Render(e),
            }),
            RunOutcome::Rejected(e) => Err(e.into()),
            RunOutcome::Panicked(payload) => panic::resume_unwind(payload),
        }
    }

    /// Worker-pool entry point for a request admitted from the queue.
    /// Failures stay in history; nothing is returned.
    pub(super) fn execute_dispatched(&self, mut request: ReportRequest) {
        let Some(uuid) = request.uuid() else {
            error!("Dispatched report request has no identifier");
            return;
        };
        self.run_engine(uuid, &mut request);
        self.finish(&uuid);
        self.maybe_run_next_queued_report();
    }

    /// Run the engine with panics contained, then record the request, the
    /// report and the metrics. The request is persisted before it leaves the
    /// in-progress set.
    fn run_engine(&self, uuid: Uuid, request: &mut ReportRequest) -> RunOutcome {
        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.engine.execute(request)));
        let elapsed = started.elapsed();

        let (outcome, report) = match result {
            Ok(Ok(outcome)) => {
                let report = outcome.report.clone();
                (RunOutcome::Finished(outcome), report)
            }
            Ok(Err(e)) => {
                error!(uuid = %uuid, "Report engine rejected request: {}", e);
                let detail = ErrorDetail::from_error(FailureStage::Engine, &e);
                (RunOutcome::Rejected(e), Report::failed(uuid, None, detail))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(uuid = %uuid, "Report execution panicked: {}", message);
                let detail = ErrorDetail::new(FailureStage::Engine, format!("execution panicked: {}", message));
                (RunOutcome::Panicked(payload), Report::failed(uuid, None, detail))
            }
        };
        if !request.status().is_terminal() {
            let _ = request.advance_to(ReportStatus::Failed);
        }

        if let Err(e) = self.history.save_report(&report) {
            error!(uuid = %uuid, "Failed to store report: {}", e);
        }
        if let Err(e) = self.history.save_request(request) {
            error!(uuid = %uuid, "Failed to store report request: {}", e);
        }
        self.metrics
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .record_execution(&request.definition.name, elapsed, report.is_success());

        match report.error() {
            None => info!(uuid = %uuid, "Report '{}' completed in {:?}", request.definition.name, elapsed),
            Some(detail) => warn!(
                uuid = %uuid,
                stage = ?detail.stage,
                "Report '{}' failed: {}",
                request.definition.name,
                detail.message
            ),
        }
        outcome
    }

    /// Drop a request from the in-progress set.
    fn finish(&self, uuid: &Uuid) {
        let mut queue = self.lock_queue();
        queue.in_progress.shift_remove(uuid);
        self.refresh_gauges(&queue);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
