use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

use indexmap::IndexMap;
use tracing::{info, warn};
use uuid::Uuid;

use reportd_core::SchedulerConfig;

use crate::definition::DefinitionEvaluator;
use crate::design::DesignStore;
use crate::engine::ReportEngine;
use crate::error::ReportError;
use crate::history::ReportHistory;
use crate::renderer::RendererRegistry;
use crate::report::{ErrorDetail, FailureStage, Report};
use crate::request::{ReportRequest, ReportStatus};
use crate::scheduler::metrics::SchedulerMetrics;
use crate::scheduler::queue::PendingQueue;
use crate::scheduler::supervisor::TaskSupervisor;

/// The scheduler's transient view of live requests.
#[derive(Debug, Default)]
pub(super) struct QueueState {
    pub(super) pending: PendingQueue,
    /// Requests currently executing, asynchronous and synchronous, in
    /// dispatch order.
    pub(super) in_progress: IndexMap<Uuid, ReportRequest>,
}

/// The report scheduler. Always handled through an `Arc`: dispatched runs
/// and background tasks reach back into it.
pub struct ReportScheduler {
    pub(super) config: SchedulerConfig,
    pub(super) registry: Arc<RendererRegistry>,
    pub(super) evaluator: Arc<dyn DefinitionEvaluator>,
    pub(super) history: Arc<dyn ReportHistory>,
    pub(super) designs: Arc<dyn DesignStore>,
    pub(super) engine: ReportEngine,
    /// Pending queue and in-progress set. Every pop-and-mark happens under
    /// this lock.
    pub(super) queue: Mutex<QueueState>,
    /// Worker pool for dispatched requests, sized to `max_parallel_reports`.
    pub(super) pool: rayon::ThreadPool,
    pub(super) metrics: Arc<RwLock<SchedulerMetrics>>,
    pub(super) supervisor: TaskSupervisor,
    pub(super) weak_self: Weak<ReportScheduler>,
}

impl ReportScheduler {
    /// Create a scheduler over the given collaborators.
    ///
    /// QUEUED requests found in history are put back in the pending queue.
    /// PROCESSING requests cannot have survived a restart and are marked
    /// FAILED.
    pub fn new(
        config: SchedulerConfig,
        registry: Arc<RendererRegistry>,
        evaluator: Arc<dyn DefinitionEvaluator>,
        history: Arc<dyn ReportHistory>,
        designs: Arc<dyn DesignStore>,
    ) -> Result<Arc<Self>, ReportError> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_parallel_reports)
            .thread_name(|i| format!("report-worker-{}", i))
            .build()?;

        let pending = Self::restore_pending(history.as_ref())?;
        info!(
            "Report scheduler starting with {} workers, {} restored queued requests",
            config.max_parallel_reports,
            pending.len()
        );

        let engine = ReportEngine::new(
            Arc::clone(&registry),
            Arc::clone(&evaluator),
            Arc::clone(&designs),
            Arc::clone(&history),
        );
        let metrics = SchedulerMetrics {
            queue_depth: pending.len(),
            ..SchedulerMetrics::default()
        };

        Ok(Arc::new_cyclic(|weak_self| Self {
            config,
            registry,
            evaluator,
            history,
            designs,
            engine,
            queue: Mutex::new(QueueState {
                pending,
                in_progress: IndexMap::new(),
            }),
            pool,
            metrics: Arc::new(RwLock::new(metrics)),
            supervisor: TaskSupervisor::new(),
            weak_self: weak_self.clone(),
        }))
    }

    fn restore_pending(history: &dyn ReportHistory) -> Result<PendingQueue, ReportError> {
        let mut pending = PendingQueue::new();
        for request in history.queued_requests()? {
            pending.push(request);
        }
        for request in history.in_progress_requests()? {
            let Some(uuid) = request.uuid() else { continue };
            warn!(uuid = %uuid, "Report request was PROCESSING at startup, marking FAILED");
            history.update_request(&uuid, &mut |r| {
                if let Err(e) = r.advance_to(ReportStatus::Failed) {
                    warn!(uuid = %uuid, "Could not mark interrupted request FAILED: {}", e);
                }
            })?;
            let detail = ErrorDetail::new(FailureStage::Engine, "interrupted before completion");
            history.save_report(&Report::failed(uuid, None, detail))?;
        }
        Ok(pending)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RendererRegistry> {
        &self.registry
    }

    pub fn evaluator(&self) -> &Arc<dyn DefinitionEvaluator> {
        &self.evaluator
    }

    /// Get a snapshot of the current scheduler metrics.
    pub fn metrics(&self) -> SchedulerMetrics {
        self.metrics.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Get an Arc to the metrics (for external reads without cloning).
    pub fn metrics_handle(&self) -> Arc<RwLock<SchedulerMetrics>> {
        Arc::clone(&self.metrics)
    }

    pub(super) fn lock_queue(&self) -> MutexGuard<'_, QueueState> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Refuse to accept `uuid` for `action` while the scheduler holds it, or
    /// when history already has it past REQUESTED. Called with the queue
    /// locked.
    pub(super) fn ensure_not_submitted(
        &self,
        queue: &QueueState,
        uuid: Uuid,
        action: &'static str,
    ) -> Result<(), ReportError> {
        let held = if queue.in_progress.contains_key(&uuid) {
            Some(ReportStatus::Processing)
        } else if queue.pending.contains(&uuid) {
            Some(ReportStatus::Queued)
        } else {
            self.history
                .get_request(&uuid)?
                .map(|stored| stored.status())
                .filter(|status| *status != ReportStatus::Requested)
        };
        match held {
            Some(status) => Err(ReportError::InvalidState { uuid, status, action }),
            None => Ok(()),
        }
    }

    /// Refuse a history write that would overwrite `request` backward or
    /// into a state only the scheduler assigns. Called with the queue locked.
    pub(super) fn ensure_writable(
        &self,
        queue: &QueueState,
        request: &ReportRequest,
        uuid: Uuid,
        action: &'static str,
    ) -> Result<(), ReportError> {
        if queue.in_progress.contains_key(&uuid) || queue.pending.contains(&uuid) {
            let status = self
                .history
                .get_request(&uuid)?
                .map_or(ReportStatus::Queued, |r| r.status());
            return Err(ReportError::InvalidState { uuid, status, action });
        }
        let incoming = request.status();
        if matches!(incoming, ReportStatus::Queued | ReportStatus::Processing) {
            return Err(ReportError::InvalidState {
                uuid,
                status: incoming,
                action,
            });
        }
        if let Some(stored) = self.history.get_request(&uuid)? {
            let from = stored.status();
            if from != incoming && !from.can_advance_to(incoming) {
                return Err(ReportError::InvalidState {
                    uuid,
                    status: from,
                    action,
                });
            }
        }
        Ok(())
    }

    /// Copy the queue gauges into the metrics. Called with the queue locked.
    pub(super) fn refresh_gauges(&self, queue: &QueueState) {
        let mut metrics = self.metrics.write().unwrap_or_else(|e| e.into_inner());
        metrics.queue_depth = queue.pending.len();
        metrics.in_progress = queue.in_progress.len();
    }
}
