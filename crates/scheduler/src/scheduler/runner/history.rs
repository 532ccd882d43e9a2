use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::definition::ReportDefinition;
use crate::design::ReportDesign;
use crate::error::ReportError;
use crate::renderer::{RenderingMode, ReportRenderer};
use crate::report::Report;
use crate::request::{ReportRequest, ReportStatus};

use super::ReportScheduler;

// ── Requests and reports ──────────────────────────────────────

impl ReportScheduler {
    /// Look up the report of a request. Never executes anything.
    pub fn get_report(&self, request: &ReportRequest) -> Result<Option<Report>, ReportError> {
        match request.uuid() {
            Some(uuid) => Ok(self.history.get_report(&uuid)?),
            None => Ok(None),
        }
    }

    /// Report of a known request, `Ok(None)` while it has not finished.
    pub fn get_report_by_uuid(&self, uuid: &Uuid) -> Result<Option<Report>, ReportError> {
        if self.history.get_request(uuid)?.is_none() {
            return Err(ReportError::NotFound(*uuid));
        }
        Ok(self.history.get_report(uuid)?)
    }

    pub fn get_report_request_by_uuid(&self, uuid: &Uuid) -> Result<ReportRequest, ReportError> {
        self.history
            .get_request(uuid)?
            .ok_or(ReportError::NotFound(*uuid))
    }

    /// Mark a request as saved so retention never deletes it. Returns
    /// `false` when the identifier is unknown.
    pub fn archive_report_request(&self, uuid: &Uuid) -> Result<bool, ReportError> {
        let _queue = self.lock_queue();
        let archived = self.history.update_request(uuid, &mut |r| r.mark_saved())?;
        if archived.is_some() {
            info!(uuid = %uuid, "Archived report request");
        }
        Ok(archived.is_some())
    }

    /// Record a request in history without running it. Same overwrite
    /// rules as [`save_report_request`](Self::save_report_request).
    pub fn add_to_history(&self, mut request: ReportRequest) -> Result<ReportRequest, ReportError> {
        let uuid = request.ensure_uuid();
        let queue = self.lock_queue();
        self.ensure_writable(&queue, &request, uuid, "add")?;
        self.history.save_request(&request)?;
        Ok(request)
    }

    /// Insert or overwrite a stored request.
    ///
    /// Requests the scheduler is holding cannot be overwritten, QUEUED and
    /// PROCESSING cannot be written from outside, and a stored status can
    /// only be replaced by one it may advance to.
    pub fn save_report_request(&self, mut request: ReportRequest) -> Result<ReportRequest, ReportError> {
        let uuid = request.ensure_uuid();
        let queue = self.lock_queue();
        self.ensure_writable(&queue, &request, uuid, "save")?;
        self.history.save_request(&request)?;
        drop(queue);
        Ok(self.history.get_request(&uuid)?.unwrap_or(request))
    }

    /// Delete a request with its report and artifact. A QUEUED request is
    /// also taken out of the pending queue. Returns `false` when nothing was
    /// stored under the identifier.
    pub fn delete_from_history(&self, uuid: &Uuid) -> Result<bool, ReportError> {
        let mut queue = self.lock_queue();
        if queue.in_progress.contains_key(uuid) {
            return Err(ReportError::InvalidState {
                uuid: *uuid,
                status: ReportStatus::Processing,
                action: "delete",
            });
        }
        if let Some(stored) = self.history.get_request(uuid)? {
            if stored.status() == ReportStatus::Processing {
                return Err(ReportError::InvalidState {
                    uuid: *uuid,
                    status: stored.status(),
                    action: "delete",
                });
            }
            if stored.is_saved() {
                return Err(ReportError::Saved(*uuid));
            }
        }
        if queue.pending.remove(uuid).is_some() {
            info!(uuid = %uuid, "Removed report request from the queue");
            self.refresh_gauges(&queue);
        }
        let deleted = self.history.delete(uuid)?;
        if deleted {
            info!(uuid = %uuid, "Deleted report request from history");
        }
        Ok(deleted)
    }

    pub fn get_completed_report_requests(&self) -> Result<Vec<ReportRequest>, ReportError> {
        Ok(self.history.completed_requests()?)
    }

    pub fn get_queued_report_requests(&self) -> Result<Vec<ReportRequest>, ReportError> {
        Ok(self.history.queued_requests()?)
    }

    pub fn get_saved_report_requests(&self) -> Result<Vec<ReportRequest>, ReportError> {
        Ok(self.history.saved_requests()?)
    }

    /// PROCESSING requests as recorded in history.
    pub fn get_in_progress_report_requests(&self) -> Result<Vec<ReportRequest>, ReportError> {
        Ok(self.history.in_progress_requests()?)
    }

    /// Most recent request per definition uuid.
    pub fn get_last_report_requests_by_report(&self) -> Result<HashMap<Uuid, ReportRequest>, ReportError> {
        Ok(self.history.last_request_by_definition()?)
    }
}

// ── Designs ───────────────────────────────────────────────────

impl ReportScheduler {
    pub fn get_report_design_by_uuid(&self, uuid: &Uuid) -> Result<Option<ReportDesign>, ReportError> {
        Ok(self.designs.get_by_uuid(uuid)?)
    }

    pub fn get_report_design(&self, id: u64) -> Result<Option<ReportDesign>, ReportError> {
        Ok(self.designs.get(id)?)
    }

    pub fn get_all_report_designs(&self, include_retired: bool) -> Result<Vec<ReportDesign>, ReportError> {
        Ok(self.designs.all(include_retired)?)
    }

    pub fn get_report_designs(
        &self,
        definition_uuid: Option<&Uuid>,
        renderer_type: Option<&str>,
        include_retired: bool,
    ) -> Result<Vec<ReportDesign>, ReportError> {
        Ok(self.designs.find(definition_uuid, renderer_type, include_retired)?)
    }

    pub fn save_report_design(&self, design: ReportDesign) -> Result<ReportDesign, ReportError> {
        let saved = self.designs.save(design)?;
        info!("Saved report design '{}' ({})", saved.name, saved.uuid);
        Ok(saved)
    }

    pub fn purge_report_design(&self, uuid: &Uuid) -> Result<bool, ReportError> {
        let purged = self.designs.purge(uuid)?;
        if !purged {
            warn!("Report design {} not found, nothing purged", uuid);
        }
        Ok(purged)
    }
}

// ── Renderers ─────────────────────────────────────────────────

impl ReportScheduler {
    pub fn get_report_renderers(&self) -> Vec<Arc<dyn ReportRenderer>> {
        self.registry.get_report_renderers()
    }

    pub fn get_report_renderer(&self, type_name: &str) -> Option<Arc<dyn ReportRenderer>> {
        self.registry.get_report_renderer(type_name)
    }

    pub fn get_preferred_report_renderer(&self, object_type: &str) -> Option<Arc<dyn ReportRenderer>> {
        self.registry.get_preferred_report_renderer(object_type)
    }

    /// Rendering modes for a definition, including one per non-retired
    /// design bound to it.
    pub fn get_rendering_modes(&self, definition: &ReportDefinition) -> Result<Vec<RenderingMode>, ReportError> {
        let designs = self.designs.find(Some(&definition.uuid), None, false)?;
        Ok(self.registry.get_rendering_modes(definition, &designs))
    }
}
