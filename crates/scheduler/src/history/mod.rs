//! Durable record of report requests and their results.
//!
//! Stores implement a small CRUD surface; the query shapes the scheduler
//! needs (completed, queued, saved, in progress, latest per definition)
//! are derived from [`ReportHistory::requests`]. Every read returns a
//! point-in-time snapshot.

mod file;
mod memory;

pub use file::FileHistory;
pub use memory::MemoryHistory;

use std::cmp::Reverse;
use std::collections::HashMap;

use uuid::Uuid;

use crate::error::StoreError;
use crate::report::Report;
use crate::request::{ReportRequest, ReportStatus};

/// Storage for report requests and reports, keyed by request identifier.
///
/// Implementations must keep the saved flag sticky: saving a request whose
/// stored copy is saved keeps it saved.
pub trait ReportHistory: Send + Sync {
    /// Insert or replace a request. The request must have an identifier.
    fn save_request(&self, request: &ReportRequest) -> Result<(), StoreError>;

    fn get_request(&self, uuid: &Uuid) -> Result<Option<ReportRequest>, StoreError>;

    /// Apply `update` to the stored request atomically. Returns the updated
    /// request, or `None` when the identifier is unknown.
    fn update_request(
        &self,
        uuid: &Uuid,
        update: &mut dyn FnMut(&mut ReportRequest),
    ) -> Result<Option<ReportRequest>, StoreError>;

    fn save_report(&self, report: &Report) -> Result<(), StoreError>;

    fn get_report(&self, uuid: &Uuid) -> Result<Option<Report>, StoreError>;

    /// Remove only the report and rendered artifact of a request, keeping
    /// the request. Returns whether anything was removed.
    fn delete_report(&self, uuid: &Uuid) -> Result<bool, StoreError>;

    /// Remove a request together with its report and rendered artifact.
    /// Returns whether anything was removed.
    fn delete(&self, uuid: &Uuid) -> Result<bool, StoreError>;

    /// Every stored request, oldest first (ties by identifier).
    fn requests(&self) -> Result<Vec<ReportRequest>, StoreError>;

    fn requests_with_status(&self, statuses: &[ReportStatus]) -> Result<Vec<ReportRequest>, StoreError> {
        Ok(self
            .requests()?
            .into_iter()
            .filter(|r| statuses.contains(&r.status()))
            .collect())
    }

    /// Finished requests, successful or not.
    fn completed_requests(&self) -> Result<Vec<ReportRequest>, StoreError> {
        self.requests_with_status(&[ReportStatus::Completed, ReportStatus::Failed])
    }

    /// Requests waiting to run, in dequeue order.
    fn queued_requests(&self) -> Result<Vec<ReportRequest>, StoreError> {
        let mut queued = self.requests_with_status(&[ReportStatus::Queued])?;
        queued.sort_by_key(|r| (Reverse(r.priority), r.requested_at, r.uuid()));
        Ok(queued)
    }

    fn in_progress_requests(&self) -> Result<Vec<ReportRequest>, StoreError> {
        self.requests_with_status(&[ReportStatus::Processing])
    }

    fn saved_requests(&self) -> Result<Vec<ReportRequest>, StoreError> {
        Ok(self.requests()?.into_iter().filter(|r| r.is_saved()).collect())
    }

    /// Most recent request per definition uuid.
    fn last_request_by_definition(&self) -> Result<HashMap<Uuid, ReportRequest>, StoreError> {
        let mut latest: HashMap<Uuid, ReportRequest> = HashMap::new();
        // `requests()` is oldest first, so later entries replace earlier ones.
        for request in self.requests()? {
            latest.insert(request.definition.uuid, request);
        }
        Ok(latest)
    }
}

/// Copy the saved flag from the stored request onto the incoming one.
fn keep_saved(incoming: &ReportRequest, stored: Option<&ReportRequest>) -> ReportRequest {
    let mut merged = incoming.clone();
    if stored.is_some_and(|s| s.is_saved()) {
        merged.mark_saved();
    }
    merged
}

fn sort_oldest_first(requests: &mut [ReportRequest]) {
    requests.sort_by_key(|r| (r.requested_at, r.uuid()));
}
