use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::error::StoreError;
use crate::report::Report;
use crate::request::ReportRequest;

use super::{keep_saved, sort_oldest_first, ReportHistory};

#[derive(Debug, Default)]
struct Tables {
    requests: HashMap<Uuid, ReportRequest>,
    reports: HashMap<Uuid, Report>,
}

/// In-memory history, for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    tables: RwLock<Tables>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportHistory for MemoryHistory {
    fn save_request(&self, request: &ReportRequest) -> Result<(), StoreError> {
        let uuid = request.uuid().ok_or(StoreError::MissingIdentifier)?;
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let merged = keep_saved(request, tables.requests.get(&uuid));
        tables.requests.insert(uuid, merged);
        Ok(())
    }

    fn get_request(&self, uuid: &Uuid) -> Result<Option<ReportRequest>, StoreError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables.requests.get(uuid).cloned())
    }

    fn update_request(
        &self,
        uuid: &Uuid,
        update: &mut dyn FnMut(&mut ReportRequest),
    ) -> Result<Option<ReportRequest>, StoreError> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        Ok(tables.requests.get_mut(uuid).map(|request| {
            let was_saved = request.is_saved();
            update(request);
            if was_saved {
                request.mark_saved();
            }
            request.clone()
        }))
    }

    fn save_report(&self, report: &Report) -> Result<(), StoreError> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        tables.reports.insert(report.request_uuid(), report.clone());
        Ok(())
    }

    fn get_report(&self, uuid: &Uuid) -> Result<Option<Report>, StoreError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        Ok(tables.reports.get(uuid).cloned())
    }

    fn delete_report(&self, uuid: &Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        Ok(tables.reports.remove(uuid).is_some())
    }

    fn delete(&self, uuid: &Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        let request = tables.requests.remove(uuid).is_some();
        let report = tables.reports.remove(uuid).is_some();
        Ok(request || report)
    }

    fn requests(&self) -> Result<Vec<ReportRequest>, StoreError> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let mut requests: Vec<ReportRequest> = tables.requests.values().cloned().collect();
        sort_oldest_first(&mut requests);
        Ok(requests)
    }
}
