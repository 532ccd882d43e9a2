use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::report::{ErrorDetail, Report, ReportData};
use crate::request::ReportRequest;

use super::{keep_saved, sort_oldest_first, ReportHistory};

/// Filesystem-backed report history.
///
/// Manages the `data/reports/` directory structure:
/// ```text
/// reports/
///   requests/
///     {uuid}.json     <- ReportRequest
///   reports/
///     {uuid}.json     <- evaluated data + error detail
///   artifacts/
///     {uuid}.bin      <- rendered output bytes
/// ```
pub struct FileHistory {
    base_dir: PathBuf,
    /// Serializes read-modify-write cycles on request files.
    write_lock: Mutex<()>,
}

/// Report as written to disk; the artifact bytes live in their own file.
#[derive(Serialize, Deserialize)]
struct StoredReport {
    request_uuid: Uuid,
    data: Option<ReportData>,
    artifact: Option<StoredArtifact>,
    error: Option<ErrorDetail>,
}

#[derive(Serialize, Deserialize)]
struct StoredArtifact {
    content_type: String,
    file_name: String,
}

impl FileHistory {
    /// Open a history rooted at `base_dir`, creating the directories.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(base_dir.join("requests"))?;
        std::fs::create_dir_all(base_dir.join("reports"))?;
        std::fs::create_dir_all(base_dir.join("artifacts"))?;
        Ok(Self {
            base_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn request_path(&self, uuid: &Uuid) -> PathBuf {
        self.base_dir.join("requests").join(format!("{}.json", uuid))
    }

    fn report_path(&self, uuid: &Uuid) -> PathBuf {
        self.base_dir.join("reports").join(format!("{}.json", uuid))
    }

    fn artifact_path(&self, uuid: &Uuid) -> PathBuf {
        self.base_dir.join("artifacts").join(format!("{}.bin", uuid))
    }

    fn read_request(&self, uuid: &Uuid) -> Result<Option<ReportRequest>, StoreError> {
        let path = self.request_path(uuid);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    fn write_request(&self, uuid: &Uuid, request: &ReportRequest) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(request)?;
        write_atomic(&self.request_path(uuid), json.as_bytes())
    }
}

/// Write through a temp file and rename, so readers never see half a file.
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

impl ReportHistory for FileHistory {
    fn save_request(&self, request: &ReportRequest) -> Result<(), StoreError> {
        let uuid = request.uuid().ok_or(StoreError::MissingIdentifier)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let stored = self.read_request(&uuid)?;
        let merged = keep_saved(request, stored.as_ref());
        self.write_request(&uuid, &merged)
    }

    fn get_request(&self, uuid: &Uuid) -> Result<Option<ReportRequest>, StoreError> {
        self.read_request(uuid)
    }

    fn update_request(
        &self,
        uuid: &Uuid,
        update: &mut dyn FnMut(&mut ReportRequest),
    ) -> Result<Option<ReportRequest>, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mut request) = self.read_request(uuid)? else {
            return Ok(None);
        };
        let was_saved = request.is_saved();
        update(&mut request);
        if was_saved {
            request.mark_saved();
        }
        self.write_request(uuid, &request)?;
        Ok(Some(request))
    }

    fn save_report(&self, report: &Report) -> Result<(), StoreError> {
        let (uuid, data, artifact, error) = report.clone().into_parts();
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let stored_artifact = match artifact {
            Some(artifact) => {
                write_atomic(&self.artifact_path(&uuid), &artifact.content)?;
                Some(StoredArtifact {
                    content_type: artifact.content_type,
                    file_name: artifact.file_name,
                })
            }
            None => {
                remove_if_exists(&self.artifact_path(&uuid))?;
                None
            }
        };
        let stored = StoredReport {
            request_uuid: uuid,
            data,
            artifact: stored_artifact,
            error,
        };
        let json = serde_json::to_string_pretty(&stored)?;
        write_atomic(&self.report_path(&uuid), json.as_bytes())
    }

    fn get_report(&self, uuid: &Uuid) -> Result<Option<Report>, StoreError> {
        let path = self.report_path(uuid);
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)?;
        let stored: StoredReport = serde_json::from_str(&json)?;
        let artifact = match stored.artifact {
            Some(meta) => Some(crate::report::RenderedArtifact {
                content_type: meta.content_type,
                file_name: meta.file_name,
                content: std::fs::read(self.artifact_path(uuid))?,
            }),
            None => None,
        };
        Ok(Some(Report::from_parts(stored.request_uuid, stored.data, artifact, stored.error)))
    }

    fn delete_report(&self, uuid: &Uuid) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let report = remove_if_exists(&self.report_path(uuid))?;
        let artifact = remove_if_exists(&self.artifact_path(uuid))?;
        Ok(report || artifact)
    }

    fn delete(&self, uuid: &Uuid) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let request = remove_if_exists(&self.request_path(uuid))?;
        let report = remove_if_exists(&self.report_path(uuid))?;
        let artifact = remove_if_exists(&self.artifact_path(uuid))?;
        Ok(request || report || artifact)
    }

    fn requests(&self) -> Result<Vec<ReportRequest>, StoreError> {
        let mut requests: Vec<ReportRequest> = Vec::new();
        for entry in std::fs::read_dir(self.base_dir.join("requests"))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            // A file can vanish between listing and reading when deleted concurrently.
            let json = match std::fs::read_to_string(&path) {
                Ok(json) => json,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            requests.push(serde_json::from_str(&json)?);
        }
        sort_oldest_first(&mut requests);
        Ok(requests)
    }
}
