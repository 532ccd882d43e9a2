use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One tabular result produced by evaluating a data set definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl DataSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Raw, renderer-independent output of evaluating a report definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub definition_uuid: Uuid,
    pub definition_name: String,
    pub evaluated_at: DateTime<Utc>,
    #[serde(default)]
    pub parameters: std::collections::BTreeMap<String, serde_json::Value>,
    /// Data sets keyed by name, in definition order.
    pub data_sets: IndexMap<String, DataSet>,
}

/// A rendered output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedArtifact {
    pub content_type: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

/// Stage at which a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Evaluation,
    Render,
    /// The engine refused the request (unknown definition or renderer, or a
    /// crash inside a collaborator).
    Engine,
}

/// Structured description of a failed run, kept with the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub stage: FailureStage,
    pub message: String,
    /// Messages of the error's `source()` chain, outermost first.
    #[serde(default)]
    pub causes: Vec<String>,
}

impl ErrorDetail {
    pub fn new(stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            causes: Vec::new(),
        }
    }

    pub fn from_error(stage: FailureStage, error: &dyn std::error::Error) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        Self {
            stage,
            message: error.to_string(),
            causes,
        }
    }
}

/// Result of one report run, tied one-to-one to its request by identifier.
///
/// Only the execution engine creates reports; nothing mutates them after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    request_uuid: Uuid,
    data: Option<ReportData>,
    artifact: Option<RenderedArtifact>,
    error: Option<ErrorDetail>,
}

impl Report {
    pub(crate) fn from_parts(
        request_uuid: Uuid,
        data: Option<ReportData>,
        artifact: Option<RenderedArtifact>,
        error: Option<ErrorDetail>,
    ) -> Self {
        Self {
            request_uuid,
            data,
            artifact,
            error,
        }
    }

    pub(crate) fn failed(request_uuid: Uuid, data: Option<ReportData>, error: ErrorDetail) -> Self {
        Self::from_parts(request_uuid, data, None, Some(error))
    }

    pub fn request_uuid(&self) -> Uuid {
        self.request_uuid
    }

    pub fn data(&self) -> Option<&ReportData> {
        self.data.as_ref()
    }

    pub fn artifact(&self) -> Option<&RenderedArtifact> {
        self.artifact.as_ref()
    }

    pub fn error(&self) -> Option<&ErrorDetail> {
        self.error.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn into_parts(
        self,
    ) -> (Uuid, Option<ReportData>, Option<RenderedArtifact>, Option<ErrorDetail>) {
        (self.request_uuid, self.data, self.artifact, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("query failed")]
    struct Outer(#[source] Inner);

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct Inner;

    #[test]
    fn error_detail_collects_source_chain() {
        let detail = ErrorDetail::from_error(FailureStage::Evaluation, &Outer(Inner));
        assert_eq!(detail.message, "query failed");
        assert_eq!(detail.causes, vec!["connection reset".to_string()]);
    }

    #[test]
    fn failed_report_has_no_artifact() {
        let id = Uuid::new_v4();
        let report = Report::failed(id, None, ErrorDetail::new(FailureStage::Render, "boom"));
        assert_eq!(report.request_uuid(), id);
        assert!(!report.is_success());
        assert!(report.artifact().is_none());
    }
}
