use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Report run priority. Declared lowest first so that `Highest > Low`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    /// Forced for synchronous runs.
    Highest,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "LOW"),
            Priority::Normal => write!(f, "NORMAL"),
            Priority::High => write!(f, "HIGH"),
            Priority::Highest => write!(f, "HIGHEST"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Priority::Low),
            "NORMAL" => Ok(Priority::Normal),
            "HIGH" => Ok(Priority::High),
            "HIGHEST" => Ok(Priority::Highest),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// Run status of a [`ReportRequest`].
///
/// ```text
/// REQUESTED ─► QUEUED ─► PROCESSING ─► COMPLETED | FAILED
///     └──────────────────────┘ (synchronous runs skip the queue)
/// ```
/// The "saved" flag is orthogonal to status and lives on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Requested,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReportStatus::Completed | ReportStatus::Failed)
    }

    /// Forward transitions only. Re-queueing a finished request goes through
    /// [`ReportRequest::requeue`] instead.
    pub fn can_advance_to(self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, next),
            (Requested, Queued)
                | (Requested, Processing)
                | (Queued, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Requested => write!(f, "REQUESTED"),
            ReportStatus::Queued => write!(f, "QUEUED"),
            ReportStatus::Processing => write!(f, "PROCESSING"),
            ReportStatus::Completed => write!(f, "COMPLETED"),
            ReportStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Refused status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move report request from {from} to {to}")]
pub struct TransitionError {
    pub from: ReportStatus,
    pub to: ReportStatus,
}

/// Which report definition to evaluate, and with what parameter values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefinitionRef {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl DefinitionRef {
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// The rendering mode a request was made with: a renderer type name plus the
/// renderer-specific output argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeRef {
    pub renderer: String,
    #[serde(default)]
    pub argument: String,
}

impl ModeRef {
    pub fn new(renderer: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            renderer: renderer.into(),
            argument: argument.into(),
        }
    }
}

/// One request to produce a report.
///
/// The identifier and status are private: the identifier is assigned once
/// and never changes, and status only moves forward (or back to QUEUED
/// through an explicit re-queue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRequest {
    uuid: Option<Uuid>,
    pub definition: DefinitionRef,
    pub mode: ModeRef,
    pub priority: Priority,
    status: ReportStatus,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub evaluate_started_at: Option<DateTime<Utc>>,
    pub evaluate_completed_at: Option<DateTime<Utc>>,
    pub render_completed_at: Option<DateTime<Utc>>,
    saved: bool,
    pub label: Option<String>,
}

impl ReportRequest {
    pub fn new(
        definition: DefinitionRef,
        mode: ModeRef,
        priority: Priority,
        requested_by: impl Into<String>,
    ) -> Self {
        Self {
            uuid: None,
            definition,
            mode,
            priority,
            status: ReportStatus::Requested,
            requested_by: requested_by.into(),
            requested_at: Utc::now(),
            evaluate_started_at: None,
            evaluate_completed_at: None,
            render_completed_at: None,
            saved: false,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn requested_on(mut self, at: DateTime<Utc>) -> Self {
        self.requested_at = at;
        self
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    /// Assign an identifier if none exists yet; returns the identifier.
    pub fn ensure_uuid(&mut self) -> Uuid {
        *self.uuid.get_or_insert_with(Uuid::new_v4)
    }

    pub fn status(&self) -> ReportStatus {
        self.status
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    /// Mark as saved. There is no way to clear the flag.
    pub fn mark_saved(&mut self) {
        self.saved = true;
    }

    pub fn advance_to(&mut self, next: ReportStatus) -> Result<(), TransitionError> {
        if !self.status.can_advance_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Put a finished request back in the queue with fresh run timestamps.
    pub fn requeue(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.is_terminal() {
            return Err(TransitionError {
                from: self.status,
                to: ReportStatus::Queued,
            });
        }
        self.status = ReportStatus::Queued;
        self.requested_at = now;
        self.evaluate_started_at = None;
        self.evaluate_completed_at = None;
        self.render_completed_at = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ReportRequest {
        ReportRequest::new(
            DefinitionRef::new(Uuid::new_v4(), "monthly"),
            ModeRef::new("web", ""),
            Priority::Normal,
            "admin",
        )
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::Highest > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!("high".parse::<Priority>().unwrap(), Priority::High);
    }

    #[test]
    fn uuid_is_assigned_once() {
        let mut req = request();
        assert!(req.uuid().is_none());
        let first = req.ensure_uuid();
        let second = req.ensure_uuid();
        assert_eq!(first, second);
        assert_eq!(req.uuid(), Some(first));
    }

    #[test]
    fn status_only_moves_forward() {
        let mut req = request();
        req.advance_to(ReportStatus::Queued).unwrap();
        req.advance_to(ReportStatus::Processing).unwrap();
        assert!(req.advance_to(ReportStatus::Queued).is_err());
        req.advance_to(ReportStatus::Completed).unwrap();
        let err = req.advance_to(ReportStatus::Failed).unwrap_err();
        assert_eq!(err.from, ReportStatus::Completed);
    }

    #[test]
    fn requeue_only_from_terminal() {
        let mut req = request();
        req.advance_to(ReportStatus::Queued).unwrap();
        assert!(req.requeue(Utc::now()).is_err());

        req.advance_to(ReportStatus::Processing).unwrap();
        req.evaluate_started_at = Some(Utc::now());
        req.advance_to(ReportStatus::Failed).unwrap();
        req.mark_saved();

        req.requeue(Utc::now()).unwrap();
        assert_eq!(req.status(), ReportStatus::Queued);
        assert!(req.evaluate_started_at.is_none());
        assert!(req.is_saved(), "saved flag survives a re-queue");
    }

    #[test]
    fn serde_round_trip_keeps_private_fields() {
        let mut req = request().with_label("quarterly board pack");
        req.ensure_uuid();
        req.mark_saved();
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"status\":\"REQUESTED\""));
        let back: ReportRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }
}
