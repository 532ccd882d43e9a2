use thiserror::Error;
use uuid::Uuid;

use reportd_core::CoreError;

use crate::definition::EvaluationError;
use crate::renderer::RenderError;
use crate::request::{ReportStatus, TransitionError};

/// Errors from the history and design stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("report request has no identifier")]
    MissingIdentifier,
}

/// Contract violations detected by the execution engine. Ordinary
/// evaluation and render failures are never reported this way; they end up
/// in the report's error detail.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("report request has no identifier")]
    MissingIdentifier,
    #[error("unknown report definition {0}")]
    UnknownDefinition(Uuid),
    #[error("unknown report renderer '{0}'")]
    UnknownRenderer(String),
    #[error("report request {uuid} is {status}, expected PROCESSING")]
    NotProcessing { uuid: Uuid, status: ReportStatus },
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Caller-facing error of the report scheduler.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("report request not found: {0}")]
    NotFound(Uuid),

    #[error("cannot {action} report request {uuid} while it is {status}")]
    InvalidState {
        uuid: Uuid,
        status: ReportStatus,
        action: &'static str,
    },

    #[error("report request {0} is saved and cannot be deleted")]
    Saved(Uuid),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("history store error: {0}")]
    Store(#[from] StoreError),

    #[error("execution engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("configuration error: {0}")]
    Config(#[from] CoreError),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to start background task: {0}")]
    Spawn(#[from] std::io::Error),
}
