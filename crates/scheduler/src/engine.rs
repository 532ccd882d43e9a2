//! Execution engine: evaluates one request and, unless its mode is
//! data-only, renders the result.
//!
//! Ordinary evaluation and render failures never escape as errors. They set
//! the request to FAILED and travel inside the returned [`ExecutionOutcome`]
//! so the caller decides whether to surface them. [`EngineError`] is kept
//! for contract violations such as an unresolvable definition.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::definition::{DefinitionEvaluator, EvaluationContext, EvaluationError};
use crate::design::{DesignStore, ReportDesign};
use crate::error::EngineError;
use crate::history::ReportHistory;
use crate::renderer::{RenderContext, RenderError, RendererRegistry};
use crate::report::{ErrorDetail, FailureStage, Report, ReportData};
use crate::request::{ModeRef, ReportRequest, ReportStatus};

/// A failure captured during a run.
#[derive(Debug, Error)]
pub enum ExecutionFailure {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl ExecutionFailure {
    pub fn stage(&self) -> FailureStage {
        match self {
            Self::Evaluation(_) => FailureStage::Evaluation,
            Self::Render(_) => FailureStage::Render,
        }
    }
}

/// Result of one engine run. `failure` is set exactly when the report
/// carries an error detail.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub report: Report,
    pub failure: Option<ExecutionFailure>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs requests against the injected evaluator, renderers and stores.
pub struct ReportEngine {
    registry: Arc<RendererRegistry>,
    evaluator: Arc<dyn DefinitionEvaluator>,
    designs: Arc<dyn DesignStore>,
    history: Arc<dyn ReportHistory>,
}

impl ReportEngine {
    pub fn new(
        registry: Arc<RendererRegistry>,
        evaluator: Arc<dyn DefinitionEvaluator>,
        designs: Arc<dyn DesignStore>,
        history: Arc<dyn ReportHistory>,
    ) -> Self {
        Self {
            registry,
            evaluator,
            designs,
            history,
        }
    }

    /// Execute a PROCESSING request, leaving it COMPLETED or FAILED.
    ///
    /// The request's timestamps are stamped as each stage finishes and
    /// written to history straight away, so a crash between evaluation and
    /// rendering leaves the partial progress visible. The report itself is
    /// not persisted here.
    pub fn execute(&self, request: &mut ReportRequest) -> Result<ExecutionOutcome, EngineError> {
        let uuid = request.uuid().ok_or(EngineError::MissingIdentifier)?;
        if request.status() != ReportStatus::Processing {
            return Err(EngineError::NotProcessing {
                uuid,
                status: request.status(),
            });
        }

        let definition = self
            .evaluator
            .definition(&request.definition.uuid)
            .ok_or(EngineError::UnknownDefinition(request.definition.uuid))?;
        let renderer = self
            .registry
            .get_report_renderer(&request.mode.renderer)
            .ok_or_else(|| EngineError::UnknownRenderer(request.mode.renderer.clone()))?;

        let context = EvaluationContext {
            evaluation_date: Utc::now(),
            parameters: request.definition.parameters.clone(),
            requested_by: request.requested_by.clone(),
        };

        request.evaluate_started_at = Some(Utc::now());
        self.checkpoint(request);
        let data = match self.evaluator.evaluate(&definition, &context) {
            Ok(data) => data,
            Err(e) => return self.fail(request, uuid, None, e.into()),
        };
        request.evaluate_completed_at = Some(Utc::now());
        debug!(uuid = %uuid, data_sets = data.data_sets.len(), "Evaluated report definition");

        if renderer.is_data_only() {
            request.advance_to(ReportStatus::Completed)?;
            return Ok(ExecutionOutcome {
                report: Report::from_parts(uuid, Some(data), None, None),
                failure: None,
            });
        }
        self.checkpoint(request);

        let design = self.resolve_design(&request.mode, renderer.type_name());
        let ctx = RenderContext {
            argument: &request.mode.argument,
            design: design.as_ref(),
        };
        match renderer.render(&data, &ctx) {
            Ok(artifact) => {
                request.render_completed_at = Some(Utc::now());
                request.advance_to(ReportStatus::Completed)?;
                Ok(ExecutionOutcome {
                    report: Report::from_parts(uuid, Some(data), Some(artifact), None),
                    failure: None,
                })
            }
            Err(e) => self.fail(request, uuid, Some(data), e.into()),
        }
    }

    fn fail(
        &self,
        request: &mut ReportRequest,
        uuid: Uuid,
        data: Option<ReportData>,
        failure: ExecutionFailure,
    ) -> Result<ExecutionOutcome, EngineError> {
        request.advance_to(ReportStatus::Failed)?;
        let detail = ErrorDetail::from_error(failure.stage(), &failure);
        Ok(ExecutionOutcome {
            report: Report::failed(uuid, data, detail),
            failure: Some(failure),
        })
    }

    /// The design named by a mode argument, if it belongs to `renderer_type`.
    fn resolve_design(&self, mode: &ModeRef, renderer_type: &str) -> Option<ReportDesign> {
        let design_uuid = Uuid::parse_str(&mode.argument).ok()?;
        match self.designs.get_by_uuid(&design_uuid) {
            Ok(design) => design.filter(|d| d.renderer_type == renderer_type),
            Err(e) => {
                warn!("Failed to load report design {}: {}", design_uuid, e);
                None
            }
        }
    }

    fn checkpoint(&self, request: &ReportRequest) {
        if let Err(e) = self.history.save_request(request) {
            warn!(uuid = ?request.uuid(), "Failed to record report progress: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::definition::{ReportDefinition, StaticEvaluator};
    use crate::design::MemoryDesignStore;
    use crate::history::MemoryHistory;
    use crate::report::DataSet;
    use crate::request::{DefinitionRef, Priority};

    struct Fixture {
        engine: ReportEngine,
        history: Arc<MemoryHistory>,
        designs: Arc<MemoryDesignStore>,
        definition: ReportDefinition,
    }

    fn fixture() -> Fixture {
        let evaluator = Arc::new(StaticEvaluator::new());
        let definition = ReportDefinition::new(Uuid::new_v4(), "visits");
        let mut data_sets = IndexMap::new();
        data_sets.insert(
            "visits".to_string(),
            DataSet {
                columns: vec!["site".into(), "count".into()],
                rows: vec![vec!["north".into(), 12.into()]],
            },
        );
        evaluator.register(definition.clone(), data_sets);

        let history = Arc::new(MemoryHistory::new());
        let designs = Arc::new(MemoryDesignStore::new());
        let engine = ReportEngine::new(
            Arc::new(RendererRegistry::with_builtin()),
            evaluator,
            designs.clone(),
            history.clone(),
        );
        Fixture {
            engine,
            history,
            designs,
            definition,
        }
    }

    fn processing(definition: &ReportDefinition, renderer: &str, argument: &str) -> ReportRequest {
        let mut request = ReportRequest::new(
            DefinitionRef::new(definition.uuid, definition.name.clone()),
            ModeRef::new(renderer, argument),
            Priority::Normal,
            "tester",
        );
        request.ensure_uuid();
        request.advance_to(ReportStatus::Processing).unwrap();
        request
    }

    #[test]
    fn data_only_mode_skips_rendering() {
        let f = fixture();
        let mut request = processing(&f.definition, "web", "");
        let outcome = f.engine.execute(&mut request).unwrap();

        assert!(outcome.is_success());
        assert!(outcome.report.data().is_some());
        assert!(outcome.report.artifact().is_none());
        assert_eq!(request.status(), ReportStatus::Completed);
        assert!(request.evaluate_completed_at.is_some());
        assert!(request.render_completed_at.is_none());
    }

    #[test]
    fn artifact_mode_renders_after_evaluation() {
        let f = fixture();
        let mut request = processing(&f.definition, "json", "");
        let outcome = f.engine.execute(&mut request).unwrap();

        let artifact = outcome.report.artifact().unwrap();
        assert_eq!(artifact.content_type, "application/json");
        assert!(!artifact.content.is_empty());
        assert!(outcome.report.data().is_some());
        assert!(request.render_completed_at.unwrap() >= request.evaluate_completed_at.unwrap());
    }

    #[test]
    fn evaluation_stamps_are_checkpointed() {
        let f = fixture();
        let mut request = processing(&f.definition, "json", "");
        f.engine.execute(&mut request).unwrap();

        // Last checkpoint happens before rendering.
        let stored = f.history.get_request(&request.uuid().unwrap()).unwrap().unwrap();
        assert!(stored.evaluate_completed_at.is_some());
        assert!(stored.render_completed_at.is_none());
    }

    #[test]
    fn evaluation_failure_is_captured() {
        let f = fixture();
        let mut request = processing(&f.definition, "json", "");
        request.definition.uuid = Uuid::new_v4();
        assert!(matches!(
            f.engine.execute(&mut request),
            Err(EngineError::UnknownDefinition(_))
        ));

        let evaluator = StaticEvaluator::new();
        let strict = crate::definition::StaticDefinition {
            definition: f.definition.clone(),
            required_parameters: vec!["month".into()],
            data_sets: IndexMap::new(),
        };
        evaluator.insert(strict);
        let engine = ReportEngine::new(
            Arc::new(RendererRegistry::with_builtin()),
            Arc::new(evaluator),
            f.designs.clone(),
            f.history.clone(),
        );
        let mut request = processing(&f.definition, "json", "");
        let outcome = engine.execute(&mut request).unwrap();

        assert!(matches!(outcome.failure, Some(ExecutionFailure::Evaluation(_))));
        assert_eq!(request.status(), ReportStatus::Failed);
        assert_eq!(outcome.report.error().unwrap().stage, FailureStage::Evaluation);
        assert!(request.evaluate_completed_at.is_none());
    }

    #[test]
    fn render_failure_keeps_evaluated_data() {
        let f = fixture();
        let mut request = processing(&f.definition, "json", "not-a-design");
        let outcome = f.engine.execute(&mut request).unwrap();

        assert!(matches!(outcome.failure, Some(ExecutionFailure::Render(_))));
        assert_eq!(request.status(), ReportStatus::Failed);
        assert!(outcome.report.data().is_some());
        assert!(outcome.report.artifact().is_none());
        assert_eq!(outcome.report.error().unwrap().stage, FailureStage::Render);
    }

    #[test]
    fn design_argument_selects_design() {
        let f = fixture();
        let design = f
            .designs
            .save(ReportDesign::new("compact", f.definition.uuid, "json").with_property("pretty", "false"))
            .unwrap();
        let mut request = processing(&f.definition, "json", &design.uuid.to_string());
        let outcome = f.engine.execute(&mut request).unwrap();

        let content = &outcome.report.artifact().unwrap().content;
        assert!(!content.contains(&b'\n'), "compact output has no newlines");
    }

    #[test]
    fn rejects_requests_that_are_not_processing() {
        let f = fixture();
        let mut request = ReportRequest::new(
            DefinitionRef::new(f.definition.uuid, "visits"),
            ModeRef::new("web", ""),
            Priority::Normal,
            "tester",
        );
        assert!(matches!(f.engine.execute(&mut request), Err(EngineError::MissingIdentifier)));
        request.ensure_uuid();
        assert!(matches!(f.engine.execute(&mut request), Err(EngineError::NotProcessing { .. })));
    }
}
