pub mod definition;
pub mod design;
pub mod engine;
pub mod error;
pub mod history;
pub mod renderer;
pub mod report;
pub mod request;
pub mod scheduler;

pub use definition::{DefinitionEvaluator, EvaluationContext, EvaluationError, ReportDefinition, StaticEvaluator};
pub use design::{DesignStore, MemoryDesignStore, ReportDesign};
pub use engine::{ExecutionFailure, ExecutionOutcome, ReportEngine};
pub use error::{EngineError, ReportError, StoreError};
pub use history::{FileHistory, MemoryHistory, ReportHistory};
pub use renderer::{
    JsonRenderer, RenderContext, RenderError, RendererRegistry, RenderingMode, ReportRenderer, WebRenderer,
};
pub use report::{DataSet, ErrorDetail, FailureStage, RenderedArtifact, Report, ReportData};
pub use request::{DefinitionRef, ModeRef, Priority, ReportRequest, ReportStatus};
pub use scheduler::{ReportScheduler, SchedulerMetrics};
