use crate::definition::{ReportDefinition, REPORT_TYPE};
use crate::design::ReportDesign;
use crate::report::{RenderedArtifact, ReportData};

use super::{RenderContext, RenderError, RenderingMode, ReportRenderer};

/// Browser view of the evaluated data. Data-only: requests made with this
/// renderer are evaluated but never rendered to a file.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebRenderer;

impl WebRenderer {
    pub const TYPE_NAME: &'static str = "web";
}

impl ReportRenderer for WebRenderer {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn handled_types(&self) -> &[&'static str] {
        &[REPORT_TYPE]
    }

    fn rendering_modes(&self, _definition: &ReportDefinition, _designs: &[ReportDesign]) -> Vec<RenderingMode> {
        vec![RenderingMode::new(Self::TYPE_NAME, "Web Preview", "", 100)]
    }

    fn is_data_only(&self) -> bool {
        true
    }

    fn render(&self, _data: &ReportData, _ctx: &RenderContext<'_>) -> Result<RenderedArtifact, RenderError> {
        Err(RenderError::Unsupported(Self::TYPE_NAME.to_string()))
    }
}
