//! Rendering capabilities and the registry that selects among them.
//!
//! A renderer declares the object type paths it can present (see
//! [`type_specificity`]) and the rendering modes it offers for a given
//! definition. Data-only renderers (browser views) stop after evaluation;
//! every other renderer turns [`ReportData`] into a [`RenderedArtifact`].

pub mod json;
pub mod registry;
pub mod web;

pub use json::JsonRenderer;
pub use registry::RendererRegistry;
pub use web::WebRenderer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::definition::ReportDefinition;
use crate::design::ReportDesign;
use crate::report::{RenderedArtifact, ReportData};
use crate::request::ModeRef;

/// Why rendering failed after a successful evaluation.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer '{0}' does not produce artifacts")]
    Unsupported(String),

    #[error("invalid rendering argument '{argument}': {reason}")]
    InvalidArgument { argument: String, reason: String },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),
}

/// A renderer plus output argument offered for one definition. Computed on
/// demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderingMode {
    pub renderer: String,
    pub label: String,
    pub argument: String,
    /// Higher sorts first.
    pub sort_weight: i32,
}

impl RenderingMode {
    pub fn new(renderer: &str, label: impl Into<String>, argument: impl Into<String>, sort_weight: i32) -> Self {
        Self {
            renderer: renderer.to_string(),
            label: label.into(),
            argument: argument.into(),
            sort_weight,
        }
    }

    pub fn to_ref(&self) -> ModeRef {
        ModeRef::new(self.renderer.clone(), self.argument.clone())
    }
}

/// Per-call rendering inputs.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub argument: &'a str,
    /// Design selected by the argument, when the argument names one.
    pub design: Option<&'a ReportDesign>,
}

/// Capability contract every renderer implements.
pub trait ReportRenderer: Send + Sync {
    /// Unique name used in [`ModeRef::renderer`].
    fn type_name(&self) -> &str;

    /// Object type paths this renderer can present.
    fn handled_types(&self) -> &[&'static str];

    /// Modes offered for `definition`. `designs` holds the non-retired
    /// designs of that definition bound to this renderer.
    fn rendering_modes(&self, definition: &ReportDefinition, designs: &[ReportDesign]) -> Vec<RenderingMode>;

    /// Browser-oriented renderers only need the evaluated data.
    fn is_data_only(&self) -> bool {
        false
    }

    fn render(&self, data: &ReportData, ctx: &RenderContext<'_>) -> Result<RenderedArtifact, RenderError>;
}

/// How specifically `declared` matches `target`, as a number of path
/// segments, or `None` when it does not match. `report` matches `report`
/// and `report/indicator`, but not `reporting`.
pub fn type_specificity(declared: &str, target: &str) -> Option<usize> {
    let matches = target == declared
        || (target.starts_with(declared) && target[declared.len()..].starts_with('/'));
    matches.then(|| declared.split('/').filter(|s| !s.is_empty()).count())
}
