use indexmap::IndexMap;

use crate::definition::{ReportDefinition, REPORT_TYPE};
use crate::design::ReportDesign;
use crate::report::{RenderedArtifact, ReportData};

use super::{RenderContext, RenderError, RenderingMode, ReportRenderer};

/// Downloadable JSON export of the evaluated data sets.
///
/// The default mode exports every data set, pretty-printed. Each JSON design
/// of the definition adds a mode whose argument is the design uuid; the
/// design may set `pretty` (`true`/`false`) and `data_sets` (comma-separated
/// names to keep).
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRenderer;

impl JsonRenderer {
    pub const TYPE_NAME: &'static str = "json";
    pub const CONTENT_TYPE: &'static str = "application/json";
}

impl ReportRenderer for JsonRenderer {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }

    fn handled_types(&self) -> &[&'static str] {
        &[REPORT_TYPE]
    }

    fn rendering_modes(&self, _definition: &ReportDefinition, designs: &[ReportDesign]) -> Vec<RenderingMode> {
        let mut modes = vec![RenderingMode::new(Self::TYPE_NAME, "JSON", "", 50)];
        modes.extend(
            designs
                .iter()
                .map(|d| RenderingMode::new(Self::TYPE_NAME, d.name.clone(), d.uuid.to_string(), 25)),
        );
        modes
    }

    fn render(&self, data: &ReportData, ctx: &RenderContext<'_>) -> Result<RenderedArtifact, RenderError> {
        if !ctx.argument.is_empty() && ctx.design.is_none() {
            return Err(RenderError::InvalidArgument {
                argument: ctx.argument.to_string(),
                reason: "no JSON design with this uuid".to_string(),
            });
        }

        let pretty = ctx
            .design
            .and_then(|d| d.property("pretty"))
            .map_or(true, |v| v != "false");
        let keep: Option<Vec<&str>> = ctx
            .design
            .and_then(|d| d.property("data_sets"))
            .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).collect());

        let data_sets: IndexMap<&String, &crate::report::DataSet> = data
            .data_sets
            .iter()
            .filter(|(name, _)| keep.as_ref().map_or(true, |k| k.contains(&name.as_str())))
            .collect();

        let body = serde_json::json!({
            "definition": data.definition_name,
            "evaluated_at": data.evaluated_at,
            "parameters": data.parameters,
            "data_sets": data_sets,
        });
        let content = if pretty {
            serde_json::to_vec_pretty(&body)?
        } else {
            serde_json::to_vec(&body)?
        };

        Ok(RenderedArtifact {
            content_type: Self::CONTENT_TYPE.to_string(),
            file_name: format!("{}.json", file_stem(&data.definition_name)),
            content,
        })
    }
}

fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if stem.is_empty() { "report".to_string() } else { stem }
}
