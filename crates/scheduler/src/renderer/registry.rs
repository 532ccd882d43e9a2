use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::definition::ReportDefinition;
use crate::design::ReportDesign;

use super::{type_specificity, ReportRenderer};

/// Registered renderers, in registration order.
#[derive(Default)]
pub struct RendererRegistry {
    renderers: RwLock<Vec<Arc<dyn ReportRenderer>>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in web and JSON renderers.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(super::WebRenderer));
        registry.register(Arc::new(super::JsonRenderer));
        registry
    }

    /// Register a renderer. Registering a type name twice replaces the
    /// earlier renderer but keeps its position.
    pub fn register(&self, renderer: Arc<dyn ReportRenderer>) {
        let mut renderers = self.renderers.write().unwrap_or_else(|e| e.into_inner());
        let name = renderer.type_name().to_string();
        if let Some(slot) = renderers.iter_mut().find(|r| r.type_name() == name) {
            warn!("Replacing report renderer '{}'", name);
            *slot = renderer;
        } else {
            info!("Registered report renderer '{}' (types: {:?})", name, renderer.handled_types());
            renderers.push(renderer);
        }
    }

    pub fn get_report_renderers(&self) -> Vec<Arc<dyn ReportRenderer>> {
        self.renderers.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Resolve by declared type name.
    pub fn get_report_renderer(&self, type_name: &str) -> Option<Arc<dyn ReportRenderer>> {
        let renderers = self.renderers.read().unwrap_or_else(|e| e.into_inner());
        renderers.iter().find(|r| r.type_name() == type_name).cloned()
    }

    /// Best renderer for an object type path: the most specific declared
    /// match wins, earlier registration breaks ties.
    pub fn get_preferred_report_renderer(&self, object_type: &str) -> Option<Arc<dyn ReportRenderer>> {
        let renderers = self.renderers.read().unwrap_or_else(|e| e.into_inner());
        let mut best: Option<(usize, &Arc<dyn ReportRenderer>)> = None;
        for renderer in renderers.iter() {
            let Some(score) = Self::best_match(renderer.as_ref(), object_type) else {
                continue;
            };
            // Strictly greater keeps the first registered on ties.
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, renderer));
            }
        }
        best.map(|(_, r)| Arc::clone(r))
    }

    /// Every mode of every renderer able to present `definition`, highest
    /// sort weight first, then registration order, then label.
    ///
    /// `designs` may hold designs for any renderer; each renderer only sees
    /// its own.
    pub fn get_rendering_modes(
        &self,
        definition: &ReportDefinition,
        designs: &[ReportDesign],
    ) -> Vec<super::RenderingMode> {
        let renderers = self.renderers.read().unwrap_or_else(|e| e.into_inner());
        let mut modes: Vec<(usize, super::RenderingMode)> = Vec::new();
        for (position, renderer) in renderers.iter().enumerate() {
            if Self::best_match(renderer.as_ref(), &definition.output_type).is_none() {
                continue;
            }
            let own: Vec<ReportDesign> = designs
                .iter()
                .filter(|d| d.renderer_type == renderer.type_name() && !d.retired)
                .cloned()
                .collect();
            for mode in renderer.rendering_modes(definition, &own) {
                modes.push((position, mode));
            }
        }
        modes.sort_by(|(pa, a), (pb, b)| {
            b.sort_weight
                .cmp(&a.sort_weight)
                .then(pa.cmp(pb))
                .then_with(|| a.label.cmp(&b.label))
        });
        modes.into_iter().map(|(_, m)| m).collect()
    }

    fn best_match(renderer: &dyn ReportRenderer, object_type: &str) -> Option<usize> {
        renderer
            .handled_types()
            .iter()
            .filter_map(|declared| type_specificity(declared, object_type))
            .max()
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::renderer::{RenderContext, RenderError, RenderingMode};
    use crate::report::{RenderedArtifact, ReportData};

    struct Fake {
        name: &'static str,
        types: &'static [&'static str],
        weight: i32,
    }

    impl ReportRenderer for Fake {
        fn type_name(&self) -> &str {
            self.name
        }
        fn handled_types(&self) -> &[&'static str] {
            self.types
        }
        fn rendering_modes(&self, _d: &ReportDefinition, _designs: &[ReportDesign]) -> Vec<RenderingMode> {
            vec![RenderingMode::new(self.name, self.name.to_uppercase(), "", self.weight)]
        }
        fn render(&self, _data: &ReportData, _ctx: &RenderContext<'_>) -> Result<RenderedArtifact, RenderError> {
            Err(RenderError::Failed("fake".into()))
        }
    }

    fn fake(name: &'static str, types: &'static [&'static str], weight: i32) -> Arc<dyn ReportRenderer> {
        Arc::new(Fake { name, types, weight })
    }

    #[test]
    fn resolves_by_type_name() {
        let registry = RendererRegistry::with_builtin();
        assert_eq!(registry.get_report_renderers().len(), 2);
        assert!(registry.get_report_renderer("json").is_some());
        assert!(registry.get_report_renderer("pdf").is_none());
        assert!(registry.get_report_renderer("web").unwrap().is_data_only());
        assert!(!registry.get_report_renderer("json").unwrap().is_data_only());
    }

    #[test]
    fn most_specific_match_wins_then_registration_order() {
        let registry = RendererRegistry::new();
        registry.register(fake("generic", &["report"], 0));
        registry.register(fake("indicator", &["report/indicator"], 0));
        registry.register(fake("generic2", &["report"], 0));

        let r = registry.get_preferred_report_renderer("report/indicator/monthly").unwrap();
        assert_eq!(r.type_name(), "indicator");

        let r = registry.get_preferred_report_renderer("report/cohort").unwrap();
        assert_eq!(r.type_name(), "generic", "tie goes to the first registered");

        assert!(registry.get_preferred_report_renderer("dataset").is_none());
    }

    #[test]
    fn rendering_modes_are_sorted_and_stable() {
        let registry = RendererRegistry::new();
        registry.register(fake("low", &["report"], 1));
        registry.register(fake("high", &["report"], 10));
        registry.register(fake("other", &["dataset"], 99));
        registry.register(fake("also_low", &["report"], 1));

        let def = ReportDefinition::new(Uuid::new_v4(), "d");
        let first: Vec<String> = registry.get_rendering_modes(&def, &[]).into_iter().map(|m| m.renderer).collect();
        let second: Vec<String> = registry.get_rendering_modes(&def, &[]).into_iter().map(|m| m.renderer).collect();
        assert_eq!(first, vec!["high", "low", "also_low"]);
        assert_eq!(first, second);
    }

    #[test]
    fn re_registering_keeps_position() {
        let registry = RendererRegistry::new();
        registry.register(fake("a", &["report"], 0));
        registry.register(fake("b", &["report"], 0));
        registry.register(fake("a", &["report/x"], 0));
        let names: Vec<String> = registry
            .get_report_renderers()
            .iter()
            .map(|r| r.type_name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(registry.get_report_renderer("a").unwrap().handled_types(), &["report/x"]);
    }
}
