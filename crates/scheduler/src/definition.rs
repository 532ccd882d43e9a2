//! Report definitions and the evaluator collaborator that turns them into
//! raw [`ReportData`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::report::{DataSet, ReportData};

/// Type path every plain report definition declares. Renderers match on
/// `/`-separated type paths, so `report/indicator` is a more specific kind
/// of `report`.
pub const REPORT_TYPE: &str = "report";

/// A report definition as far as the scheduler is concerned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDefinition {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_output_type")]
    pub output_type: String,
}

fn default_output_type() -> String {
    REPORT_TYPE.to_string()
}

impl ReportDefinition {
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
            description: None,
            output_type: default_output_type(),
        }
    }
}

/// Inputs to one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub evaluation_date: DateTime<Utc>,
    pub parameters: BTreeMap<String, serde_json::Value>,
    pub requested_by: String,
}

/// Why a definition could not be evaluated.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("data set '{name}' failed: {reason}")]
    DataSet { name: String, reason: String },

    #[error("query failed: {0}")]
    Query(String),

    #[error("missing dependency: {0}")]
    MissingDependency(String),
}

/// The definition evaluation engine, injected into the scheduler.
pub trait DefinitionEvaluator: Send + Sync {
    /// Resolve a definition by identifier.
    fn definition(&self, uuid: &Uuid) -> Option<ReportDefinition>;

    /// Evaluate a definition into raw data.
    fn evaluate(
        &self,
        definition: &ReportDefinition,
        context: &EvaluationContext,
    ) -> Result<ReportData, EvaluationError>;
}

// ── Static evaluator ──────────────────────────────────────────

/// One entry of a static definition catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticDefinition {
    #[serde(flatten)]
    pub definition: ReportDefinition,
    #[serde(default)]
    pub required_parameters: Vec<String>,
    #[serde(default)]
    pub data_sets: IndexMap<String, DataSet>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StaticCatalog {
    #[serde(default)]
    definitions: Vec<StaticDefinition>,
}

/// Evaluator over definitions whose data sets are fixed in memory.
///
/// Evaluation checks required parameters and returns the stored data sets
/// unchanged. Used by the `report-worker` binary (loaded from a JSON
/// catalog) and by tests.
#[derive(Debug, Default)]
pub struct StaticEvaluator {
    definitions: RwLock<IndexMap<Uuid, StaticDefinition>>,
}

impl StaticEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog of the form `{"definitions": [...]}`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        let catalog: StaticCatalog = serde_json::from_str(&json)?;
        let evaluator = Self::new();
        for entry in catalog.definitions {
            evaluator.insert(entry);
        }
        Ok(evaluator)
    }

    pub fn insert(&self, entry: StaticDefinition) {
        let mut definitions = self
            .definitions
            .write()
            .unwrap_or_else(|e| e.into_inner());
        definitions.insert(entry.definition.uuid, entry);
    }

    /// Register a definition with its data sets and no required parameters.
    pub fn register(&self, definition: ReportDefinition, data_sets: IndexMap<String, DataSet>) {
        self.insert(StaticDefinition {
            definition,
            required_parameters: Vec::new(),
            data_sets,
        });
    }

    pub fn find_by_name(&self, name: &str) -> Option<ReportDefinition> {
        let definitions = self.definitions.read().unwrap_or_else(|e| e.into_inner());
        definitions
            .values()
            .find(|d| d.definition.name.eq_ignore_ascii_case(name))
            .map(|d| d.definition.clone())
    }

    pub fn definitions(&self) -> Vec<ReportDefinition> {
        let definitions = self.definitions.read().unwrap_or_else(|e| e.into_inner());
        definitions.values().map(|d| d.definition.clone()).collect()
    }
}

impl DefinitionEvaluator for StaticEvaluator {
    fn definition(&self, uuid: &Uuid) -> Option<ReportDefinition> {
        let definitions = self.definitions.read().unwrap_or_else(|e| e.into_inner());
        definitions.get(uuid).map(|d| d.definition.clone())
    }

    fn evaluate(
        &self,
        definition: &ReportDefinition,
        context: &EvaluationContext,
    ) -> Result<ReportData, EvaluationError> {
        let definitions = self.definitions.read().unwrap_or_else(|e| e.into_inner());
        let entry = definitions
            .get(&definition.uuid)
            .ok_or_else(|| EvaluationError::MissingDependency(format!("definition {}", definition.uuid)))?;

        for name in &entry.required_parameters {
            if !context.parameters.contains_key(name) {
                return Err(EvaluationError::MissingParameter(name.clone()));
            }
        }

        Ok(ReportData {
            definition_uuid: definition.uuid,
            definition_name: definition.name.clone(),
            evaluated_at: context.evaluation_date,
            parameters: context.parameters.clone(),
            data_sets: entry.data_sets.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(parameters: &[(&str, serde_json::Value)]) -> EvaluationContext {
        EvaluationContext {
            evaluation_date: Utc::now(),
            parameters: parameters
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            requested_by: "tester".to_string(),
        }
    }

    #[test]
    fn evaluates_registered_data_sets() {
        let evaluator = StaticEvaluator::new();
        let definition = ReportDefinition::new(Uuid::new_v4(), "Visits");
        let mut sets = IndexMap::new();
        sets.insert(
            "visits".to_string(),
            DataSet {
                columns: vec!["clinic".into(), "count".into()],
                rows: vec![vec![serde_json::json!("north"), serde_json::json!(12)]],
            },
        );
        evaluator.register(definition.clone(), sets);

        let data = evaluator.evaluate(&definition, &context(&[])).unwrap();
        assert_eq!(data.definition_name, "Visits");
        assert_eq!(data.data_sets["visits"].row_count(), 1);
        assert_eq!(evaluator.find_by_name("visits").map(|d| d.uuid), Some(definition.uuid));
    }

    #[test]
    fn missing_required_parameter_fails() {
        let evaluator = StaticEvaluator::new();
        let definition = ReportDefinition::new(Uuid::new_v4(), "Cohort");
        evaluator.insert(StaticDefinition {
            definition: definition.clone(),
            required_parameters: vec!["startDate".to_string()],
            data_sets: IndexMap::new(),
        });

        let err = evaluator.evaluate(&definition, &context(&[])).unwrap_err();
        assert!(matches!(err, EvaluationError::MissingParameter(ref p) if p == "startDate"));

        let ok = evaluator.evaluate(&definition, &context(&[("startDate", serde_json::json!("2024-01-01"))]));
        assert!(ok.is_ok());
    }

    #[test]
    fn catalog_file_parses_flattened_definitions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let id = Uuid::new_v4();
        std::fs::write(
            &path,
            serde_json::json!({
                "definitions": [{
                    "uuid": id,
                    "name": "Monthly",
                    "required_parameters": ["month"],
                    "data_sets": { "totals": { "columns": ["n"], "rows": [[1]] } }
                }]
            })
            .to_string(),
        )
        .unwrap();

        let evaluator = StaticEvaluator::from_json_file(&path).unwrap();
        let definition = evaluator.definition(&id).unwrap();
        assert_eq!(definition.output_type, REPORT_TYPE);
        assert_eq!(evaluator.definitions().len(), 1);
    }
}
