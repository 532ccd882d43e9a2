//! Report designs: persisted bindings of a report definition to a renderer
//! type, with a property bag and attached resource files.

use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;

/// A file attached to a design (template, stylesheet, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignResource {
    pub name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDesign {
    /// Numeric id, assigned on first save.
    pub id: Option<u64>,
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub definition_uuid: Uuid,
    /// Type name of the renderer this design configures.
    pub renderer_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: Vec<DesignResource>,
    #[serde(default)]
    pub retired: bool,
}

impl ReportDesign {
    pub fn new(name: impl Into<String>, definition_uuid: Uuid, renderer_type: impl Into<String>) -> Self {
        Self {
            id: None,
            uuid: Uuid::new_v4(),
            name: name.into(),
            description: None,
            definition_uuid,
            renderer_type: renderer_type.into(),
            properties: BTreeMap::new(),
            resources: Vec::new(),
            retired: false,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(|s| s.as_str())
    }
}

/// Administrative CRUD over report designs.
pub trait DesignStore: Send + Sync {
    fn get_by_uuid(&self, uuid: &Uuid) -> Result<Option<ReportDesign>, StoreError>;

    fn get(&self, id: u64) -> Result<Option<ReportDesign>, StoreError>;

    /// Designs matching every filter that is present, ordered by id.
    fn find(
        &self,
        definition_uuid: Option<&Uuid>,
        renderer_type: Option<&str>,
        include_retired: bool,
    ) -> Result<Vec<ReportDesign>, StoreError>;

    /// Insert or update; assigns an id when the design has none.
    fn save(&self, design: ReportDesign) -> Result<ReportDesign, StoreError>;

    /// Remove a design. Returns whether it existed.
    fn purge(&self, uuid: &Uuid) -> Result<bool, StoreError>;

    fn all(&self, include_retired: bool) -> Result<Vec<ReportDesign>, StoreError> {
        self.find(None, None, include_retired)
    }
}

#[derive(Debug, Default)]
struct DesignTable {
    designs: BTreeMap<u64, ReportDesign>,
    next_id: u64,
}

/// In-memory design store.
#[derive(Debug, Default)]
pub struct MemoryDesignStore {
    table: RwLock<DesignTable>,
}

impl MemoryDesignStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DesignStore for MemoryDesignStore {
    fn get_by_uuid(&self, uuid: &Uuid) -> Result<Option<ReportDesign>, StoreError> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        Ok(table.designs.values().find(|d| &d.uuid == uuid).cloned())
    }

    fn get(&self, id: u64) -> Result<Option<ReportDesign>, StoreError> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        Ok(table.designs.get(&id).cloned())
    }

    fn find(
        &self,
        definition_uuid: Option<&Uuid>,
        renderer_type: Option<&str>,
        include_retired: bool,
    ) -> Result<Vec<ReportDesign>, StoreError> {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        Ok(table
            .designs
            .values()
            .filter(|d| include_retired || !d.retired)
            .filter(|d| definition_uuid.map_or(true, |u| &d.definition_uuid == u))
            .filter(|d| renderer_type.map_or(true, |t| d.renderer_type == t))
            .cloned()
            .collect())
    }

    fn save(&self, mut design: ReportDesign) -> Result<ReportDesign, StoreError> {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        let id = match design.id {
            Some(id) => id,
            None => {
                // A design saved again without its id keeps the one it has.
                let existing = table
                    .designs
                    .values()
                    .find(|d| d.uuid == design.uuid)
                    .and_then(|d| d.id);
                match existing {
                    Some(id) => id,
                    None => {
                        table.next_id += 1;
                        table.next_id
                    }
                }
            }
        };
        table.next_id = table.next_id.max(id);
        design.id = Some(id);
        debug!("Saved report design '{}' (id {}, renderer {})", design.name, id, design.renderer_type);
        table.designs.insert(id, design.clone());
        Ok(design)
    }

    fn purge(&self, uuid: &Uuid) -> Result<bool, StoreError> {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        let id = table.designs.values().find(|d| &d.uuid == uuid).and_then(|d| d.id);
        Ok(match id {
            Some(id) => {
                table.designs.remove(&id);
                info!("Purged report design {}", uuid);
                true
            }
            None => false,
        })
    }
}
