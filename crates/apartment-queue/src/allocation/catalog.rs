use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use super::domain::{OwnershipRegime, ProjectId, UnitId};

/// Unit metadata as reported by the project catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMetadata {
    pub unit_id: UnitId,
    pub project_id: ProjectId,
    /// Raw ownership tag; parsed with [`OwnershipRegime::from_tag`] at the point of use.
    pub ownership_tag: String,
    pub room_count: u8,
}

impl UnitMetadata {
    pub fn regime(&self) -> Option<OwnershipRegime> {
        OwnershipRegime::from_tag(&self.ownership_tag)
    }
}

/// Read-only lookup into the subsystem that owns unit and project metadata.
pub trait UnitCatalog: Send + Sync {
    fn unit(&self, unit_id: &UnitId) -> Result<UnitMetadata, CatalogError>;
    fn unit_ids_for_project(&self, project_id: &ProjectId) -> Result<Vec<UnitId>, CatalogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unit {0} not found")]
    UnitNotFound(UnitId),
    #[error("project {0} not found")]
    ProjectNotFound(ProjectId),
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Map-backed catalog used by the CLI and tests.
#[derive(Debug, Default)]
pub struct InMemoryUnitCatalog {
    units: RwLock<HashMap<UnitId, UnitMetadata>>,
}

impl InMemoryUnitCatalog {
    pub fn new(units: impl IntoIterator<Item = UnitMetadata>) -> Self {
        let catalog = Self::default();
        for unit in units {
            catalog.upsert(unit);
        }
        catalog
    }

    pub fn upsert(&self, unit: UnitMetadata) {
        let mut guard = self
            .units
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.insert(unit.unit_id.clone(), unit);
    }

    pub fn projects(&self) -> Vec<ProjectId> {
        let guard = self
            .units
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut projects: Vec<ProjectId> =
            guard.values().map(|unit| unit.project_id.clone()).collect();
        projects.sort();
        projects.dedup();
        projects
    }
}

impl UnitCatalog for InMemoryUnitCatalog {
    fn unit(&self, unit_id: &UnitId) -> Result<UnitMetadata, CatalogError> {
        let guard = self
            .units
            .read()
            .map_err(|_| CatalogError::Unavailable("catalog lock poisoned".to_string()))?;
        guard
            .get(unit_id)
            .cloned()
            .ok_or_else(|| CatalogError::UnitNotFound(unit_id.clone()))
    }

    fn unit_ids_for_project(&self, project_id: &ProjectId) -> Result<Vec<UnitId>, CatalogError> {
        let guard = self
            .units
            .read()
            .map_err(|_| CatalogError::Unavailable("catalog lock poisoned".to_string()))?;
        let units: BTreeMap<&UnitId, &UnitMetadata> = guard
            .iter()
            .filter(|(_, unit)| &unit.project_id == project_id)
            .collect();

        if units.is_empty() {
            return Err(CatalogError::ProjectNotFound(project_id.clone()));
        }

        Ok(units.into_keys().cloned().collect())
    }
}
