//! Resource Catalog
//!
//! Name-keyed set of resource records for one workspace. Persistence is the
//! caller's job (see [`crate::context::ContextStore`]).

use super::model::{validate_resource_name, Resource, ResourceKind, Stewardship};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resources of one workspace, keyed by name.
///
/// Stored on disk as a plain list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Resource>", into = "Vec<Resource>")]
pub struct ResourceCatalog {
    resources: BTreeMap<String, Resource>,
}

impl From<Vec<Resource>> for ResourceCatalog {
    fn from(list: Vec<Resource>) -> Self {
        let mut resources = BTreeMap::new();
        for resource in list {
            if let Some(previous) = resources.insert(resource.name.clone(), resource) {
                tracing::warn!(
                    "Duplicate resource name {:?} in catalog, keeping the last",
                    previous.name
                );
            }
        }
        Self { resources }
    }
}

impl From<ResourceCatalog> for Vec<Resource> {
    fn from(catalog: ResourceCatalog) -> Self {
        catalog.resources.into_values().collect()
    }
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact, case-sensitive lookup
    pub fn get(&self, name: &str) -> Result<&Resource> {
        self.resources
            .get(name)
            .ok_or_else(|| Error::ResourceNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Add a new record. Names must be valid and unused.
    pub fn add(&mut self, resource: Resource) -> Result<()> {
        validate_resource_name(&resource.name)?;
        if self.resources.contains_key(&resource.name) {
            return Err(Error::InvalidResource(format!(
                "a resource named {:?} already exists in this workspace",
                resource.name
            )));
        }
        tracing::debug!("Adding {} resource {:?}", resource.kind(), resource.name);
        self.resources.insert(resource.name.clone(), resource);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Resource> {
        self.resources
            .remove(name)
            .ok_or_else(|| Error::ResourceNotFound(name.to_string()))
    }

    /// Rename and/or redescribe a record
    pub fn update(
        &mut self,
        name: &str,
        new_name: Option<&str>,
        description: Option<&str>,
    ) -> Result<&Resource> {
        if !self.resources.contains_key(name) {
            return Err(Error::ResourceNotFound(name.to_string()));
        }
        let target = match new_name {
            Some(new_name) if new_name != name => {
                validate_resource_name(new_name)?;
                if self.resources.contains_key(new_name) {
                    return Err(Error::InvalidResource(format!(
                        "a resource named {new_name:?} already exists in this workspace"
                    )));
                }
                new_name.to_string()
            },
            _ => name.to_string(),
        };

        let mut resource = self
            .resources
            .remove(name)
            .ok_or_else(|| Error::ResourceNotFound(name.to_string()))?;
        resource.name = target.clone();
        if let Some(description) = description {
            resource.description = Some(description.to_string());
        }
        Ok(self.resources.entry(target).or_insert(resource))
    }

    /// Replace all records, e.g. after re-listing from the backend
    pub fn replace_all(&mut self, resources: Vec<Resource>) {
        *self = Self::from(resources);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn list_by_stewardship(&self, stewardship: Stewardship) -> Vec<&Resource> {
        self.iter().filter(|r| r.stewardship == stewardship).collect()
    }

    pub fn list_by_kind(&self, kind: ResourceKind) -> Vec<&Resource> {
        self.iter().filter(|r| r.kind() == kind).collect()
    }
}
