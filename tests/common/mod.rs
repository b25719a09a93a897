//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;
use wsctl::context::Context;
use wsctl::error::FetchError;
use wsctl::resource::{
    Resource, ResourceAttributes, ResourceCatalog, ResourceFetcher, SasToken, Stewardship,
    WorkspaceDescription,
};

/// Workspace service backed by maps
#[derive(Default)]
pub struct InMemoryFetcher {
    pub workspaces: HashMap<Uuid, Vec<Resource>>,
    /// Workspaces the caller may not read
    pub denied: HashSet<Uuid>,
    /// Workspaces whose service is down
    pub unavailable: HashSet<Uuid>,
}

impl InMemoryFetcher {
    pub fn with_workspace(mut self, id: Uuid, resources: Vec<Resource>) -> Self {
        self.workspaces.insert(id, resources);
        self
    }

    pub fn deny(mut self, id: Uuid) -> Self {
        self.denied.insert(id);
        self
    }

    pub fn down(mut self, id: Uuid) -> Self {
        self.unavailable.insert(id);
        self
    }

    fn check(&self, id: Uuid) -> Result<&Vec<Resource>, FetchError> {
        if self.denied.contains(&id) {
            return Err(FetchError::PermissionDenied(id.to_string()));
        }
        if self.unavailable.contains(&id) {
            return Err(FetchError::Unavailable(id.to_string()));
        }
        self.workspaces
            .get(&id)
            .ok_or_else(|| FetchError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl ResourceFetcher for InMemoryFetcher {
    async fn get_workspace(&self, id: Uuid) -> Result<WorkspaceDescription, FetchError> {
        self.check(id)?;
        Ok(WorkspaceDescription {
            id,
            name: Some(format!("ws-{}", id.simple())),
            google_project_id: Some("test-project-1".to_string()),
        })
    }

    async fn list_resources(&self, id: Uuid) -> Result<Vec<Resource>, FetchError> {
        self.check(id).cloned()
    }

    async fn get_resource(&self, ws: Uuid, id: Uuid) -> Result<Resource, FetchError> {
        self.check(ws)?
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(id.to_string()))
    }

    async fn azure_sas_token(&self, ws: Uuid, id: Uuid) -> Result<SasToken, FetchError> {
        self.check(ws)?;
        Ok(SasToken {
            token: format!("https://acct.blob.core.windows.net/{id}?sig=abc"),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}

pub fn bucket(name: &str, bucket_name: &str) -> Resource {
    Resource::new(
        name,
        Stewardship::Controlled,
        ResourceAttributes::GcsBucket {
            bucket_name: bucket_name.to_string(),
        },
    )
}

pub fn git_repo(name: &str, url: &str) -> Resource {
    Resource::new(
        name,
        Stewardship::Referenced,
        ResourceAttributes::GitRepository {
            git_repo_url: url.to_string(),
        },
    )
}

pub fn bq_table(name: &str, project: &str, dataset: &str, table: &str) -> Resource {
    Resource::new(
        name,
        Stewardship::Referenced,
        ResourceAttributes::BqTable {
            project_id: project.to_string(),
            dataset_id: dataset.to_string(),
            table_id: table.to_string(),
        },
    )
}

pub fn data_collection(name: &str, workspace_id: Uuid) -> Resource {
    Resource::new(
        name,
        Stewardship::Referenced,
        ResourceAttributes::DataCollection { workspace_id },
    )
}

pub fn bound_context(resources: Vec<Resource>) -> Context {
    Context {
        workspace_id: Some(Uuid::new_v4()),
        workspace_name: Some("test".to_string()),
        google_project_id: Some("test-project-1".to_string()),
        resources: ResourceCatalog::from(resources),
    }
}
