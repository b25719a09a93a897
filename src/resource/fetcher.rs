//! Resource Fetcher
//!
//! Remote side of the catalog: workspace descriptions, resource descriptions
//! and storage-container SAS tokens.

use super::model::Resource;
use crate::error::FetchError;
use crate::gcp::auth::AccessTokenSource;
use crate::gcp::http::GcpHttpClient;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// Workspace identity as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceDescription {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub google_project_id: Option<String>,
}

/// Time-limited credential for an Azure storage container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SasToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn get_workspace(&self, workspace_id: Uuid) -> Result<WorkspaceDescription, FetchError>;

    async fn list_resources(&self, workspace_id: Uuid) -> Result<Vec<Resource>, FetchError>;

    async fn get_resource(
        &self,
        workspace_id: Uuid,
        resource_id: Uuid,
    ) -> Result<Resource, FetchError>;

    async fn azure_sas_token(
        &self,
        workspace_id: Uuid,
        resource_id: Uuid,
    ) -> Result<SasToken, FetchError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourcePage {
    #[serde(default)]
    resources: Vec<Resource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// REST client for the workspace service
#[derive(Clone)]
pub struct WorkspaceManagerClient {
    base_url: Url,
    http: GcpHttpClient,
    tokens: Arc<dyn AccessTokenSource>,
}

impl WorkspaceManagerClient {
    pub fn new(server_url: &str, tokens: Arc<dyn AccessTokenSource>) -> crate::Result<Self> {
        let mut base_url = Url::parse(server_url)
            .map_err(|e| crate::Error::Config(format!("invalid server url {server_url:?}: {e}")))?;
        // Url::join drops the last segment unless the path ends in a slash
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            base_url,
            http: GcpHttpClient::new()?,
            tokens,
        })
    }

    fn workspace_url(&self, workspace_id: Uuid, suffix: &str) -> Result<Url, FetchError> {
        let path = format!("api/workspaces/v1/{workspace_id}{suffix}");
        self.base_url
            .join(&path)
            .map_err(|e| FetchError::Unavailable(format!("bad request url {path}: {e}")))
    }

    async fn token(&self) -> Result<String, FetchError> {
        self.tokens
            .access_token()
            .await
            .map_err(|e| FetchError::PermissionDenied(format!("no access token: {e:#}")))
    }

    async fn list_page(
        &self,
        workspace_id: Uuid,
        page_token: Option<&str>,
    ) -> Result<ResourcePage, FetchError> {
        let mut url = self.workspace_url(workspace_id, "/resources")?;
        if let Some(token) = page_token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }
        let token = self.token().await?;
        self.http.get(url.as_str(), &token).await
    }
}

#[async_trait]
impl ResourceFetcher for WorkspaceManagerClient {
    async fn get_workspace(&self, workspace_id: Uuid) -> Result<WorkspaceDescription, FetchError> {
        let url = self.workspace_url(workspace_id, "")?;
        let token = self.token().await?;
        self.http.get(url.as_str(), &token).await
    }

    /// Fetch all resources (auto-paginate)
    async fn list_resources(&self, workspace_id: Uuid) -> Result<Vec<Resource>, FetchError> {
        let mut all_items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(workspace_id, page_token.as_deref()).await?;
            all_items.extend(page.resources);

            // Some servers send an empty token on the last page
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!("Listed {} resources in workspace {}", all_items.len(), workspace_id);
        Ok(all_items)
    }

    async fn get_resource(
        &self,
        workspace_id: Uuid,
        resource_id: Uuid,
    ) -> Result<Resource, FetchError> {
        let url = self.workspace_url(workspace_id, &format!("/resources/{resource_id}"))?;
        let token = self.token().await?;
        self.http.get(url.as_str(), &token).await
    }

    async fn azure_sas_token(
        &self,
        workspace_id: Uuid,
        resource_id: Uuid,
    ) -> Result<SasToken, FetchError> {
        let url = self.workspace_url(
            workspace_id,
            &format!("/resources/controlled/azure/storageContainer/{resource_id}/getSasToken"),
        )?;
        let token = self.token().await?;
        let sas: SasToken = self.http.post(url.as_str(), &token, None).await?;
        tracing::debug!("SAS token for {} expires at {}", resource_id, sas.expires_at);
        Ok(sas)
    }
}

/// Stands in when no server is configured; purely local commands still work
pub struct UnconfiguredFetcher;

impl UnconfiguredFetcher {
    fn unavailable<T>() -> Result<T, FetchError> {
        Err(FetchError::Unavailable(
            "no workspace server configured; run `wsctl config set server-url <url>`".to_string(),
        ))
    }
}

#[async_trait]
impl ResourceFetcher for UnconfiguredFetcher {
    async fn get_workspace(&self, _: Uuid) -> Result<WorkspaceDescription, FetchError> {
        Self::unavailable()
    }

    async fn list_resources(&self, _: Uuid) -> Result<Vec<Resource>, FetchError> {
        Self::unavailable()
    }

    async fn get_resource(&self, _: Uuid, _: Uuid) -> Result<Resource, FetchError> {
        Self::unavailable()
    }

    async fn azure_sas_token(&self, _: Uuid, _: Uuid) -> Result<SasToken, FetchError> {
        Self::unavailable()
    }
}
