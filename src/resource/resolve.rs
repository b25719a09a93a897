//! Resource resolution
//!
//! Turns a resource record into the identifier a cloud tool understands:
//! a `gs://` URI, a BigQuery path, a notebook instance name, a clone URL or
//! a SAS token. Data collections resolve through the catalog of the
//! workspace they reference.

use super::fetcher::ResourceFetcher;
use super::model::{Resource, ResourceAttributes, ResourceKind};
use crate::context::Context;
use crate::error::FetchError;
use crate::{Error, Result};
use clap::ValueEnum;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

pub const GCS_PREFIX: &str = "gs://";

const BQ_DELIMITER: char = '.';

/// Which part of a BigQuery path to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BqPathFormat {
    /// `project.dataset[.table]`
    #[default]
    FullPath,
    DatasetIdOnly,
    ProjectIdOnly,
    /// Tables only
    TableIdOnly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    pub exclude_bucket_prefix: bool,
    pub bq_path_format: BqPathFormat,
}

/// What a resolve call produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A single addressable identifier
    Path(String),
    /// Resource name to identifier, for a whole data collection
    Collection(BTreeMap<String, String>),
}

impl Resolution {
    /// Name to identifier view, keyed by `name` for single results
    pub fn into_map(self, name: &str) -> BTreeMap<String, String> {
        match self {
            Resolution::Path(path) => BTreeMap::from([(name.to_string(), path)]),
            Resolution::Collection(map) => map,
        }
    }
}

/// Split `name` or `collection/name`
pub fn parse_resource_path(path: &str) -> Result<(&str, Option<&str>)> {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        [name] if !name.is_empty() => Ok((*name, None)),
        [collection, name] if !collection.is_empty() && !name.is_empty() => {
            Ok((*collection, Some(*name)))
        },
        _ => Err(Error::InvalidResource(format!(
            "invalid path {path:?}: expected [resource name] or [data collection name]/[resource name]"
        ))),
    }
}

/// Resolve everything that can be resolved without a remote call.
///
/// Storage containers need a SAS token and data collections need the
/// referenced catalog, so both are rejected here.
pub fn resolve_local(resource: &Resource, options: &ResolveOptions) -> Result<String> {
    let prefix = if options.exclude_bucket_prefix { "" } else { GCS_PREFIX };
    match &resource.attributes {
        ResourceAttributes::GcsBucket { bucket_name } => Ok(format!("{prefix}{bucket_name}")),
        ResourceAttributes::GcsObject {
            bucket_name,
            object_name,
        } => Ok(format!("{prefix}{bucket_name}/{object_name}")),
        ResourceAttributes::BqDataset {
            project_id,
            dataset_id,
        } => match options.bq_path_format {
            BqPathFormat::FullPath => Ok(format!("{project_id}{BQ_DELIMITER}{dataset_id}")),
            BqPathFormat::DatasetIdOnly => Ok(dataset_id.clone()),
            BqPathFormat::ProjectIdOnly => Ok(project_id.clone()),
            BqPathFormat::TableIdOnly => Err(Error::ResolveOptionsInvalid(format!(
                "{} is a dataset; TABLE_ID_ONLY applies to tables only",
                resource.name
            ))),
        },
        ResourceAttributes::BqTable {
            project_id,
            dataset_id,
            table_id,
        } => Ok(match options.bq_path_format {
            BqPathFormat::FullPath => {
                format!("{project_id}{BQ_DELIMITER}{dataset_id}{BQ_DELIMITER}{table_id}")
            },
            BqPathFormat::DatasetIdOnly => dataset_id.clone(),
            BqPathFormat::ProjectIdOnly => project_id.clone(),
            BqPathFormat::TableIdOnly => table_id.clone(),
        }),
        ResourceAttributes::AiNotebookInstance {
            project_id,
            location,
            instance_id,
        } => Ok(format!(
            "projects/{project_id}/locations/{location}/instances/{instance_id}"
        )),
        ResourceAttributes::GitRepository { git_repo_url } => Ok(git_repo_url.clone()),
        ResourceAttributes::AzureStorageContainer { .. } => Err(Error::ResolveOptionsInvalid(
            format!("{} needs a remote call to resolve", resource.name),
        )),
        ResourceAttributes::DataCollection { .. } => Err(Error::ResolveOptionsInvalid(format!(
            "{} is a data collection and has no single identifier",
            resource.name
        ))),
    }
}

/// Resolves catalog entries, calling the backend where a kind needs it
pub struct Resolver<'a> {
    fetcher: &'a dyn ResourceFetcher,
}

impl<'a> Resolver<'a> {
    pub fn new(fetcher: &'a dyn ResourceFetcher) -> Self {
        Self { fetcher }
    }

    /// Resolve `name` or `collection/name` in the bound workspace
    pub async fn resolve_path(
        &self,
        context: &Context,
        path: &str,
        options: &ResolveOptions,
    ) -> Result<BTreeMap<String, String>> {
        let workspace_id = context.require_workspace()?;
        let (name, nested) = parse_resource_path(path)?;
        let resource = context.resources.get(name)?;

        match nested {
            None => Ok(self
                .resolve(workspace_id, resource, options)
                .await?
                .into_map(name)),
            Some(nested) => {
                let ResourceAttributes::DataCollection {
                    workspace_id: collection_workspace,
                } = &resource.attributes
                else {
                    return Err(Error::InvalidResource(format!(
                        "{name} is a {}, not a data collection",
                        resource.kind()
                    )));
                };
                let path = self
                    .resolve_in_collection(*collection_workspace, nested)
                    .await?;
                Ok(BTreeMap::from([(nested.to_string(), path)]))
            },
        }
    }

    /// Resolve one record that lives in `workspace_id`.
    ///
    /// `options` apply to the record itself. Members of a data collection
    /// always resolve with the default options, so a format that only fits
    /// some kinds cannot fail the whole collection.
    pub async fn resolve(
        &self,
        workspace_id: Uuid,
        resource: &Resource,
        options: &ResolveOptions,
    ) -> Result<Resolution> {
        match &resource.attributes {
            ResourceAttributes::DataCollection {
                workspace_id: collection_workspace,
            } => {
                let members = match self.collection_members(*collection_workspace).await {
                    Ok(members) => members,
                    Err(FetchError::PermissionDenied(reason)) => {
                        tracing::warn!(
                            "Cannot read data collection {} ({}); treating it as empty",
                            resource.name,
                            reason
                        );
                        Vec::new()
                    },
                    Err(e) => return Err(e.into()),
                };
                let mut resolved = BTreeMap::new();
                for member in &members {
                    let path = self
                        .resolve_leaf(*collection_workspace, member, &ResolveOptions::default())
                        .await?;
                    resolved.insert(member.name.clone(), path);
                }
                Ok(Resolution::Collection(resolved))
            },
            _ => Ok(Resolution::Path(
                self.resolve_leaf(workspace_id, resource, options).await?,
            )),
        }
    }

    /// Resolve one named resource inside a referenced workspace, with the
    /// same default options as a whole-collection resolve
    pub async fn resolve_in_collection(
        &self,
        collection_workspace: Uuid,
        name: &str,
    ) -> Result<String> {
        let members = self.collection_members(collection_workspace).await?;
        let member = members
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| {
                Error::ResourceNotFound(format!("{name} in workspace {collection_workspace}"))
            })?;
        self.resolve_leaf(collection_workspace, member, &ResolveOptions::default())
            .await
    }

    /// Resolve a record that is not a data collection
    async fn resolve_leaf(
        &self,
        workspace_id: Uuid,
        resource: &Resource,
        options: &ResolveOptions,
    ) -> Result<String> {
        match &resource.attributes {
            ResourceAttributes::AzureStorageContainer { .. } => {
                let sas = self.fetcher.azure_sas_token(workspace_id, resource.id).await?;
                Ok(sas.token)
            },
            _ => resolve_local(resource, options),
        }
    }

    /// Non-collection resources of a referenced workspace
    async fn collection_members(&self, workspace_id: Uuid) -> Result<Vec<Resource>, FetchError> {
        let resources = self.fetcher.list_resources(workspace_id).await?;
        // Collections never nest; drop any that slipped in
        Ok(resources
            .into_iter()
            .filter(|r| !r.is_data_collection())
            .collect())
    }

    /// Identifiers of every `kind` resource reachable from the bound
    /// workspace, directly or through any data collection.
    ///
    /// `options` apply to direct resources only. Unreadable collections
    /// contribute nothing.
    pub async fn reachable_of_kind(
        &self,
        context: &Context,
        kind: ResourceKind,
        options: &ResolveOptions,
    ) -> Result<BTreeSet<String>> {
        let workspace_id = context.require_workspace()?;
        let mut found = BTreeSet::new();

        for resource in context.resources.list_by_kind(kind) {
            found.insert(self.resolve_leaf(workspace_id, resource, options).await?);
        }

        let collections: Vec<(&Resource, Uuid)> = context
            .resources
            .iter()
            .filter_map(|r| match &r.attributes {
                ResourceAttributes::DataCollection { workspace_id } => Some((r, *workspace_id)),
                _ => None,
            })
            .collect();

        let listings = join_all(
            collections
                .iter()
                .map(|(_, workspace_id)| self.collection_members(*workspace_id)),
        )
        .await;

        for ((collection, collection_workspace), listing) in collections.iter().zip(listings) {
            let members = match listing {
                Ok(members) => members,
                Err(e) => {
                    tracing::warn!("Failed to get data collection {}: {}", collection.name, e);
                    continue;
                },
            };
            for member in members.iter().filter(|r| r.kind() == kind) {
                let path = self
                    .resolve_leaf(*collection_workspace, member, &ResolveOptions::default())
                    .await?;
                found.insert(path);
            }
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Stewardship;

    fn table() -> Resource {
        Resource::new(
            "tbl",
            Stewardship::Referenced,
            ResourceAttributes::BqTable {
                project_id: "proj-123456".into(),
                dataset_id: "ds".into(),
                table_id: "events".into(),
            },
        )
    }

    fn options(format: BqPathFormat) -> ResolveOptions {
        ResolveOptions {
            bq_path_format: format,
            ..Default::default()
        }
    }

    #[test]
    fn test_bq_table_formats() {
        let t = table();
        assert_eq!(
            resolve_local(&t, &options(BqPathFormat::FullPath)).unwrap(),
            "proj-123456.ds.events"
        );
        assert_eq!(resolve_local(&t, &options(BqPathFormat::DatasetIdOnly)).unwrap(), "ds");
        assert_eq!(
            resolve_local(&t, &options(BqPathFormat::ProjectIdOnly)).unwrap(),
            "proj-123456"
        );
        assert_eq!(resolve_local(&t, &options(BqPathFormat::TableIdOnly)).unwrap(), "events");
    }

    #[test]
    fn test_table_only_rejected_for_dataset() {
        let dataset = Resource::new(
            "ds",
            Stewardship::Controlled,
            ResourceAttributes::BqDataset {
                project_id: "proj-123456".into(),
                dataset_id: "ds".into(),
            },
        );
        assert!(matches!(
            resolve_local(&dataset, &options(BqPathFormat::TableIdOnly)),
            Err(Error::ResolveOptionsInvalid(_))
        ));
    }

    #[test]
    fn test_gcs_object_and_notebook() {
        let object = Resource::new(
            "obj",
            Stewardship::Referenced,
            ResourceAttributes::GcsObject {
                bucket_name: "b".into(),
                object_name: "dir/file.txt".into(),
            },
        );
        assert_eq!(
            resolve_local(&object, &ResolveOptions::default()).unwrap(),
            "gs://b/dir/file.txt"
        );

        let notebook = Resource::new(
            "nb",
            Stewardship::Controlled,
            ResourceAttributes::AiNotebookInstance {
                project_id: "p".into(),
                location: "us-central1-a".into(),
                instance_id: "nb-1".into(),
            },
        );
        assert_eq!(
            resolve_local(&notebook, &ResolveOptions::default()).unwrap(),
            "projects/p/locations/us-central1-a/instances/nb-1"
        );
    }

    #[test]
    fn test_parse_resource_path() {
        assert_eq!(parse_resource_path("a").unwrap(), ("a", None));
        assert_eq!(parse_resource_path("a/b").unwrap(), ("a", Some("b")));
        assert!(parse_resource_path("a/b/c").is_err());
        assert!(parse_resource_path("a/").is_err());
        assert!(parse_resource_path("").is_err());
    }
}
