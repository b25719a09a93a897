//! Resource records
//!
//! One closed enum carries the kind-specific attributes. Every `match` on
//! [`ResourceAttributes`] is exhaustive, so a new kind has to be handled at
//! each dispatch site before the crate builds again.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Whether the backend owns the resource's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stewardship {
    Controlled,
    Referenced,
}

impl Stewardship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Controlled => "CONTROLLED",
            Self::Referenced => "REFERENCED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloningInstructions {
    #[default]
    CopyNothing,
    CopyDefinition,
    CopyResource,
    CopyReference,
}

/// Kind tag without attributes, for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    GcsBucket,
    GcsObject,
    BqDataset,
    BqTable,
    AiNotebookInstance,
    AzureStorageContainer,
    GitRepository,
    DataCollection,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GcsBucket => "GCS_BUCKET",
            Self::GcsObject => "GCS_OBJECT",
            Self::BqDataset => "BQ_DATASET",
            Self::BqTable => "BQ_TABLE",
            Self::AiNotebookInstance => "AI_NOTEBOOK_INSTANCE",
            Self::AzureStorageContainer => "AZURE_STORAGE_CONTAINER",
            Self::GitRepository => "GIT_REPOSITORY",
            Self::DataCollection => "DATA_COLLECTION",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific attributes, tagged by `resource_type` on disk and on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resource_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceAttributes {
    GcsBucket {
        bucket_name: String,
    },
    GcsObject {
        bucket_name: String,
        object_name: String,
    },
    BqDataset {
        project_id: String,
        dataset_id: String,
    },
    BqTable {
        project_id: String,
        dataset_id: String,
        table_id: String,
    },
    AiNotebookInstance {
        project_id: String,
        location: String,
        instance_id: String,
    },
    AzureStorageContainer {
        storage_account_id: Uuid,
        storage_container_name: String,
    },
    GitRepository {
        git_repo_url: String,
    },
    /// Pulls in another workspace's resources by reference
    DataCollection {
        workspace_id: Uuid,
    },
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub stewardship: Stewardship,
    #[serde(default)]
    pub cloning_instructions: CloningInstructions,
    #[serde(flatten)]
    pub attributes: ResourceAttributes,
}

impl Resource {
    pub fn new(name: &str, stewardship: Stewardship, attributes: ResourceAttributes) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            stewardship,
            cloning_instructions: CloningInstructions::default(),
            attributes,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self.attributes {
            ResourceAttributes::GcsBucket { .. } => ResourceKind::GcsBucket,
            ResourceAttributes::GcsObject { .. } => ResourceKind::GcsObject,
            ResourceAttributes::BqDataset { .. } => ResourceKind::BqDataset,
            ResourceAttributes::BqTable { .. } => ResourceKind::BqTable,
            ResourceAttributes::AiNotebookInstance { .. } => ResourceKind::AiNotebookInstance,
            ResourceAttributes::AzureStorageContainer { .. } => {
                ResourceKind::AzureStorageContainer
            },
            ResourceAttributes::GitRepository { .. } => ResourceKind::GitRepository,
            ResourceAttributes::DataCollection { .. } => ResourceKind::DataCollection,
        }
    }

    pub fn is_data_collection(&self) -> bool {
        self.kind() == ResourceKind::DataCollection
    }
}

/// Check that a name can be used as a catalog key.
///
/// Names may hold ASCII letters, digits, `_` and `-`. `/` is reserved for
/// addressing a resource inside a data collection.
pub fn validate_resource_name(name: &str) -> crate::Result<()> {
    if name.is_empty() || name.len() > 1024 {
        return Err(crate::Error::InvalidResource(format!(
            "resource name must be 1 to 1024 characters, got {} characters",
            name.len()
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(crate::Error::InvalidResource(format!(
            "resource name {name:?} contains {c:?}; only letters, digits, '_' and '-' are allowed"
        )));
    }
    Ok(())
}
