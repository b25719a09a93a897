//! Workspace context
//!
//! A directory tree is bound to a workspace by a `.wsctl/workspace-context.json`
//! file at its root. [`ContextStore`] finds that file by walking up from the
//! current directory and [`Context`] is its in-memory form.

mod store;

pub use store::{ContextStore, STATE_DIR, STATE_FILE};

use crate::resource::{ResourceCatalog, WorkspaceDescription};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Workspace state for one invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default)]
    pub workspace_id: Option<Uuid>,
    #[serde(default)]
    pub workspace_name: Option<String>,
    /// Cloud project backing the workspace
    #[serde(default)]
    pub google_project_id: Option<String>,
    #[serde(default)]
    pub resources: ResourceCatalog,
}

impl Context {
    /// No workspace bound
    pub fn is_empty(&self) -> bool {
        self.workspace_id.is_none()
    }

    /// Fail fast for commands that need a workspace
    pub fn require_workspace(&self) -> Result<Uuid> {
        self.workspace_id.ok_or(Error::NoWorkspaceBound)
    }

    /// Project id of the bound workspace
    pub fn require_project(&self) -> Result<&str> {
        self.require_workspace()?;
        self.google_project_id.as_deref().ok_or_else(|| {
            Error::Config("the bound workspace has no backing cloud project".to_string())
        })
    }

    pub fn workspace(&self) -> Option<WorkspaceDescription> {
        self.workspace_id.map(|id| WorkspaceDescription {
            id,
            name: self.workspace_name.clone(),
            google_project_id: self.google_project_id.clone(),
        })
    }

    /// Point at a (possibly different) workspace, replacing the catalog
    pub fn set_workspace(&mut self, workspace: WorkspaceDescription, resources: ResourceCatalog) {
        tracing::debug!(
            "Updating workspace from {:?} to {}",
            self.workspace_id,
            workspace.id
        );
        self.workspace_id = Some(workspace.id);
        self.workspace_name = workspace.name;
        self.google_project_id = workspace.google_project_id;
        self.resources = resources;
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
