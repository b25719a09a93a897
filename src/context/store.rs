//! Context persistence
//!
//! The state file is an optional cache: read failures are logged and yield
//! an empty context, write failures are reported but leave the in-memory
//! context untouched. Nothing locks the file, so concurrent invocations in
//! the same tree race.

use super::Context;
use crate::resource::{Resource, ResourceCatalog, WorkspaceDescription};
use crate::{Error, Result};
use std::path::{Path, PathBuf};

pub const STATE_DIR: &str = ".wsctl";
pub const STATE_FILE: &str = "workspace-context.json";

/// Binds a directory tree to its persisted [`Context`]
#[derive(Debug, Clone)]
pub struct ContextStore {
    current_dir: PathBuf,
    /// State file found by the last `load`, or written by `persist`
    located: Option<PathBuf>,
}

impl ContextStore {
    pub fn new(current_dir: impl Into<PathBuf>) -> Self {
        let current_dir = current_dir.into();
        let current_dir = std::fs::canonicalize(&current_dir).unwrap_or(current_dir);
        Self {
            current_dir,
            located: None,
        }
    }

    pub fn from_current_dir() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    /// Walk up from `start` to the filesystem root looking for a state file.
    ///
    /// `Path::parent` is lexical, so the walk ends at the root even when the
    /// tree contains symlink cycles.
    pub fn locate_context_file(start: &Path) -> Option<PathBuf> {
        let mut dir = Some(start);
        while let Some(current) = dir {
            let candidate = current.join(STATE_DIR).join(STATE_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }
            dir = current.parent();
        }
        None
    }

    /// Load the context bound to the current directory, or an empty one
    pub fn load(&mut self) -> Context {
        self.located = Self::locate_context_file(&self.current_dir);
        let Some(path) = self.located.as_deref() else {
            tracing::debug!("No workspace context above {:?}", self.current_dir);
            return Context::default();
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Workspace context file {:?} unreadable: {}", path, e);
                return Context::default();
            },
        };

        match serde_json::from_str(&content) {
            Ok(context) => {
                tracing::debug!("Loaded workspace context from {:?}", path);
                context
            },
            Err(e) => {
                tracing::warn!("Workspace context file {:?} is malformed: {}", path, e);
                Context::default()
            },
        }
    }

    /// File `persist` writes to: the located one, else one under the current directory
    pub fn context_file(&self) -> PathBuf {
        self.located
            .clone()
            .unwrap_or_else(|| self.current_dir.join(STATE_DIR).join(STATE_FILE))
    }

    /// Root of the bound tree (parent of the state directory)
    pub fn workspace_dir(&self) -> Option<&Path> {
        self.located.as_deref()?.parent()?.parent()
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    /// Write the context back to its state file
    pub fn persist(&mut self, context: &Context) -> Result<PathBuf> {
        let path = self.context_file();
        let persistence_error = |source| Error::Persistence {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(persistence_error)?;
        }
        let content = serde_json::to_string_pretty(context)
            .map_err(|e| persistence_error(std::io::Error::other(e)))?;
        std::fs::write(&path, content).map_err(persistence_error)?;

        tracing::debug!("Persisted workspace context to {:?}", path);
        self.located = Some(path.clone());
        Ok(path)
    }

    /// Persist, logging instead of failing; the in-memory context stays valid
    pub fn persist_or_log(&mut self, context: &Context) {
        if let Err(e) = self.persist(context) {
            tracing::error!("{}", e);
            eprintln!("Warning: {e}");
        }
    }

    /// Bind the current directory itself, even when an ancestor is bound
    pub fn bind_here(&mut self, context: &Context) -> Result<PathBuf> {
        self.located = None;
        self.persist(context)
    }

    /// Forget the binding: remove the state file and empty the context
    pub fn unbind(&mut self, context: &mut Context) -> Result<()> {
        context.clear();
        let Some(path) = self.located.take() else {
            return Ok(());
        };
        std::fs::remove_file(&path).map_err(|source| Error::Persistence {
            path: path.clone(),
            source,
        })?;
        if let Some(dir) = path.parent() {
            // Only succeeds when nothing else lives in the state directory
            let _ = std::fs::remove_dir(dir);
        }
        tracing::info!("Removed workspace binding {:?}", path);
        Ok(())
    }

    pub fn set_workspace(
        &mut self,
        context: &mut Context,
        workspace: WorkspaceDescription,
        resources: Vec<Resource>,
    ) {
        context.set_workspace(workspace, ResourceCatalog::from(resources));
        self.persist_or_log(context);
    }

    pub fn add_resource(&mut self, context: &mut Context, resource: Resource) -> Result<()> {
        context.require_workspace()?;
        context.resources.add(resource)?;
        self.persist_or_log(context);
        Ok(())
    }

    pub fn remove_resource(&mut self, context: &mut Context, name: &str) -> Result<Resource> {
        context.require_workspace()?;
        let removed = context.resources.remove(name)?;
        self.persist_or_log(context);
        Ok(removed)
    }

    pub fn update_resource(
        &mut self,
        context: &mut Context,
        name: &str,
        new_name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Resource> {
        context.require_workspace()?;
        let updated = context
            .resources
            .update(name, new_name, description)?
            .clone();
        self.persist_or_log(context);
        Ok(updated)
    }

    pub fn replace_resources(&mut self, context: &mut Context, resources: Vec<Resource>) -> Result<()> {
        context.require_workspace()?;
        context.resources.replace_all(resources);
        self.persist_or_log(context);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn workspace() -> WorkspaceDescription {
        WorkspaceDescription {
            id: Uuid::new_v4(),
            name: Some("demo".into()),
            google_project_id: Some("demo-project-1".into()),
        }
    }

    #[test]
    fn test_first_persist_binds_current_dir() {
        let root = tempfile::tempdir().unwrap();
        let mut store = ContextStore::new(root.path());
        let mut context = store.load();
        assert!(context.is_empty());

        store.set_workspace(&mut context, workspace(), Vec::new());

        let expected = store.current_dir().join(STATE_DIR).join(STATE_FILE);
        assert!(expected.is_file());
        assert_eq!(store.workspace_dir(), Some(store.current_dir()));
    }

    #[test]
    fn test_repersist_from_subdir_writes_original_file() {
        let root = tempfile::tempdir().unwrap();
        let mut store = ContextStore::new(root.path());
        let mut context = store.load();
        store.set_workspace(&mut context, workspace(), Vec::new());

        let sub = root.path().join("a").join("b");
        std::fs::create_dir_all(&sub).unwrap();
        let mut sub_store = ContextStore::new(&sub);
        let mut sub_context = sub_store.load();
        assert_eq!(sub_context, context);

        sub_context.workspace_name = Some("renamed".into());
        let written = sub_store.persist(&sub_context).unwrap();

        assert_eq!(written, store.context_file());
        assert!(!sub.join(STATE_DIR).exists());
    }

    #[test]
    fn test_malformed_file_loads_empty() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join(STATE_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(STATE_FILE), "{ not json").unwrap();

        let mut store = ContextStore::new(root.path());
        assert!(store.load().is_empty());
        // Still overwrites the located file rather than creating another
        assert_eq!(store.context_file(), store.current_dir().join(STATE_DIR).join(STATE_FILE));
    }

    #[test]
    fn test_unbind_removes_state() {
        let root = tempfile::tempdir().unwrap();
        let mut store = ContextStore::new(root.path());
        let mut context = store.load();
        store.set_workspace(&mut context, workspace(), Vec::new());

        store.unbind(&mut context).unwrap();
        assert!(context.is_empty());
        assert!(!root.path().join(STATE_DIR).exists());
        assert!(ContextStore::new(root.path()).load().is_empty());
    }

    #[test]
    fn test_mutations_require_workspace() {
        let root = tempfile::tempdir().unwrap();
        let mut store = ContextStore::new(root.path());
        let mut context = store.load();
        assert!(matches!(
            store.remove_resource(&mut context, "x"),
            Err(Error::NoWorkspaceBound)
        ));
        assert!(!root.path().join(STATE_DIR).exists());
    }
}
