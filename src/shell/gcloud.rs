//! gcloud default-project override
//!
//! `gcloud`, `gsutil` and `bq` read the default project from the gcloud
//! configuration. While a tool runs locally that default is switched to the
//! workspace project and afterwards put back the way it was.

use crate::gcp::auth::validate_project_id;
use crate::{Error, Result};
use tokio::process::Command;

const UNSET_MARKER: &str = "(unset)";

/// Thin wrapper over the gcloud executable
#[derive(Debug, Clone)]
pub struct Gcloud {
    program: String,
}

impl Default for Gcloud {
    fn default() -> Self {
        Self::new("gcloud")
    }
}

impl Gcloud {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Currently configured default project, `None` when unset
    pub async fn get_project(&self) -> Result<Option<String>> {
        let output = Command::new(&self.program)
            .args(["config", "get-value", "project"])
            .output()
            .await
            .map_err(|e| Error::launch(&self.program, e))?;

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() || value.is_empty() || value == UNSET_MARKER {
            return Ok(None);
        }
        Ok(Some(value))
    }

    pub async fn set_project(&self, project: &str) -> Result<()> {
        self.config(&["config", "set", "project", project]).await
    }

    pub async fn unset_project(&self) -> Result<()> {
        self.config(&["config", "unset", "project"]).await
    }

    async fn config(&self, args: &[&str]) -> Result<()> {
        tracing::debug!("Executing: {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::launch(&self.program, e))?;
        if !output.status.success() {
            return Err(Error::launch(
                &self.program,
                format!(
                    "`{}` failed: {}",
                    args.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(())
    }

    fn restore_args(previous: Option<&str>) -> Vec<&str> {
        match previous {
            Some(project) => vec!["config", "set", "project", project],
            None => vec!["config", "unset", "project"],
        }
    }
}

/// Holds the workspace project as gcloud's default until released.
///
/// Call [`ProjectOverride::release`] on every path. If the guard is dropped
/// without it (panic, cancelled future) the restore runs synchronously.
pub struct ProjectOverride {
    gcloud: Gcloud,
    previous: Option<String>,
    released: bool,
}

impl ProjectOverride {
    pub async fn acquire(gcloud: &Gcloud, project: &str) -> Result<Self> {
        if !validate_project_id(project) {
            return Err(Error::launch(
                gcloud.program(),
                format!("refusing to set invalid project id {project:?}"),
            ));
        }
        let previous = gcloud.get_project().await?;
        tracing::info!(
            "Setting the gcloud project to the workspace project {} (was {:?})",
            project,
            previous
        );
        gcloud.set_project(project).await?;
        Ok(Self {
            gcloud: gcloud.clone(),
            previous,
            released: false,
        })
    }

    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Put the previous default project back, or unset it if there was none
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        tracing::info!("Restoring the original gcloud project: {:?}", self.previous);
        match self.previous.as_deref() {
            Some(project) => self.gcloud.set_project(project).await,
            None => self.gcloud.unset_project().await,
        }
    }
}

impl Drop for ProjectOverride {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let args = Gcloud::restore_args(self.previous.as_deref());
        tracing::warn!("gcloud project override dropped without release, restoring");
        if let Err(e) = std::process::Command::new(self.gcloud.program())
            .args(&args)
            .status()
        {
            tracing::error!("Failed to restore gcloud project: {}", e);
        }
    }
}
