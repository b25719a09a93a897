//! Local process runner

use super::gcloud::{Gcloud, ProjectOverride};
use super::stream::{exit_code, wait_streaming};
use super::{CommandRunner, PreparedCommand};
use crate::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;

/// Runs the command line with `bash -c` on this machine
#[derive(Debug, Clone)]
pub struct LocalRunner {
    shell: String,
    gcloud: Gcloud,
}

impl Default for LocalRunner {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            gcloud: Gcloud::default(),
        }
    }
}

impl LocalRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different gcloud for the project override
    pub fn with_gcloud(mut self, gcloud: Gcloud) -> Self {
        self.gcloud = gcloud;
        self
    }

    async fn spawn_and_wait(&self, command: &PreparedCommand<'_>) -> Result<i32> {
        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(command.command_line)
            .envs(command.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::launch(&self.shell, e))?;

        let status = wait_streaming(child)
            .await
            .map_err(|e| Error::launch(&self.shell, format!("failed to wait: {e}")))?;
        Ok(exit_code(status))
    }
}

#[async_trait]
impl CommandRunner for LocalRunner {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn run(&self, command: &PreparedCommand<'_>) -> Result<i32> {
        let invocation = command.invocation;
        if let Some(url) = &invocation.install_url {
            if which::which(&invocation.executable).is_err() {
                return Err(Error::launch(
                    &invocation.executable,
                    format!("not found on PATH; install it from {url}"),
                ));
            }
        }

        let guard = if invocation.needs_project_wrap {
            let project = command.project.ok_or_else(|| {
                Error::Config(format!(
                    "{} needs the workspace's cloud project, but it has none",
                    invocation.executable
                ))
            })?;
            Some(ProjectOverride::acquire(&self.gcloud, project).await?)
        } else {
            None
        };

        let result = self.spawn_and_wait(command).await;

        if let Some(guard) = guard {
            if let Err(e) = guard.release().await {
                tracing::error!("{}", e);
                eprintln!("Warning: could not restore the gcloud project: {e}");
            }
        }

        result
    }
}
