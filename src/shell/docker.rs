//! Container runner
//!
//! Runs the command line inside the tools image with the caller's working
//! directory and gcloud configuration mounted in.

use super::stream::{exit_code, wait_streaming};
use super::{CommandRunner, PreparedCommand};
use crate::gcp::auth::get_gcloud_config_dir;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Where the caller's working directory appears; the default container cwd
pub const WORKING_DIR_MOUNT: &str = "/workspace";

pub const GCLOUD_CONFIG_MOUNT: &str = "/root/.config/gcloud";

const CONTAINER_PROJECT_ENV: &str = "CLOUDSDK_CORE_PROJECT";

#[derive(Debug, Clone)]
pub struct DockerRunner {
    program: String,
    image: String,
    host_dir: PathBuf,
    gcloud_config_dir: Option<PathBuf>,
}

impl DockerRunner {
    pub fn new(image: impl Into<String>, host_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: "docker".to_string(),
            image: image.into(),
            host_dir: host_dir.into(),
            gcloud_config_dir: get_gcloud_config_dir().filter(|dir| dir.is_dir()),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_gcloud_config_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.gcloud_config_dir = dir;
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    fn host_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.host_dir.join(path)
        }
    }

    /// Environment for the container. The docker client gets the values
    /// through its own environment; the command line only names them.
    fn container_env(command: &PreparedCommand<'_>) -> BTreeMap<String, String> {
        let mut env = command.env.clone();
        if let Some(project) = command.project {
            // No project override inside the container
            env.entry(CONTAINER_PROJECT_ENV.to_string())
                .or_insert_with(|| project.to_string());
        }
        env
    }

    pub fn docker_args(
        &self,
        command: &PreparedCommand<'_>,
        env: &BTreeMap<String, String>,
    ) -> Vec<String> {
        let mut args: Vec<String> = vec!["run".into(), "--rm".into(), "-i".into()];

        let mut mount = |host: &Path, target: &str| {
            args.push("-v".into());
            args.push(format!("{}:{}", host.display(), target));
        };
        mount(&self.host_dir, WORKING_DIR_MOUNT);
        if let Some(dir) = &self.gcloud_config_dir {
            mount(dir, GCLOUD_CONFIG_MOUNT);
        }
        for (target, host) in &command.invocation.bind_mounts {
            mount(&self.host_path(host), target.as_str());
        }

        args.push("-w".into());
        args.push(
            command
                .invocation
                .container_workdir
                .as_deref()
                .unwrap_or(WORKING_DIR_MOUNT)
                .to_string(),
        );

        for key in env.keys() {
            args.push("-e".into());
            args.push(key.clone());
        }

        args.extend([
            "--entrypoint".into(),
            "bash".into(),
            self.image.clone(),
            "-c".into(),
            command.command_line.to_string(),
        ]);
        args
    }

    async fn ensure_image(&self) -> Result<()> {
        let status = Command::new(&self.program)
            .args(["image", "inspect", &self.image])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| Error::launch(&self.program, e))?;
        if !status.success() {
            return Err(Error::launch(
                &self.program,
                format!(
                    "image {} is not available locally; run `docker pull {}`",
                    self.image, self.image
                ),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for DockerRunner {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn run(&self, command: &PreparedCommand<'_>) -> Result<i32> {
        self.ensure_image().await?;

        let env = Self::container_env(command);
        let args = self.docker_args(command, &env);
        tracing::debug!("Executing: {} {}", self.program, args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .envs(&env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::launch(&self.program, e))?;

        let status = wait_streaming(child)
            .await
            .map_err(|e| Error::launch(&self.program, format!("failed to wait: {e}")))?;
        Ok(exit_code(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::ToolInvocation;

    #[test]
    fn test_docker_args() {
        let runner = DockerRunner::new("wsctl/tools:stable", "/home/ada/study")
            .with_gcloud_config_dir(Some(PathBuf::from("/home/ada/.config/gcloud")));
        let invocation = ToolInvocation::new("nextflow", vec!["run".into()])
            .with_bind_mount("/usr/local/etc/nextflow", "nextflow")
            .with_container_workdir("/usr/local/etc/nextflow");
        let env = BTreeMap::from([("SECRET".to_string(), "s3cr3t".to_string())]);
        let command = PreparedCommand {
            command_line: "nextflow run",
            invocation: &invocation,
            env: &env,
            project: Some("ws-project-1"),
        };

        let env = DockerRunner::container_env(&command);
        assert_eq!(
            env.get(CONTAINER_PROJECT_ENV).map(String::as_str),
            Some("ws-project-1")
        );

        let args = runner.docker_args(&command, &env);
        let line = args.join(" ");
        assert!(line.starts_with("run --rm -i -v /home/ada/study:/workspace"));
        assert!(line.contains("-v /home/ada/.config/gcloud:/root/.config/gcloud"));
        assert!(line.contains("-v /home/ada/study/nextflow:/usr/local/etc/nextflow"));
        assert!(line.contains("-w /usr/local/etc/nextflow"));
        assert!(!line.contains("-w /workspace"));
        assert!(line.contains("-e SECRET"));
        assert!(!line.contains("s3cr3t"));
        assert_eq!(
            &args[args.len() - 5..],
            ["--entrypoint", "bash", "wsctl/tools:stable", "-c", "nextflow run"]
        );
    }

    #[test]
    fn test_default_workdir_is_mounted_cwd() {
        let runner = DockerRunner::new("img", "/home/ada/study").with_gcloud_config_dir(None);
        let invocation = ToolInvocation::new("gsutil", Vec::new());
        let env = BTreeMap::new();
        let command = PreparedCommand {
            command_line: "gsutil",
            invocation: &invocation,
            env: &env,
            project: None,
        };
        let line = runner.docker_args(&command, &env).join(" ");
        assert!(line.contains("-w /workspace"));
    }

    #[tokio::test]
    async fn test_missing_docker_is_launch_error() {
        let runner = DockerRunner::new("img", "/tmp").with_program("/nonexistent/docker");
        assert!(matches!(runner.ensure_image().await, Err(Error::Launch { .. })));
    }
}
