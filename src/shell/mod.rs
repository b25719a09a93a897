//! Execution bridge
//!
//! Runs an external tool under the bound workspace's project and identity,
//! either as a local process or inside a container, and hands back the
//! tool's exit code untouched.
//!
//! Per invocation: build the command line and environment, check the
//! default credentials, then let the [`CommandRunner`] wrap, launch and
//! stream.

mod credentials;
mod docker;
mod gcloud;
mod local;
mod stream;

pub use credentials::CredentialCheck;
pub use docker::{DockerRunner, GCLOUD_CONFIG_MOUNT, WORKING_DIR_MOUNT};
pub use gcloud::{Gcloud, ProjectOverride};
pub use local::LocalRunner;
pub use stream::exit_code;

use crate::context::Context;
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Prefix of the per-resource variables exported to `app execute`
pub const ENV_PREFIX: &str = "WSCTL_";

pub const PROJECT_ENV: &str = "GOOGLE_CLOUD_PROJECT";

/// One external tool run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolInvocation {
    pub executable: String,
    pub args: Vec<String>,
    /// Extra variables; these win over workspace-derived ones
    pub env: BTreeMap<String, String>,
    /// Container mount point to host directory
    pub bind_mounts: BTreeMap<String, PathBuf>,
    /// Switch gcloud's default project to the workspace project while running
    pub needs_project_wrap: bool,
    /// When set, the local runner checks `PATH` first and points here if missing
    pub install_url: Option<String>,
    /// Working directory inside the container; defaults to the mounted cwd
    pub container_workdir: Option<String>,
}

impl ToolInvocation {
    pub fn new(executable: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            executable: executable.into(),
            args,
            ..Default::default()
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn with_bind_mount(mut self, target: impl Into<String>, host: impl Into<PathBuf>) -> Self {
        self.bind_mounts.insert(target.into(), host.into());
        self
    }

    pub fn with_project_wrap(mut self) -> Self {
        self.needs_project_wrap = true;
        self
    }

    pub fn with_install_url(mut self, url: impl Into<String>) -> Self {
        self.install_url = Some(url.into());
        self
    }

    pub fn with_container_workdir(mut self, dir: impl Into<String>) -> Self {
        self.container_workdir = Some(dir.into());
        self
    }
}

/// What a runner receives once the bridge has built everything
pub struct PreparedCommand<'a> {
    /// Shell text handed to `bash -c`
    pub command_line: &'a str,
    pub invocation: &'a ToolInvocation,
    pub env: &'a BTreeMap<String, String>,
    /// Workspace project, if the workspace has one
    pub project: Option<&'a str>,
}

/// Strategy that launches a prepared command and waits for it
#[async_trait]
pub trait CommandRunner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run to completion and return the child's exit code.
    ///
    /// A non-zero child exit is `Ok`; `Err` means the child never ran.
    async fn run(&self, command: &PreparedCommand<'_>) -> Result<i32>;
}

pub struct ExecutionBridge {
    runner: Box<dyn CommandRunner>,
    credentials: CredentialCheck,
}

impl ExecutionBridge {
    pub fn new(runner: Box<dyn CommandRunner>, credentials: CredentialCheck) -> Self {
        Self {
            runner,
            credentials,
        }
    }

    pub fn runner_name(&self) -> &'static str {
        self.runner.name()
    }

    /// Needs a bound workspace, and a backing project when the tool is
    /// wrapped in the gcloud project override.
    pub async fn run(&self, context: &Context, invocation: &ToolInvocation) -> Result<i32> {
        context.require_workspace()?;
        let project = if invocation.needs_project_wrap {
            Some(context.require_project()?)
        } else {
            context.google_project_id.as_deref()
        };

        let command_line = build_command_line(&invocation.executable, &invocation.args);
        let mut env = workspace_env(context);
        env.extend(invocation.env.clone());

        self.credentials.verify().await?;

        tracing::info!("Executing ({}): {}", self.runner.name(), command_line);
        let prepared = PreparedCommand {
            command_line: &command_line,
            invocation,
            env: &env,
            project,
        };
        let code = self.runner.run(&prepared).await?;
        tracing::info!("{} exited with code {}", invocation.executable, code);
        Ok(code)
    }
}

/// Executable plus arguments as one line of shell text.
///
/// Each word stays one literal argument: anything beyond plain path and
/// flag characters is double-quoted, with `"`, `\` and backticks escaped.
/// `$VAR` references are still expanded by the shell.
pub fn build_command_line(executable: &str, args: &[String]) -> String {
    std::iter::once(executable)
        .chain(args.iter().map(String::as_str))
        .map(quote_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_plain(c: char) -> bool {
    c.is_ascii_alphanumeric() || "_-./=:,@%+$~".contains(c)
}

fn quote_word(word: &str) -> String {
    if !word.is_empty() && word.chars().all(is_plain) {
        return word.to_string();
    }
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('"');
    for c in word.chars() {
        if matches!(c, '"' | '\\' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// `WSCTL_` plus the resource name with every non-alphanumeric replaced by `_`
pub fn resource_env_name(resource_name: &str) -> String {
    let suffix: String = resource_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{ENV_PREFIX}{suffix}")
}

/// Variables every child gets from the bound workspace
pub fn workspace_env(context: &Context) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    if let Some(project) = &context.google_project_id {
        env.insert(PROJECT_ENV.to_string(), project.clone());
    }
    env
}
