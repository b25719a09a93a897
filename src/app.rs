//! Application State
//!
//! [`App`] owns the loaded configuration and workspace context for one
//! invocation and implements every command on top of them. Handlers return
//! data or a child exit code; printing is left to the binary.

use crate::config::{Config, RunnerKind};
use crate::context::{Context, ContextStore};
use crate::gcp::auth::{AccessTokenSource, AdcCredentialProvider, SharedCredentials, StaticToken};
use crate::resource::{
    parse_resource_path, Resolution, ResolveOptions, Resolver, Resource, ResourceAttributes,
    ResourceFetcher, ResourceKind, Stewardship, UnconfiguredFetcher, WorkspaceDescription,
    WorkspaceManagerClient,
};
use crate::shell::{
    resource_env_name, CommandRunner, CredentialCheck, DockerRunner, ExecutionBridge,
    LocalRunner, ToolInvocation,
};
use crate::{Error, Result};
use clap::ValueEnum;
use comfy_table::Table;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

// =========================================================================
// Constants
// =========================================================================

/// Bearer token override for the workspace service, skips ADC
pub const ACCESS_TOKEN_ENV: &str = "WSCTL_ACCESS_TOKEN";

/// Nextflow configuration directory inside the tools container
pub const NEXTFLOW_MOUNT_POINT: &str = "/usr/local/etc/nextflow";

/// Host directory mounted at [`NEXTFLOW_MOUNT_POINT`], relative to the cwd
pub const NEXTFLOW_DIR: &str = "nextflow";

/// Tools with a dedicated passthrough command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Tool {
    Gcloud,
    Gsutil,
    Bq,
    Nextflow,
    Git,
}

impl Tool {
    pub const ALL: [Tool; 5] = [Tool::Gcloud, Tool::Gsutil, Tool::Bq, Tool::Nextflow, Tool::Git];

    pub fn executable(self) -> &'static str {
        match self {
            Tool::Gcloud => "gcloud",
            Tool::Gsutil => "gsutil",
            Tool::Bq => "bq",
            Tool::Nextflow => "nextflow",
            Tool::Git => "git",
        }
    }

    pub fn install_url(self) -> &'static str {
        match self {
            Tool::Gcloud | Tool::Gsutil | Tool::Bq => "https://cloud.google.com/sdk/docs/install",
            Tool::Nextflow => "https://www.nextflow.io/docs/latest/install.html",
            Tool::Git => "https://git-scm.com/downloads",
        }
    }

    /// These read their default project from the gcloud configuration
    pub fn needs_project_wrap(self) -> bool {
        matches!(self, Tool::Gcloud | Tool::Gsutil | Tool::Bq)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Which repositories `git clone` should fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloneSelection {
    /// Every git repository reachable from the workspace
    All,
    Resources(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCommand {
    Clone(CloneSelection),
    Passthrough(Vec<String>),
}

/// Pick `--all` / `--resource` out of `git clone` arguments.
///
/// Anything that is not `git clone` with one of those flags goes to git
/// unchanged; `git log --all` is a git flag, not ours.
pub fn parse_git_args(args: Vec<String>) -> Result<GitCommand> {
    if args.first().map(String::as_str) != Some("clone") {
        return Ok(GitCommand::Passthrough(args));
    }

    let mut all = false;
    let mut names = Vec::new();
    let mut rest = Vec::new();
    let mut iter = args.into_iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--all" {
            all = true;
        } else if arg == "--resource" {
            let value = iter.next().ok_or_else(|| {
                Error::InvalidResource("--resource needs a comma-separated list of names".into())
            })?;
            names.extend(split_names(&value));
        } else if let Some(value) = arg.strip_prefix("--resource=") {
            names.extend(split_names(value));
        } else {
            rest.push(arg);
        }
    }

    if all && !names.is_empty() {
        return Err(Error::InvalidResource(
            "use either --all or --resource, not both".into(),
        ));
    }
    if !all && names.is_empty() {
        let mut args = vec!["clone".to_string()];
        args.extend(rest);
        return Ok(GitCommand::Passthrough(args));
    }
    if !rest.is_empty() {
        return Err(Error::InvalidResource(format!(
            "unexpected arguments with --all/--resource: {}",
            rest.join(" ")
        )));
    }

    Ok(GitCommand::Clone(if all {
        CloneSelection::All
    } else {
        CloneSelection::Resources(names)
    }))
}

fn split_names(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Main application state
pub struct App {
    pub config: Config,
    pub store: ContextStore,
    pub context: Context,
    fetcher: Arc<dyn ResourceFetcher>,
    bridge: ExecutionBridge,
}

impl App {
    /// Load the context bound to the store's directory and wire up the
    /// service client and execution bridge from `config`
    pub fn new(config: Config, mut store: ContextStore) -> Result<Self> {
        let context = store.load();
        let credentials = SharedCredentials::new();

        let fetcher: Arc<dyn ResourceFetcher> = match config.server_url.as_deref() {
            Some(url) => {
                let tokens: Arc<dyn AccessTokenSource> = match std::env::var(ACCESS_TOKEN_ENV) {
                    Ok(token) if !token.is_empty() => Arc::new(StaticToken(token)),
                    _ => Arc::new(credentials.clone()),
                };
                Arc::new(WorkspaceManagerClient::new(url, tokens)?)
            },
            None => Arc::new(UnconfiguredFetcher),
        };

        let runner: Box<dyn CommandRunner> = match config.runner {
            RunnerKind::Local => Box::new(LocalRunner::new()),
            RunnerKind::Docker => Box::new(DockerRunner::new(
                config.effective_docker_image(),
                store.current_dir(),
            )),
        };
        let provider = Arc::new(AdcCredentialProvider::new(credentials));
        let bridge = ExecutionBridge::new(runner, CredentialCheck::from_config(&config, provider));

        tracing::debug!(
            "wsctl started in {:?} with the {} runner",
            store.current_dir(),
            bridge.runner_name()
        );

        Ok(Self {
            config,
            store,
            context,
            fetcher,
            bridge,
        })
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_bridge(mut self, bridge: ExecutionBridge) -> Self {
        self.bridge = bridge;
        self
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self.fetcher.as_ref())
    }

    // =========================================================================
    // Workspace
    // =========================================================================

    /// Bind the current tree to workspace `id`, fetching its catalog
    pub async fn workspace_set(&mut self, id: Uuid) -> Result<WorkspaceDescription> {
        let workspace = self.fetcher.get_workspace(id).await?;
        let resources = self.fetcher.list_resources(id).await?;
        tracing::info!(
            "Setting workspace {} with {} resources",
            workspace.id,
            resources.len()
        );
        self.store
            .set_workspace(&mut self.context, workspace.clone(), resources);
        Ok(workspace)
    }

    pub fn workspace_describe(&self) -> Result<WorkspaceDescription> {
        self.context.workspace().ok_or(Error::NoWorkspaceBound)
    }

    pub fn workspace_clear(&mut self) -> Result<()> {
        self.store.unbind(&mut self.context)
    }

    /// Persist the active context into the current directory itself
    pub fn workspace_bind(&mut self) -> Result<PathBuf> {
        self.context.require_workspace()?;
        self.store.bind_here(&self.context)
    }

    // =========================================================================
    // Resources
    // =========================================================================

    pub fn resource_list(&self, stewardship: Option<Stewardship>) -> Result<Vec<&Resource>> {
        self.context.require_workspace()?;
        Ok(match stewardship {
            Some(stewardship) => self.context.resources.list_by_stewardship(stewardship),
            None => self.context.resources.iter().collect(),
        })
    }

    /// Fetch the description of resource `id` and add it to the catalog
    pub async fn resource_add(&mut self, id: Uuid) -> Result<Resource> {
        let workspace_id = self.context.require_workspace()?;
        let resource = self.fetcher.get_resource(workspace_id, id).await?;
        self.store
            .add_resource(&mut self.context, resource.clone())?;
        Ok(resource)
    }

    pub fn resource_update(
        &mut self,
        name: &str,
        new_name: Option<&str>,
        description: Option<&str>,
    ) -> Result<Resource> {
        self.store
            .update_resource(&mut self.context, name, new_name, description)
    }

    pub fn resource_delete(&mut self, name: &str) -> Result<Resource> {
        self.store.remove_resource(&mut self.context, name)
    }

    /// Replace the catalog with the backend's current listing
    pub async fn resource_sync(&mut self) -> Result<usize> {
        let workspace_id = self.context.require_workspace()?;
        let resources = self.fetcher.list_resources(workspace_id).await?;
        let count = resources.len();
        self.store.replace_resources(&mut self.context, resources)?;
        Ok(count)
    }

    /// Resolve `name` or `collection/name`.
    ///
    /// The flag is true when the result is a data collection's mapping
    /// rather than a single identifier.
    pub async fn resource_resolve(
        &self,
        path: &str,
        options: &ResolveOptions,
    ) -> Result<(BTreeMap<String, String>, bool)> {
        let resolved = self
            .resolver()
            .resolve_path(&self.context, path, options)
            .await?;
        let (name, nested) = parse_resource_path(path)?;
        let is_collection =
            nested.is_none() && self.context.resources.get(name)?.is_data_collection();
        Ok((resolved, is_collection))
    }

    /// `WSCTL_<name>` for every resource that resolves to a single identifier.
    ///
    /// Resources needing a remote call that fails are left out with a
    /// warning; the command still runs. Names that sanitize to the same
    /// variable are ambiguous and none of them is exported.
    pub async fn resource_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        let Some(workspace_id) = self.context.workspace_id else {
            return env;
        };

        let mut by_variable: BTreeMap<String, Vec<&Resource>> = BTreeMap::new();
        for resource in self.context.resources.iter() {
            if !resource.is_data_collection() {
                by_variable
                    .entry(resource_env_name(&resource.name))
                    .or_default()
                    .push(resource);
            }
        }

        let resolver = self.resolver();
        let options = ResolveOptions::default();
        for (variable, resources) in by_variable {
            let [resource] = resources.as_slice() else {
                let names: Vec<&str> = resources.iter().map(|r| r.name.as_str()).collect();
                tracing::warn!(
                    "Not exporting {}: resources {} share it; rename one of them",
                    variable,
                    names.join(", ")
                );
                continue;
            };
            match resolver.resolve(workspace_id, resource, &options).await {
                Ok(Resolution::Path(path)) => {
                    env.insert(variable, path);
                },
                Ok(Resolution::Collection(_)) => {},
                Err(e) => tracing::warn!("Not exporting {}: {}", resource.name, e),
            }
        }
        env
    }

    // =========================================================================
    // Tools
    // =========================================================================

    pub fn app_list(&self) -> &'static [Tool] {
        &Tool::ALL
    }

    /// Run an arbitrary command with the workspace environment
    pub async fn app_execute(&self, command: Vec<String>) -> Result<i32> {
        self.context.require_workspace()?;
        let mut command = command.into_iter();
        let executable = command
            .next()
            .ok_or_else(|| Error::InvalidResource("no command given".into()))?;
        let invocation =
            ToolInvocation::new(executable, command.collect()).with_env(self.resource_env().await);
        self.bridge.run(&self.context, &invocation).await
    }

    /// Passthrough for one of [`Tool::ALL`]. Nextflow runs from its config
    /// directory, mounted from `./nextflow`.
    pub async fn run_tool(&self, tool: Tool, args: Vec<String>) -> Result<i32> {
        self.context.require_workspace()?;
        let mut invocation =
            ToolInvocation::new(tool.executable(), args).with_install_url(tool.install_url());
        if tool.needs_project_wrap() {
            invocation = invocation.with_project_wrap();
        }
        if tool == Tool::Nextflow {
            let dir = self.store.current_dir().join(NEXTFLOW_DIR);
            std::fs::create_dir_all(&dir).map_err(|e| {
                Error::launch(tool.executable(), format!("cannot create {}: {e}", dir.display()))
            })?;
            invocation = invocation
                .with_bind_mount(NEXTFLOW_MOUNT_POINT, dir)
                .with_container_workdir(NEXTFLOW_MOUNT_POINT);
        }
        self.bridge.run(&self.context, &invocation).await
    }

    pub async fn git(&self, args: Vec<String>) -> Result<i32> {
        let selection = match parse_git_args(args)? {
            GitCommand::Passthrough(args) => return self.run_tool(Tool::Git, args).await,
            GitCommand::Clone(selection) => selection,
        };

        let mut first_failure = 0;
        for url in self.clone_targets(&selection).await? {
            let code = self
                .run_tool(Tool::Git, vec!["clone".to_string(), url.clone()])
                .await?;
            if code != 0 {
                tracing::warn!("git clone {} exited with {}", url, code);
                eprintln!("Git clone for {url} failed");
                if first_failure == 0 {
                    first_failure = code;
                }
            }
        }
        Ok(first_failure)
    }

    /// Clone URLs for `selection`, without duplicates
    pub async fn clone_targets(&self, selection: &CloneSelection) -> Result<Vec<String>> {
        self.context.require_workspace()?;
        let urls: BTreeSet<String> = match selection {
            CloneSelection::All => {
                self.resolver()
                    .reachable_of_kind(
                        &self.context,
                        ResourceKind::GitRepository,
                        &ResolveOptions::default(),
                    )
                    .await?
            },
            CloneSelection::Resources(names) => names
                .iter()
                .map(|name| {
                    let resource = self.context.resources.get(name)?;
                    match &resource.attributes {
                        ResourceAttributes::GitRepository { git_repo_url } => {
                            Ok(git_repo_url.clone())
                        },
                        _ => Err(Error::InvalidResource(format!(
                            "{name} is a {}, not a git repository",
                            resource.kind()
                        ))),
                    }
                })
                .collect::<Result<_>>()?,
        };
        Ok(urls.into_iter().collect())
    }
}

// =========================================================================
// Output
// =========================================================================

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(headers.to_vec());
    table
}

pub fn format_resources(resources: &[&Resource], format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(resources),
        OutputFormat::Text => {
            let mut table = new_table(&["NAME", "RESOURCE TYPE", "STEWARDSHIP", "DESCRIPTION"]);
            for r in resources {
                table.add_row(vec![
                    r.name.clone(),
                    r.kind().to_string(),
                    r.stewardship.as_str().to_string(),
                    r.description.clone().unwrap_or_default(),
                ]);
            }
            Ok(table.to_string())
        },
    }
}

/// Bare identifier for a single result, NAME/PATH table for a collection
pub fn format_resolution(
    resolved: &BTreeMap<String, String>,
    is_collection: bool,
    format: OutputFormat,
) -> serde_json::Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(resolved),
        OutputFormat::Text if !is_collection => {
            Ok(resolved.values().next().cloned().unwrap_or_default())
        },
        OutputFormat::Text => {
            let mut table = new_table(&["NAME", "PATH"]);
            for (name, path) in resolved {
                table.add_row(vec![name, path]);
            }
            Ok(table.to_string())
        },
    }
}

pub fn format_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}
