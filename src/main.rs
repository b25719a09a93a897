/// Version injected at compile time via WSCTL_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("WSCTL_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;
use uuid::Uuid;
use wsctl::app::{format_json, format_resolution, format_resources, App, OutputFormat, Tool};
use wsctl::config::{Config, LogLevel};
use wsctl::context::ContextStore;
use wsctl::error::EXIT_SYSTEM;
use wsctl::resource::{BqPathFormat, ResolveOptions, Stewardship};

/// Run cloud tools scoped to a workspace
#[derive(Parser, Debug)]
#[command(name = "wsctl", version = VERSION, about, long_about = None)]
struct Args {
    /// Log level for the log file (overrides the config file)
    #[arg(long, value_enum, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bind, describe or clear the workspace of this directory
    #[command(subcommand)]
    Workspace(WorkspaceCommand),

    /// Manage and resolve workspace resources
    #[command(subcommand)]
    Resource(ResourceCommand),

    /// Tools available in the workspace
    #[command(subcommand)]
    App(AppCommand),

    /// Show or change user settings
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Run gcloud in the workspace project
    Gcloud(Passthrough),

    /// Run gsutil in the workspace project
    Gsutil(Passthrough),

    /// Run bq in the workspace project
    Bq(Passthrough),

    /// Run nextflow with ./nextflow mounted as its config directory
    Nextflow(Passthrough),

    /// Run git; `git clone --all` or `--resource a,b` clones workspace repositories
    Git(Passthrough),
}

#[derive(clap::Args, Debug)]
struct Passthrough {
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum WorkspaceCommand {
    /// Bind this directory to a workspace and fetch its resources
    Set {
        #[arg(long)]
        id: Uuid,
    },
    Describe {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Forget the binding
    Clear,
    /// Bind the current directory itself to the active workspace
    Bind,
}

#[derive(Subcommand, Debug)]
enum ResourceCommand {
    List {
        #[arg(long, value_enum)]
        stewardship: Option<Stewardship>,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Add a resource by id from the workspace service
    Add {
        #[arg(long)]
        id: Uuid,
    },
    Update {
        #[arg(long)]
        name: String,
        #[arg(long)]
        new_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        #[arg(long)]
        name: String,
    },
    /// Replace the local catalog with the service's listing
    Sync,
    /// Print the cloud identifier of a resource
    Resolve {
        /// `name` or `data-collection/name`
        #[arg(long)]
        name: String,
        #[arg(long)]
        exclude_bucket_prefix: bool,
        #[arg(long, value_enum, default_value = "FULL_PATH")]
        bq_path: BqPathFormat,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Subcommand, Debug)]
enum AppCommand {
    List,
    /// Run any command with the workspace environment
    Execute {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Show,
    Set { key: String, value: String },
}

fn setup_logging(
    level: LogLevel,
    log_path: &Path,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")));

    let (file_layer, guard) = match level.to_tracing_level().map(|l| (l, open_log_file(log_path))) {
        Some((tracing_level, Ok(file))) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_filter(LevelFilter::from_level(tracing_level));
            (Some(layer), Some(guard))
        },
        Some((_, Err(e))) => {
            eprintln!("Warning: cannot open log file {}: {e:#}", log_path.display());
            (None, None)
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if guard.is_some() {
        tracing::info!("wsctl {} started with log level: {:?}", VERSION, level);
        tracing::info!("Log file: {:?}", log_path);
    }

    guard
}

fn open_log_file(log_path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .context("Failed to open log file")
}

#[tokio::main]
async fn main() {
    let code = run().await;
    std::process::exit(code);
}

/// Everything up to the exit code; the log guard flushes when this returns
async fn run() -> i32 {
    let args = Args::parse();
    let config = Config::load();

    let _log_guard = setup_logging(
        args.log_level.unwrap_or(config.log_level),
        &Config::log_path(),
    );

    match dispatch(args.command, config).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {err:#}");
            err.downcast_ref::<wsctl::Error>()
                .map_or(EXIT_SYSTEM, wsctl::Error::exit_code)
        },
    }
}

async fn dispatch(command: Command, mut config: Config) -> Result<i32> {
    if let Command::Config(command) = command {
        match command {
            ConfigCommand::Show => println!("{}", format_json(&config)?),
            ConfigCommand::Set { key, value } => {
                config.set_value(&key, &value)?;
                config.save()?;
                println!("Updated {key}");
            },
        }
        return Ok(0);
    }

    let store = ContextStore::from_current_dir().context("Cannot read the current directory")?;
    let mut app = App::new(config, store)?;

    match command {
        Command::Workspace(command) => workspace(&mut app, command).await,
        Command::Resource(command) => resource(&mut app, command).await,
        Command::App(AppCommand::List) => {
            for tool in app.app_list() {
                println!("{}", tool.executable());
            }
            Ok(0)
        },
        Command::App(AppCommand::Execute { command }) => Ok(app.app_execute(command).await?),
        Command::Gcloud(p) => Ok(app.run_tool(Tool::Gcloud, p.args).await?),
        Command::Gsutil(p) => Ok(app.run_tool(Tool::Gsutil, p.args).await?),
        Command::Bq(p) => Ok(app.run_tool(Tool::Bq, p.args).await?),
        Command::Nextflow(p) => Ok(app.run_tool(Tool::Nextflow, p.args).await?),
        Command::Git(p) => Ok(app.git(p.args).await?),
        Command::Config(_) => Ok(0),
    }
}

async fn workspace(app: &mut App, command: WorkspaceCommand) -> Result<i32> {
    match command {
        WorkspaceCommand::Set { id } => {
            let workspace = app.workspace_set(id).await?;
            println!(
                "Workspace successfully set: {} ({})",
                workspace.name.as_deref().unwrap_or("unnamed"),
                workspace.id
            );
            println!("Bound to {}", app.store.context_file().display());
        },
        WorkspaceCommand::Describe { format } => {
            let workspace = app.workspace_describe()?;
            match format {
                OutputFormat::Json => println!("{}", format_json(&workspace)?),
                OutputFormat::Text => {
                    println!("ID:             {}", workspace.id);
                    println!("Name:           {}", workspace.name.as_deref().unwrap_or(""));
                    println!(
                        "Cloud project:  {}",
                        workspace.google_project_id.as_deref().unwrap_or("")
                    );
                    println!("Resources:      {}", app.context.resources.len());
                    if let Some(dir) = app.store.workspace_dir() {
                        println!("Bound at:       {}", dir.display());
                    }
                },
            }
        },
        WorkspaceCommand::Clear => {
            app.workspace_clear()?;
            println!("Workspace binding removed");
        },
        WorkspaceCommand::Bind => {
            let path = app.workspace_bind()?;
            println!("Bound to {}", path.display());
        },
    }
    Ok(0)
}

async fn resource(app: &mut App, command: ResourceCommand) -> Result<i32> {
    match command {
        ResourceCommand::List {
            stewardship,
            format,
        } => {
            let resources = app.resource_list(stewardship)?;
            println!("{}", format_resources(&resources, format)?);
        },
        ResourceCommand::Add { id } => {
            let resource = app.resource_add(id).await?;
            println!("Added {} ({})", resource.name, resource.kind());
        },
        ResourceCommand::Update {
            name,
            new_name,
            description,
        } => {
            let resource =
                app.resource_update(&name, new_name.as_deref(), description.as_deref())?;
            println!("Updated {}", resource.name);
        },
        ResourceCommand::Delete { name } => {
            let resource = app.resource_delete(&name)?;
            println!("Deleted {}", resource.name);
        },
        ResourceCommand::Sync => {
            let count = app.resource_sync().await?;
            println!("Synced {count} resources");
        },
        ResourceCommand::Resolve {
            name,
            exclude_bucket_prefix,
            bq_path,
            format,
        } => {
            let options = ResolveOptions {
                exclude_bucket_prefix,
                bq_path_format: bq_path,
            };
            let (resolved, is_collection) = app.resource_resolve(&name, &options).await?;
            println!("{}", format_resolution(&resolved, is_collection, format)?);
        },
    }
    Ok(0)
}
